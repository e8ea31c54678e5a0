use agora_api::{
    now, Attrs, Comment, CommentFilter, CommentId, CommentPatch, CommentStore, Direction,
    Error as ApiError, Label, LabelId, LabelObject, LabelPatch, LabelStore, NewComment, NewLabel,
    NewLabelObject, NewSubject, Node, ObjectFilter, ObjectId, PinTxn, Relation, RelationFilter,
    RelationId, RelationKey, RelationStore, ScoreKey, ScoredLabel, State, Subject, SubjectId,
    SubjectPatch, SubjectStore, Transactional, UserId, Uuid, Window,
};
use anyhow::{anyhow, Context};
use sqlx::{postgres::PgRow, Row};

use crate::query::{self, Bind, TimeBound};

const COMMENT_COLUMNS: &str = "id, subject_id, root_id, father_id, user_id, at_user_id, content, meta, labels, count, state, attrs, create_time, sort_time";
const SUBJECT_COLUMNS: &str =
    "id, user_id, top_comment_id, root_count, all_count, state, attrs, create_time, update_time";
const LABEL_COLUMNS: &str = "id, value, zone, sub_zone, create_time, update_time";
const OBJECT_COLUMNS: &str = "id, object_type, labels, create_time, update_time";
const RELATION_COLUMNS: &str =
    "id, from_type, from_id, to_type, to_id, relation_type, create_time";

const SEARCH_DOCUMENT: &str = "to_tsvector('simple', value)";
const SEARCH_QUERY: &str = "plainto_tsquery('simple', $1)";

#[derive(Clone)]
pub struct PgDb {
    pool: sqlx::PgPool,
}

impl PgDb {
    pub fn new(pool: sqlx::PgPool) -> PgDb {
        PgDb { pool }
    }
}

fn storage(err: anyhow::Error) -> ApiError {
    tracing::error!(?err, "storage failure");
    ApiError::StorageFailure(format!("{err:#}"))
}

/// Maps a database error, serialization failures meaning that the
/// surrounding transaction was aborted
fn sql_err(what: &'static str) -> impl FnOnce(sqlx::Error) -> ApiError {
    move |err| {
        if let sqlx::Error::Database(e) = &err {
            if matches!(e.code().as_deref(), Some("40001") | Some("40P01")) {
                tracing::info!(?err, "transaction aborted while {what}");
                return ApiError::TransactionAborted(e.message().to_string());
            }
        }
        storage(anyhow::Error::new(err).context(what))
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(e) => e.code().as_deref() == Some("23505"),
        _ => false,
    }
}

fn found(rows_affected: u64) -> Result<(), ApiError> {
    match rows_affected {
        0 => Err(ApiError::NotFound),
        _ => Ok(()),
    }
}

fn state(v: i16) -> anyhow::Result<State> {
    State::from_i16(v).ok_or_else(|| anyhow!("invalid state value {v}"))
}

fn attrs(v: i16) -> anyhow::Result<Attrs> {
    Attrs::from_i16(v).ok_or_else(|| anyhow!("invalid attrs value {v}"))
}

fn comment_from_row(row: &PgRow) -> anyhow::Result<Comment> {
    Ok(Comment {
        id: CommentId(row.try_get("id").context("retrieving the id field")?),
        subject_id: SubjectId(
            row.try_get("subject_id")
                .context("retrieving the subject_id field")?,
        ),
        root_id: row.try_get("root_id").context("retrieving the root_id field")?,
        father_id: row
            .try_get("father_id")
            .context("retrieving the father_id field")?,
        user_id: UserId(row.try_get("user_id").context("retrieving the user_id field")?),
        at_user_id: row
            .try_get::<Option<Uuid>, _>("at_user_id")
            .context("retrieving the at_user_id field")?
            .map(UserId),
        content: row.try_get("content").context("retrieving the content field")?,
        meta: row.try_get("meta").context("retrieving the meta field")?,
        labels: row
            .try_get::<Vec<Uuid>, _>("labels")
            .context("retrieving the labels field")?
            .into_iter()
            .map(LabelId)
            .collect(),
        count: row.try_get("count").context("retrieving the count field")?,
        state: state(row.try_get("state").context("retrieving the state field")?)?,
        attrs: attrs(row.try_get("attrs").context("retrieving the attrs field")?)?,
        create_time: row
            .try_get("create_time")
            .context("retrieving the create_time field")?,
        sort_time: row
            .try_get("sort_time")
            .context("retrieving the sort_time field")?,
    })
}

fn subject_from_row(row: &PgRow) -> anyhow::Result<Subject> {
    Ok(Subject {
        id: SubjectId(row.try_get("id").context("retrieving the id field")?),
        user_id: UserId(row.try_get("user_id").context("retrieving the user_id field")?),
        top_comment_id: row
            .try_get::<Option<Uuid>, _>("top_comment_id")
            .context("retrieving the top_comment_id field")?
            .map(CommentId),
        root_count: row
            .try_get("root_count")
            .context("retrieving the root_count field")?,
        all_count: row
            .try_get("all_count")
            .context("retrieving the all_count field")?,
        state: state(row.try_get("state").context("retrieving the state field")?)?,
        attrs: attrs(row.try_get("attrs").context("retrieving the attrs field")?)?,
        create_time: row
            .try_get("create_time")
            .context("retrieving the create_time field")?,
        update_time: row
            .try_get("update_time")
            .context("retrieving the update_time field")?,
    })
}

fn label_from_row(row: &PgRow) -> anyhow::Result<Label> {
    Ok(Label {
        id: LabelId(row.try_get("id").context("retrieving the id field")?),
        value: row.try_get("value").context("retrieving the value field")?,
        zone: row.try_get("zone").context("retrieving the zone field")?,
        sub_zone: row
            .try_get("sub_zone")
            .context("retrieving the sub_zone field")?,
        create_time: row
            .try_get("create_time")
            .context("retrieving the create_time field")?,
        update_time: row
            .try_get("update_time")
            .context("retrieving the update_time field")?,
    })
}

fn object_from_row(row: &PgRow) -> anyhow::Result<LabelObject> {
    Ok(LabelObject {
        id: ObjectId(row.try_get("id").context("retrieving the id field")?),
        object_type: row
            .try_get("object_type")
            .context("retrieving the object_type field")?,
        labels: row
            .try_get::<Vec<Uuid>, _>("labels")
            .context("retrieving the labels field")?
            .into_iter()
            .map(LabelId)
            .collect(),
        create_time: row
            .try_get("create_time")
            .context("retrieving the create_time field")?,
        update_time: row
            .try_get("update_time")
            .context("retrieving the update_time field")?,
    })
}

fn relation_from_row(row: &PgRow) -> anyhow::Result<Relation> {
    Ok(Relation {
        id: RelationId(row.try_get("id").context("retrieving the id field")?),
        key: RelationKey {
            from: Node {
                kind: row
                    .try_get("from_type")
                    .context("retrieving the from_type field")?,
                id: row.try_get("from_id").context("retrieving the from_id field")?,
            },
            to: Node {
                kind: row.try_get("to_type").context("retrieving the to_type field")?,
                id: row.try_get("to_id").context("retrieving the to_id field")?,
            },
            relation_type: row
                .try_get("relation_type")
                .context("retrieving the relation_type field")?,
        },
        create_time: row
            .try_get("create_time")
            .context("retrieving the create_time field")?,
    })
}

fn rows<T>(rows: &[PgRow], parse: fn(&PgRow) -> anyhow::Result<T>) -> Result<Vec<T>, ApiError> {
    rows.iter().map(parse).collect::<anyhow::Result<_>>().map_err(storage)
}

fn count(row: &PgRow) -> Result<u64, ApiError> {
    let c: i64 = row
        .try_get("count")
        .context("retrieving the count field")
        .map_err(storage)?;
    Ok(c as u64)
}

#[async_trait::async_trait]
impl CommentStore for PgDb {
    async fn insert_comment(&self, c: NewComment) -> Result<Comment, ApiError> {
        let comment = c.into_comment(CommentId::new(), now());
        sqlx::query(&format!(
            "INSERT INTO comments ({COMMENT_COLUMNS})
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
        ))
        .bind(comment.id.0)
        .bind(comment.subject_id.0)
        .bind(comment.root_id)
        .bind(comment.father_id)
        .bind(comment.user_id.0)
        .bind(comment.at_user_id.map(|u| u.0))
        .bind(comment.content.as_str())
        .bind(comment.meta.as_str())
        .bind(comment.labels.iter().map(|l| l.0).collect::<Vec<_>>())
        .bind(comment.count)
        .bind(comment.state.to_i16())
        .bind(comment.attrs.to_i16())
        .bind(comment.create_time)
        .bind(comment.sort_time)
        .execute(&self.pool)
        .await
        .map_err(sql_err("inserting comment"))?;
        Ok(comment)
    }

    async fn find_comment(&self, id: CommentId) -> Result<Comment, ApiError> {
        let row = sqlx::query(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(sql_err("fetching comment"))?
        .ok_or(ApiError::NotFound)?;
        comment_from_row(&row).map_err(storage)
    }

    async fn find_comments(
        &self,
        filter: &CommentFilter,
        window: &Window<i64>,
    ) -> Result<Vec<Comment>, ApiError> {
        let mut sql = query::comment_filter(filter);
        let suffix = sql.window("sort_time", window, window.bound.map(Bind::I64));
        let q = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE {} {suffix}",
            sql.where_clause
        );
        let res = query::bind(sqlx::query(&q), &sql.binds)
            .fetch_all(&self.pool)
            .await
            .map_err(sql_err("listing comments"))?;
        rows(&res, comment_from_row)
    }

    async fn count_comments(&self, filter: &CommentFilter) -> Result<u64, ApiError> {
        let sql = query::comment_filter(filter);
        let q = format!(
            "SELECT COUNT(*) AS count FROM comments WHERE {}",
            sql.where_clause
        );
        let row = query::bind(sqlx::query(&q), &sql.binds)
            .fetch_one(&self.pool)
            .await
            .map_err(sql_err("counting comments"))?;
        count(&row)
    }

    async fn update_comment(&self, id: CommentId, patch: &CommentPatch) -> Result<(), ApiError> {
        let res = sqlx::query(
            "UPDATE comments
                SET meta = COALESCE($2, meta),
                    labels = COALESCE($3, labels),
                    state = COALESCE($4, state)
                WHERE id = $1",
        )
        .bind(id.0)
        .bind(patch.meta.clone())
        .bind(
            patch
                .labels
                .as_ref()
                .map(|l| l.iter().map(|l| l.0).collect::<Vec<_>>()),
        )
        .bind(patch.state.map(State::to_i16))
        .execute(&self.pool)
        .await
        .map_err(sql_err("updating comment"))?;
        found(res.rows_affected())
    }

    async fn increment_comment_count(&self, id: CommentId, delta: i64) -> Result<(), ApiError> {
        let res = sqlx::query("UPDATE comments SET count = count + $2 WHERE id = $1")
            .bind(id.0)
            .bind(delta)
            .execute(&self.pool)
            .await
            .map_err(sql_err("updating comment reply count"))?;
        found(res.rows_affected())
    }

    async fn delete_comment(&self, id: CommentId) -> Result<u64, ApiError> {
        Ok(sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(sql_err("deleting comment"))?
            .rows_affected())
    }
}

#[async_trait::async_trait]
impl SubjectStore for PgDb {
    async fn insert_subject(&self, s: NewSubject) -> Result<Subject, ApiError> {
        let id = s.id.unwrap_or_else(SubjectId::new);
        let subject = s.into_subject(id, now());
        let res = sqlx::query(&format!(
            "INSERT INTO subjects ({SUBJECT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        ))
        .bind(subject.id.0)
        .bind(subject.user_id.0)
        .bind(subject.top_comment_id.map(|c| c.0))
        .bind(subject.root_count)
        .bind(subject.all_count)
        .bind(subject.state.to_i16())
        .bind(subject.attrs.to_i16())
        .bind(subject.create_time)
        .bind(subject.update_time)
        .execute(&self.pool)
        .await;
        match res {
            Ok(_) => Ok(subject),
            Err(e) if is_unique_violation(&e) => Err(ApiError::IllegalOperation(format!(
                "subject {id} already exists"
            ))),
            Err(e) => Err(sql_err("inserting subject")(e)),
        }
    }

    async fn find_subject(&self, id: SubjectId) -> Result<Subject, ApiError> {
        let row = sqlx::query(&format!(
            "SELECT {SUBJECT_COLUMNS} FROM subjects WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(sql_err("fetching subject"))?
        .ok_or(ApiError::NotFound)?;
        subject_from_row(&row).map_err(storage)
    }

    async fn update_subject(&self, id: SubjectId, patch: &SubjectPatch) -> Result<(), ApiError> {
        let res = sqlx::query(
            "UPDATE subjects
                SET state = COALESCE($2, state),
                    attrs = COALESCE($3, attrs),
                    update_time = $4
                WHERE id = $1",
        )
        .bind(id.0)
        .bind(patch.state.map(State::to_i16))
        .bind(patch.attrs.map(Attrs::to_i16))
        .bind(now())
        .execute(&self.pool)
        .await
        .map_err(sql_err("updating subject"))?;
        found(res.rows_affected())
    }

    async fn increment_subject_counts(
        &self,
        id: SubjectId,
        all: i64,
        root: i64,
    ) -> Result<(), ApiError> {
        let res = sqlx::query(
            "UPDATE subjects
                SET all_count = all_count + $2,
                    root_count = root_count + $3,
                    update_time = $4
                WHERE id = $1",
        )
        .bind(id.0)
        .bind(all)
        .bind(root)
        .bind(now())
        .execute(&self.pool)
        .await
        .map_err(sql_err("updating subject counters"))?;
        found(res.rows_affected())
    }

    async fn clear_top_comment(&self, id: SubjectId, comment: CommentId) -> Result<bool, ApiError> {
        let res = sqlx::query(
            "UPDATE subjects
                SET top_comment_id = NULL, update_time = $3
                WHERE id = $1 AND top_comment_id = $2",
        )
        .bind(id.0)
        .bind(comment.0)
        .bind(now())
        .execute(&self.pool)
        .await
        .map_err(sql_err("clearing top comment"))?;
        Ok(res.rows_affected() == 1)
    }

    async fn delete_subject(&self, id: SubjectId) -> Result<u64, ApiError> {
        Ok(sqlx::query("DELETE FROM subjects WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(sql_err("deleting subject"))?
            .rows_affected())
    }
}

/// Pin transaction, rolled back by sqlx if dropped before commit
pub struct PgTxn(sqlx::Transaction<'static, sqlx::Postgres>);

#[async_trait::async_trait]
impl PinTxn for PgTxn {
    async fn lock_subject(&mut self, id: SubjectId) -> Result<Subject, ApiError> {
        let row = sqlx::query(&format!(
            "SELECT {SUBJECT_COLUMNS} FROM subjects WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.0)
        .fetch_optional(&mut self.0)
        .await
        .map_err(sql_err("locking subject"))?
        .ok_or(ApiError::NotFound)?;
        subject_from_row(&row).map_err(storage)
    }

    async fn find_comment(&mut self, id: CommentId) -> Result<Comment, ApiError> {
        let row = sqlx::query(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&mut self.0)
        .await
        .map_err(sql_err("fetching comment"))?
        .ok_or(ApiError::NotFound)?;
        comment_from_row(&row).map_err(storage)
    }

    async fn set_top_comment(
        &mut self,
        subject: SubjectId,
        top: Option<CommentId>,
    ) -> Result<(), ApiError> {
        let res = sqlx::query(
            "UPDATE subjects SET top_comment_id = $2, update_time = $3 WHERE id = $1",
        )
        .bind(subject.0)
        .bind(top.map(|c| c.0))
        .bind(now())
        .execute(&mut self.0)
        .await
        .map_err(sql_err("setting top comment"))?;
        found(res.rows_affected())
    }

    async fn set_comment_attrs(
        &mut self,
        id: CommentId,
        attrs: Attrs,
        sort_time: i64,
    ) -> Result<(), ApiError> {
        let res = sqlx::query("UPDATE comments SET attrs = $2, sort_time = $3 WHERE id = $1")
            .bind(id.0)
            .bind(attrs.to_i16())
            .bind(sort_time)
            .execute(&mut self.0)
            .await
            .map_err(sql_err("setting comment attrs"))?;
        found(res.rows_affected())
    }

    async fn commit(self) -> Result<(), ApiError> {
        self.0.commit().await.map_err(|err| {
            tracing::warn!(?err, "pin transaction failed to commit");
            ApiError::TransactionAborted(err.to_string())
        })
    }

    async fn abort(self) -> Result<(), ApiError> {
        self.0
            .rollback()
            .await
            .context("rolling back pin transaction")
            .map_err(storage)
    }
}

#[async_trait::async_trait]
impl Transactional for PgDb {
    type Txn = PgTxn;

    async fn begin(&self) -> Result<PgTxn, ApiError> {
        Ok(PgTxn(
            self.pool
                .begin()
                .await
                .map_err(sql_err("beginning pin transaction"))?,
        ))
    }
}

fn search_err(what: &'static str) -> impl FnOnce(sqlx::Error) -> ApiError {
    move |err| {
        tracing::error!(?err, "search failure while {what}");
        ApiError::SearchFailure(format!("{what}: {err}"))
    }
}

#[async_trait::async_trait]
impl LabelStore for PgDb {
    async fn insert_label(&self, l: NewLabel) -> Result<Label, ApiError> {
        let label = l.into_label(LabelId::new(), now());
        sqlx::query(&format!(
            "INSERT INTO labels ({LABEL_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)"
        ))
        .bind(label.id.0)
        .bind(label.value.as_str())
        .bind(label.zone.as_str())
        .bind(label.sub_zone.as_str())
        .bind(label.create_time)
        .bind(label.update_time)
        .execute(&self.pool)
        .await
        .map_err(sql_err("inserting label"))?;
        Ok(label)
    }

    async fn find_label(&self, id: LabelId) -> Result<Label, ApiError> {
        let row = sqlx::query(&format!("SELECT {LABEL_COLUMNS} FROM labels WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(sql_err("fetching label"))?
            .ok_or(ApiError::NotFound)?;
        label_from_row(&row).map_err(storage)
    }

    async fn find_labels(&self, ids: &[LabelId]) -> Result<Vec<Label>, ApiError> {
        let res = sqlx::query(&format!(
            "SELECT {LABEL_COLUMNS} FROM labels WHERE id = ANY($1)"
        ))
        .bind(ids.iter().map(|i| i.0).collect::<Vec<_>>())
        .fetch_all(&self.pool)
        .await
        .map_err(sql_err("fetching labels"))?;
        rows(&res, label_from_row)
    }

    async fn update_label(&self, id: LabelId, patch: &LabelPatch) -> Result<(), ApiError> {
        let res = sqlx::query(
            "UPDATE labels
                SET value = COALESCE($2, value),
                    zone = COALESCE($3, zone),
                    sub_zone = COALESCE($4, sub_zone),
                    update_time = $5
                WHERE id = $1",
        )
        .bind(id.0)
        .bind(patch.value.clone())
        .bind(patch.zone.clone())
        .bind(patch.sub_zone.clone())
        .bind(now())
        .execute(&self.pool)
        .await
        .map_err(sql_err("updating label"))?;
        found(res.rows_affected())
    }

    async fn delete_label(&self, id: LabelId) -> Result<u64, ApiError> {
        Ok(sqlx::query("DELETE FROM labels WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(sql_err("deleting label"))?
            .rows_affected())
    }

    async fn search_labels(
        &self,
        text: &str,
        window: &Window<ScoreKey>,
    ) -> Result<(Vec<ScoredLabel>, u64), ApiError> {
        let (op, order) = match window.direction {
            Direction::Forward => ("<", "DESC"),
            Direction::Backward => (">", "ASC"),
        };
        let after = match window.bound {
            Some(_) => format!("WHERE (score, id) {op} ($2, $3)"),
            None => String::new(),
        };
        let q = format!(
            "SELECT {LABEL_COLUMNS}, score FROM (
                SELECT {LABEL_COLUMNS},
                    ts_rank({SEARCH_DOCUMENT}, {SEARCH_QUERY})::FLOAT8 AS score
                FROM labels
                WHERE {SEARCH_DOCUMENT} @@ {SEARCH_QUERY}
            ) hits
            {after}
            ORDER BY score {order}, id {order}
            LIMIT {} OFFSET {}",
            window.limit, window.offset
        );
        let mut page = sqlx::query(&q).bind(text);
        if let Some(b) = window.bound {
            page = page.bind(b.score).bind(b.id);
        }
        let count_q =
            format!("SELECT COUNT(*) AS count FROM labels WHERE {SEARCH_DOCUMENT} @@ {SEARCH_QUERY}");
        let total = sqlx::query(&count_q).bind(text);
        let (hits, total) = futures::try_join!(
            page.fetch_all(&self.pool),
            total.fetch_one(&self.pool)
        )
        .map_err(search_err("searching labels"))?;
        let hits = hits
            .iter()
            .map(|row| {
                Ok(ScoredLabel {
                    label: label_from_row(row)?,
                    score: row.try_get("score").context("retrieving the score field")?,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()
            .map_err(storage)?;
        Ok((hits, count(&total)?))
    }

    async fn insert_objects(&self, objects: Vec<LabelObject>) -> Result<(), ApiError> {
        let mut txn = self
            .pool
            .begin()
            .await
            .map_err(sql_err("beginning object insertion"))?;
        for o in &objects {
            let res = sqlx::query(&format!(
                "INSERT INTO label_objects ({OBJECT_COLUMNS}) VALUES ($1, $2, $3, $4, $5)"
            ))
            .bind(o.id.0)
            .bind(o.object_type)
            .bind(o.labels.iter().map(|l| l.0).collect::<Vec<_>>())
            .bind(o.create_time)
            .bind(o.update_time)
            .execute(&mut txn)
            .await;
            match res {
                Ok(_) => (),
                Err(e) if is_unique_violation(&e) => {
                    return Err(ApiError::IllegalOperation(format!(
                        "object {} already exists",
                        o.id
                    )))
                }
                Err(e) => return Err(sql_err("inserting object")(e)),
            }
        }
        txn.commit().await.map_err(|err| {
            tracing::warn!(?err, objects = objects.len(), "object insertion failed to commit");
            ApiError::TransactionAborted(err.to_string())
        })
    }

    async fn update_object(&self, o: &NewLabelObject) -> Result<(), ApiError> {
        let res = sqlx::query(
            "UPDATE label_objects
                SET object_type = $2, labels = $3, update_time = $4
                WHERE id = $1",
        )
        .bind(o.id.0)
        .bind(o.object_type)
        .bind(o.labels.iter().map(|l| l.0).collect::<Vec<_>>())
        .bind(now())
        .execute(&self.pool)
        .await
        .map_err(sql_err("updating object"))?;
        found(res.rows_affected())
    }

    async fn delete_object(&self, id: ObjectId) -> Result<u64, ApiError> {
        Ok(sqlx::query("DELETE FROM label_objects WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(sql_err("deleting object"))?
            .rows_affected())
    }

    async fn find_objects(
        &self,
        filter: &ObjectFilter,
        window: &Window<Uuid>,
    ) -> Result<Vec<LabelObject>, ApiError> {
        let mut sql = query::object_filter(filter);
        let suffix = sql.window("id", window, window.bound.map(Bind::Uuid));
        let q = format!(
            "SELECT {OBJECT_COLUMNS} FROM label_objects WHERE {} {suffix}",
            sql.where_clause
        );
        let res = query::bind(sqlx::query(&q), &sql.binds)
            .fetch_all(&self.pool)
            .await
            .map_err(sql_err("listing objects"))?;
        rows(&res, object_from_row)
    }

    async fn count_objects(&self, filter: &ObjectFilter) -> Result<u64, ApiError> {
        let sql = query::object_filter(filter);
        let q = format!(
            "SELECT COUNT(*) AS count FROM label_objects WHERE {}",
            sql.where_clause
        );
        let row = query::bind(sqlx::query(&q), &sql.binds)
            .fetch_one(&self.pool)
            .await
            .map_err(sql_err("counting objects"))?;
        count(&row)
    }
}

#[async_trait::async_trait]
impl RelationStore for PgDb {
    async fn insert_relation(&self, key: RelationKey) -> Result<Option<Relation>, ApiError> {
        let relation = Relation {
            id: RelationId::new(),
            key,
            create_time: now(),
        };
        let res = sqlx::query(&format!(
            "INSERT INTO relations ({RELATION_COLUMNS})
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (from_type, from_id, to_type, to_id, relation_type) DO NOTHING"
        ))
        .bind(relation.id.0)
        .bind(relation.key.from.kind)
        .bind(relation.key.from.id.as_str())
        .bind(relation.key.to.kind)
        .bind(relation.key.to.id.as_str())
        .bind(relation.key.relation_type)
        .bind(relation.create_time)
        .execute(&self.pool)
        .await
        .map_err(sql_err("inserting relation"))?;
        Ok(match res.rows_affected() {
            0 => None,
            _ => Some(relation),
        })
    }

    async fn find_relation(&self, key: &RelationKey) -> Result<Relation, ApiError> {
        let row = sqlx::query(&format!(
            "SELECT {RELATION_COLUMNS} FROM relations
                WHERE from_type = $1 AND from_id = $2
                AND to_type = $3 AND to_id = $4
                AND relation_type = $5"
        ))
        .bind(key.from.kind)
        .bind(key.from.id.as_str())
        .bind(key.to.kind)
        .bind(key.to.id.as_str())
        .bind(key.relation_type)
        .fetch_optional(&self.pool)
        .await
        .map_err(sql_err("fetching relation"))?
        .ok_or(ApiError::NotFound)?;
        relation_from_row(&row).map_err(storage)
    }

    async fn find_relations(
        &self,
        filter: &RelationFilter,
        window: &Window<i64>,
    ) -> Result<Vec<Relation>, ApiError> {
        let mut sql = query::relation_filter(filter);
        let bound = match query::time_bound(window) {
            TimeBound::Unbounded => None,
            TimeBound::Bound(b) => Some(b),
            TimeBound::Empty => return Ok(Vec::new()),
        };
        let suffix = sql.window("create_time", window, bound);
        let q = format!(
            "SELECT {RELATION_COLUMNS} FROM relations WHERE {} {suffix}",
            sql.where_clause
        );
        let res = query::bind(sqlx::query(&q), &sql.binds)
            .fetch_all(&self.pool)
            .await
            .map_err(sql_err("listing relations"))?;
        rows(&res, relation_from_row)
    }

    async fn count_relations(&self, filter: &RelationFilter) -> Result<u64, ApiError> {
        let sql = query::relation_filter(filter);
        let q = format!(
            "SELECT COUNT(*) AS count FROM relations WHERE {}",
            sql.where_clause
        );
        let row = query::bind(sqlx::query(&q), &sql.binds)
            .fetch_one(&self.pool)
            .await
            .map_err(sql_err("counting relations"))?;
        count(&row)
    }

    async fn delete_relation(&self, key: &RelationKey) -> Result<u64, ApiError> {
        Ok(sqlx::query(
            "DELETE FROM relations
                WHERE from_type = $1 AND from_id = $2
                AND to_type = $3 AND to_id = $4
                AND relation_type = $5",
        )
        .bind(key.from.kind)
        .bind(key.from.id.as_str())
        .bind(key.to.kind)
        .bind(key.to.id.as_str())
        .bind(key.relation_type)
        .execute(&self.pool)
        .await
        .map_err(sql_err("deleting relation"))?
        .rows_affected())
    }

    async fn delete_node(&self, node: &Node) -> Result<u64, ApiError> {
        let mut txn = self
            .pool
            .begin()
            .await
            .map_err(sql_err("beginning node deletion"))?;
        let outgoing = sqlx::query("DELETE FROM relations WHERE from_type = $1 AND from_id = $2")
            .bind(node.kind)
            .bind(node.id.as_str())
            .execute(&mut txn)
            .await
            .map_err(sql_err("deleting outgoing relations"))?
            .rows_affected();
        let incoming = sqlx::query("DELETE FROM relations WHERE to_type = $1 AND to_id = $2")
            .bind(node.kind)
            .bind(node.id.as_str())
            .execute(&mut txn)
            .await
            .map_err(sql_err("deleting incoming relations"))?
            .rows_affected();
        txn.commit().await.map_err(|err| {
            tracing::warn!(?err, ?node, "node deletion failed to commit");
            ApiError::TransactionAborted(err.to_string())
        })?;
        Ok(outgoing + incoming)
    }
}
