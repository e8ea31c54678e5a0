use std::sync::Arc;

use crate::{
    apply_delta, pin, Attrs, Comment, CommentBlock, CommentBlocks, CommentFilter, CommentId,
    CommentPatch, Db, Delta, DeleteCommentRelations, Error, GraphMirror, Level, NewComment,
    NewSubject, Notifier, Page, Pagination, PinPlan, ReleaseMode, Subject, SubjectId,
    SubjectPatch, Uuid,
};

/// Number of replies listed under each root comment of a block
pub const BLOCK_REPLIES: u32 = 3;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ServiceConfig {
    pub release_mode: ReleaseMode,
}

pub struct Service<D> {
    pub(crate) db: D,
    pub(crate) graph: Option<Arc<dyn GraphMirror>>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) config: ServiceConfig,
}

impl<D: Db> Service<D> {
    pub fn new(db: D, notifier: Arc<dyn Notifier>, config: ServiceConfig) -> Service<D> {
        Service {
            db,
            graph: None,
            notifier,
            config,
        }
    }

    pub fn with_graph(mut self, graph: Arc<dyn GraphMirror>) -> Service<D> {
        self.graph = Some(graph);
        self
    }

    pub(crate) fn graph(&self) -> Result<&dyn GraphMirror, Error> {
        self.graph
            .as_deref()
            .ok_or_else(|| Error::ComponentUnavailable(String::from("graph mirror")))
    }

    pub async fn create_subject(&self, s: NewSubject) -> Result<Subject, Error> {
        let subject = self.db.insert_subject(s).await?;
        tracing::info!(subject = %subject.id, user = %subject.user_id, "created subject");
        Ok(subject)
    }

    pub async fn get_subject(&self, id: SubjectId) -> Result<Subject, Error> {
        self.db.find_subject(id).await
    }

    pub async fn update_subject(&self, id: SubjectId, patch: &SubjectPatch) -> Result<(), Error> {
        self.db.update_subject(id, patch).await
    }

    /// Deletes the subject then announces it. A failed announcement is
    /// reported, but the subject stays deleted.
    pub async fn delete_subject(&self, id: SubjectId) -> Result<(), Error> {
        let subject = self.db.find_subject(id).await?;
        if self.db.delete_subject(id).await? == 0 {
            return Err(Error::NotFound);
        }
        tracing::info!(subject = %id, "deleted subject");
        let msg = DeleteCommentRelations::for_author(subject.user_id);
        self.notifier.publish(&msg).await.map_err(|err| {
            tracing::error!(?err, subject = %id, ?msg, "failed publishing subject deletion");
            match err {
                Error::PublishFailure(e) => Error::PublishFailure(e),
                e => Error::PublishFailure(e.to_string()),
            }
        })
    }

    pub async fn create_comment(&self, c: NewComment) -> Result<Comment, Error> {
        c.validate()?;
        self.db.find_subject(c.subject_id).await?;
        if c.root_id != c.subject_id.0 {
            let root = self.db.find_comment(CommentId(c.root_id)).await?;
            if root.subject_id != c.subject_id || root.level() != Level::Root {
                return Err(Error::IllegalOperation(format!(
                    "comment {} is not a root comment of subject {}",
                    root.id, c.subject_id
                )));
            }
        }
        let comment = self.db.insert_comment(c).await?;
        tracing::debug!(comment = %comment.id, subject = %comment.subject_id, level = ?comment.level(), "created comment");
        apply_delta(&self.db, &comment, Delta::Increment).await;
        Ok(comment)
    }

    pub async fn get_comment(&self, id: CommentId) -> Result<Comment, Error> {
        self.db.find_comment(id).await
    }

    pub async fn list_comments(
        &self,
        filter: &CommentFilter,
        p: &Pagination,
    ) -> Result<Page<Comment>, Error> {
        let window = p.time_window()?;
        let (items, total) = futures::try_join!(
            self.db.find_comments(filter, &window),
            self.db.count_comments(filter),
        )?;
        Ok(p.finish(items, total))
    }

    /// Under the subject, lists root comments each with the first replies
    /// below it. Under a root comment, lists its replies.
    pub async fn get_comment_blocks(
        &self,
        subject_id: SubjectId,
        root_id: Uuid,
        p: &Pagination,
    ) -> Result<CommentBlocks, Error> {
        if root_id != subject_id.0 {
            let replies = self.list_comments(&CommentFilter::by_root(root_id), p).await?;
            return Ok(CommentBlocks::Replies(replies));
        }
        let roots = self
            .list_comments(
                &CommentFilter {
                    subject_id: Some(subject_id),
                    root_id: Some(subject_id.0),
                    father_id: Some(subject_id.0),
                    ..CommentFilter::default()
                },
                p,
            )
            .await?;
        let first_replies = Pagination::first(BLOCK_REPLIES);
        let filters = roots
            .items
            .iter()
            .map(|r| CommentFilter::by_root(r.id.0))
            .collect::<Vec<_>>();
        let replies = futures::future::try_join_all(
            filters
                .iter()
                .map(|f| self.list_comments(f, &first_replies)),
        )
        .await?;
        let Page {
            items,
            total,
            token,
        } = roots;
        Ok(CommentBlocks::Roots(Page {
            items: items
                .into_iter()
                .zip(replies)
                .map(|(root, replies)| CommentBlock { root, replies })
                .collect(),
            total,
            token,
        }))
    }

    pub async fn update_comment(&self, id: CommentId, patch: &CommentPatch) -> Result<(), Error> {
        self.db.update_comment(id, patch).await
    }

    pub async fn set_comment_attrs(
        &self,
        subject_id: SubjectId,
        comment_id: CommentId,
        attrs: Attrs,
    ) -> Result<PinPlan, Error> {
        let plan = pin::set_attrs(
            &self.db,
            subject_id,
            comment_id,
            attrs,
            self.config.release_mode,
        )
        .await?;
        tracing::info!(subject = %subject_id, comment = %comment_id, ?attrs, "set comment attrs");
        Ok(plan)
    }

    pub async fn delete_comment(&self, id: CommentId) -> Result<(), Error> {
        let comment = self.db.find_comment(id).await?;
        match self.db.delete_comment(id).await? {
            0 => return Err(Error::NotFound),
            1 => (),
            n => {
                tracing::warn!(comment = %id, deleted = n, "deleted more than one comment, leaving counters alone");
                return Ok(());
            }
        }
        let clear_top = async {
            if let Err(err) = self.db.clear_top_comment(comment.subject_id, id).await {
                tracing::warn!(?err, subject = %comment.subject_id, comment = %id, "failed clearing top comment slot");
            }
        };
        futures::join!(apply_delta(&self.db, &comment, Delta::Decrement), clear_top);
        tracing::debug!(comment = %id, "deleted comment");
        Ok(())
    }

    /// Deletes each of the comments, skipping the ones already gone, and
    /// returns the number actually deleted
    pub async fn delete_comments(&self, ids: &[CommentId]) -> Result<u64, Error> {
        let mut deleted = 0;
        for id in ids {
            match self.delete_comment(*id).await {
                Ok(()) => deleted += 1,
                Err(Error::NotFound) => tracing::debug!(comment = %id, "comment already deleted"),
                Err(e) => return Err(e),
            }
        }
        Ok(deleted)
    }
}
