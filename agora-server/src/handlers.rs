use agora_api::{
    Comment, CommentBlocks, CommentBlocksQuery, CommentId, CommentPatch, Db, Label, LabelId,
    LabelPatch, ListComments, ListObjects, ListRelations, NewComment, NewLabel, NewLabelObject,
    NewSubject, Node, ObjectId, Page, PathCountQuery, PathQuery, Relation, RelationFilter,
    RelationKey, ScoredLabel, SearchLabels, SetAttrs, Subject, SubjectId, SubjectPatch,
};
use axum::extract::State;

use crate::{extractors::*, Error};

pub async fn create_subject<D: Db>(
    State(state): State<AppState<D>>,
    Json(data): Json<NewSubject>,
) -> Result<Json<Subject>, Error> {
    Ok(Json(state.service.create_subject(data).await?))
}

pub async fn get_subject<D: Db>(
    State(state): State<AppState<D>>,
    IdPath(id): IdPath<SubjectId>,
) -> Result<Json<Subject>, Error> {
    Ok(Json(state.service.get_subject(id).await?))
}

pub async fn update_subject<D: Db>(
    State(state): State<AppState<D>>,
    IdPath(id): IdPath<SubjectId>,
    Json(patch): Json<SubjectPatch>,
) -> Result<(), Error> {
    Ok(state.service.update_subject(id, &patch).await?)
}

pub async fn delete_subject<D: Db>(
    State(state): State<AppState<D>>,
    IdPath(id): IdPath<SubjectId>,
) -> Result<(), Error> {
    Ok(state.service.delete_subject(id).await?)
}

pub async fn set_comment_attrs<D: Db>(
    State(state): State<AppState<D>>,
    CommentPath(subject, comment): CommentPath<SubjectId, CommentId>,
    Json(data): Json<SetAttrs>,
) -> Result<Json<Comment>, Error> {
    state
        .service
        .set_comment_attrs(subject, comment, data.attrs)
        .await?;
    Ok(Json(state.service.get_comment(comment).await?))
}

pub async fn create_comment<D: Db>(
    State(state): State<AppState<D>>,
    Json(data): Json<NewComment>,
) -> Result<Json<Comment>, Error> {
    Ok(Json(state.service.create_comment(data).await?))
}

pub async fn get_comment<D: Db>(
    State(state): State<AppState<D>>,
    IdPath(id): IdPath<CommentId>,
) -> Result<Json<Comment>, Error> {
    Ok(Json(state.service.get_comment(id).await?))
}

pub async fn list_comments<D: Db>(
    State(state): State<AppState<D>>,
    Json(q): Json<ListComments>,
) -> Result<Json<Page<Comment>>, Error> {
    Ok(Json(
        state
            .service
            .list_comments(&q.filter, &q.pagination)
            .await?,
    ))
}

pub async fn get_comment_blocks<D: Db>(
    State(state): State<AppState<D>>,
    Json(q): Json<CommentBlocksQuery>,
) -> Result<Json<CommentBlocks>, Error> {
    Ok(Json(
        state
            .service
            .get_comment_blocks(q.subject_id, q.root_id, &q.pagination)
            .await?,
    ))
}

pub async fn update_comment<D: Db>(
    State(state): State<AppState<D>>,
    IdPath(id): IdPath<CommentId>,
    Json(patch): Json<CommentPatch>,
) -> Result<(), Error> {
    Ok(state.service.update_comment(id, &patch).await?)
}

pub async fn delete_comment<D: Db>(
    State(state): State<AppState<D>>,
    IdPath(id): IdPath<CommentId>,
) -> Result<(), Error> {
    Ok(state.service.delete_comment(id).await?)
}

pub async fn delete_comments<D: Db>(
    State(state): State<AppState<D>>,
    Json(ids): Json<Vec<CommentId>>,
) -> Result<Json<u64>, Error> {
    Ok(Json(state.service.delete_comments(&ids).await?))
}

pub async fn create_label<D: Db>(
    State(state): State<AppState<D>>,
    Json(data): Json<NewLabel>,
) -> Result<Json<Label>, Error> {
    Ok(Json(state.service.create_label(data).await?))
}

pub async fn get_label<D: Db>(
    State(state): State<AppState<D>>,
    IdPath(id): IdPath<LabelId>,
) -> Result<Json<Label>, Error> {
    Ok(Json(state.service.get_label(id).await?))
}

pub async fn get_labels_in_batch<D: Db>(
    State(state): State<AppState<D>>,
    Json(ids): Json<Vec<LabelId>>,
) -> Result<Json<Vec<Option<Label>>>, Error> {
    Ok(Json(state.service.get_labels_in_batch(&ids).await?))
}

pub async fn update_label<D: Db>(
    State(state): State<AppState<D>>,
    IdPath(id): IdPath<LabelId>,
    Json(patch): Json<LabelPatch>,
) -> Result<(), Error> {
    Ok(state.service.update_label(id, &patch).await?)
}

pub async fn delete_label<D: Db>(
    State(state): State<AppState<D>>,
    IdPath(id): IdPath<LabelId>,
) -> Result<(), Error> {
    Ok(state.service.delete_label(id).await?)
}

pub async fn search_labels<D: Db>(
    State(state): State<AppState<D>>,
    Json(q): Json<SearchLabels>,
) -> Result<Json<Page<ScoredLabel>>, Error> {
    Ok(Json(
        state
            .service
            .search_labels(&q.text, &q.pagination)
            .await?,
    ))
}

pub async fn create_object<D: Db>(
    State(state): State<AppState<D>>,
    Json(data): Json<NewLabelObject>,
) -> Result<(), Error> {
    Ok(state.service.create_object(data).await?)
}

pub async fn create_objects<D: Db>(
    State(state): State<AppState<D>>,
    Json(data): Json<Vec<NewLabelObject>>,
) -> Result<(), Error> {
    Ok(state.service.create_objects(data).await?)
}

pub async fn update_object<D: Db>(
    State(state): State<AppState<D>>,
    Json(data): Json<NewLabelObject>,
) -> Result<(), Error> {
    Ok(state.service.update_object(&data).await?)
}

pub async fn delete_object<D: Db>(
    State(state): State<AppState<D>>,
    IdPath(id): IdPath<ObjectId>,
) -> Result<(), Error> {
    Ok(state.service.delete_object(id).await?)
}

pub async fn get_objects<D: Db>(
    State(state): State<AppState<D>>,
    Json(q): Json<ListObjects>,
) -> Result<Json<Page<ObjectId>>, Error> {
    Ok(Json(
        state
            .service
            .get_objects(&q.filter, &q.pagination)
            .await?,
    ))
}

pub async fn create_relation<D: Db>(
    State(state): State<AppState<D>>,
    Json(key): Json<RelationKey>,
) -> Result<Json<bool>, Error> {
    Ok(Json(state.service.create_relation(key).await?))
}

pub async fn get_relation<D: Db>(
    State(state): State<AppState<D>>,
    Json(key): Json<RelationKey>,
) -> Result<Json<Relation>, Error> {
    Ok(Json(state.service.get_relation(&key).await?))
}

pub async fn delete_relation<D: Db>(
    State(state): State<AppState<D>>,
    Json(key): Json<RelationKey>,
) -> Result<Json<u64>, Error> {
    Ok(Json(state.service.delete_relation(&key).await?))
}

pub async fn list_relations<D: Db>(
    State(state): State<AppState<D>>,
    Json(q): Json<ListRelations>,
) -> Result<Json<Page<Relation>>, Error> {
    Ok(Json(
        state
            .service
            .list_relations(&q.filter, &q.pagination)
            .await?,
    ))
}

pub async fn count_relations<D: Db>(
    State(state): State<AppState<D>>,
    Json(filter): Json<RelationFilter>,
) -> Result<Json<u64>, Error> {
    Ok(Json(state.service.count_relations(&filter).await?))
}

pub async fn delete_node<D: Db>(
    State(state): State<AppState<D>>,
    Json(node): Json<Node>,
) -> Result<Json<u64>, Error> {
    Ok(Json(state.service.delete_node(&node).await?))
}

pub async fn relation_paths<D: Db>(
    State(state): State<AppState<D>>,
    Json(q): Json<PathQuery>,
) -> Result<Json<Vec<Relation>>, Error> {
    Ok(Json(state.service.relation_paths(&q).await?))
}

pub async fn relation_paths_count<D: Db>(
    State(state): State<AppState<D>>,
    Json(q): Json<PathCountQuery>,
) -> Result<Json<u64>, Error> {
    Ok(Json(state.service.relation_paths_count(&q).await?))
}
