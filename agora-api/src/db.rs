use crate::{
    Attrs, Comment, CommentFilter, CommentId, CommentPatch, DeleteCommentRelations, Error, Label,
    LabelId, LabelObject, LabelPatch, NewComment, NewLabel, NewLabelObject, NewSubject, Node,
    ObjectFilter, ObjectId, PathCountQuery, PathQuery, Relation, RelationFilter, RelationKey,
    ScoreKey, ScoredLabel, Subject, SubjectId, SubjectPatch, Uuid, Window,
};

#[async_trait::async_trait]
pub trait CommentStore: Send + Sync {
    /// Assigns the id and timestamps of the new comment
    async fn insert_comment(&self, c: NewComment) -> Result<Comment, Error>;

    async fn find_comment(&self, id: CommentId) -> Result<Comment, Error>;

    /// Returns the comments in query order, see `Window::select`
    async fn find_comments(
        &self,
        filter: &CommentFilter,
        window: &Window<i64>,
    ) -> Result<Vec<Comment>, Error>;

    async fn count_comments(&self, filter: &CommentFilter) -> Result<u64, Error>;

    async fn update_comment(&self, id: CommentId, patch: &CommentPatch) -> Result<(), Error>;

    async fn increment_comment_count(&self, id: CommentId, delta: i64) -> Result<(), Error>;

    /// Returns the number of deleted comments
    async fn delete_comment(&self, id: CommentId) -> Result<u64, Error>;
}

#[async_trait::async_trait]
pub trait SubjectStore: Send + Sync {
    async fn insert_subject(&self, s: NewSubject) -> Result<Subject, Error>;

    async fn find_subject(&self, id: SubjectId) -> Result<Subject, Error>;

    async fn update_subject(&self, id: SubjectId, patch: &SubjectPatch) -> Result<(), Error>;

    async fn increment_subject_counts(
        &self,
        id: SubjectId,
        all: i64,
        root: i64,
    ) -> Result<(), Error>;

    /// Empties the top comment slot if it still holds `comment`, returning
    /// whether it did
    async fn clear_top_comment(&self, id: SubjectId, comment: CommentId) -> Result<bool, Error>;

    async fn delete_subject(&self, id: SubjectId) -> Result<u64, Error>;
}

/// Transaction scope for pinning. Dropping it without committing aborts.
#[async_trait::async_trait]
pub trait PinTxn: Send {
    /// Reads the subject and holds it until the end of the transaction
    async fn lock_subject(&mut self, id: SubjectId) -> Result<Subject, Error>;

    async fn find_comment(&mut self, id: CommentId) -> Result<Comment, Error>;

    async fn set_top_comment(
        &mut self,
        subject: SubjectId,
        top: Option<CommentId>,
    ) -> Result<(), Error>;

    async fn set_comment_attrs(
        &mut self,
        id: CommentId,
        attrs: Attrs,
        sort_time: i64,
    ) -> Result<(), Error>;

    async fn commit(self) -> Result<(), Error>;

    async fn abort(self) -> Result<(), Error>;
}

#[async_trait::async_trait]
pub trait Transactional: Send + Sync {
    type Txn: PinTxn;

    async fn begin(&self) -> Result<Self::Txn, Error>;
}

#[async_trait::async_trait]
pub trait LabelStore: Send + Sync {
    async fn insert_label(&self, l: NewLabel) -> Result<Label, Error>;

    async fn find_label(&self, id: LabelId) -> Result<Label, Error>;

    /// Returns the labels found, in no particular order
    async fn find_labels(&self, ids: &[LabelId]) -> Result<Vec<Label>, Error>;

    async fn update_label(&self, id: LabelId, patch: &LabelPatch) -> Result<(), Error>;

    async fn delete_label(&self, id: LabelId) -> Result<u64, Error>;

    /// Full-text search on label values, ordered by decreasing relevance.
    /// Returns the matching labels along with the total number of matches.
    async fn search_labels(
        &self,
        text: &str,
        window: &Window<ScoreKey>,
    ) -> Result<(Vec<ScoredLabel>, u64), Error>;

    /// Inserts all the objects, or none if any of their ids is already taken
    async fn insert_objects(&self, objects: Vec<LabelObject>) -> Result<(), Error>;

    async fn update_object(&self, o: &NewLabelObject) -> Result<(), Error>;

    async fn delete_object(&self, id: ObjectId) -> Result<u64, Error>;

    /// Returns the objects in query order, see `Window::select`
    async fn find_objects(
        &self,
        filter: &ObjectFilter,
        window: &Window<Uuid>,
    ) -> Result<Vec<LabelObject>, Error>;

    async fn count_objects(&self, filter: &ObjectFilter) -> Result<u64, Error>;
}

#[async_trait::async_trait]
pub trait RelationStore: Send + Sync {
    /// Returns `None` when an identical relation already exists
    async fn insert_relation(&self, key: RelationKey) -> Result<Option<Relation>, Error>;

    async fn find_relation(&self, key: &RelationKey) -> Result<Relation, Error>;

    async fn find_relations(
        &self,
        filter: &RelationFilter,
        window: &Window<i64>,
    ) -> Result<Vec<Relation>, Error>;

    async fn count_relations(&self, filter: &RelationFilter) -> Result<u64, Error>;

    async fn delete_relation(&self, key: &RelationKey) -> Result<u64, Error>;

    /// Deletes every relation starting or ending at `node`, atomically
    async fn delete_node(&self, node: &Node) -> Result<u64, Error>;
}

/// Everything the service needs from its primary storage
pub trait Db:
    CommentStore + SubjectStore + Transactional + LabelStore + RelationStore + 'static
{
}

impl<T> Db for T where
    T: CommentStore + SubjectStore + Transactional + LabelStore + RelationStore + 'static
{
}

/// Secondary copy of the relations, used for path queries
#[async_trait::async_trait]
pub trait GraphMirror: Send + Sync {
    async fn create_edge(&self, r: &Relation) -> Result<(), Error>;

    async fn delete_edge(&self, key: &RelationKey) -> Result<(), Error>;

    async fn delete_node(&self, node: &Node) -> Result<(), Error>;

    /// Ends of the two-hop paths described by `q`, most recent edge first
    async fn paths(&self, q: &PathQuery) -> Result<Vec<Relation>, Error>;

    async fn count_paths(&self, q: &PathCountQuery) -> Result<u64, Error>;
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, msg: &DeleteCommentRelations) -> Result<(), Error>;
}
