use std::{
    collections::{btree_map, BTreeMap, HashSet},
    sync::Arc,
};

use agora_api::{
    from_millis, millis, now, Attrs, Comment, CommentFilter, CommentId, CommentPatch,
    CommentStore, DeleteCommentRelations, Error, GraphMirror, Label, LabelId, LabelObject,
    LabelPatch, LabelStore, NewComment, NewLabel, NewLabelObject, NewSubject, Node, Notifier,
    ObjectFilter, ObjectId, PathCountQuery, PathQuery, PinTxn, Relation, RelationFilter,
    RelationId, RelationKey, RelationStore, ScoreKey, ScoredLabel, Subject, SubjectId,
    SubjectPatch, SubjectStore, Time, Transactional, Uuid, Window,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Operations that can be made to fail on demand
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FailPoint {
    SubjectCounts,
    CommentCount,
    ClearTopComment,
    SetTopComment,
    SetCommentAttrs,
    Commit,
    Search,
}

#[derive(Clone, Debug, Default)]
struct State {
    subjects: BTreeMap<SubjectId, Subject>,
    comments: BTreeMap<CommentId, Comment>,
    labels: BTreeMap<LabelId, Label>,
    objects: BTreeMap<ObjectId, LabelObject>,
    relations: Vec<Relation>,
    last_millis: i64,
    failures: HashSet<FailPoint>,
}

impl State {
    /// Strictly increasing clock, so that sort keys never collide
    fn tick(&mut self) -> Time {
        let now = now();
        let ms = std::cmp::max(millis(&now), self.last_millis + 1);
        self.last_millis = ms;
        from_millis(ms).unwrap_or(now)
    }

    fn check(&self, p: FailPoint) -> Result<(), Error> {
        if self.failures.contains(&p) {
            return Err(Error::StorageFailure(format!("injected failure at {p:?}")));
        }
        Ok(())
    }

    fn comment_mut(&mut self, id: CommentId) -> Result<&mut Comment, Error> {
        self.comments.get_mut(&id).ok_or(Error::NotFound)
    }

    fn subject_mut(&mut self, id: SubjectId) -> Result<&mut Subject, Error> {
        self.subjects.get_mut(&id).ok_or(Error::NotFound)
    }
}

/// In-memory store, cloning it yields a handle to the same data
#[derive(Clone, Default)]
pub struct MockDb(Arc<Mutex<State>>);

impl MockDb {
    pub fn new() -> MockDb {
        MockDb::default()
    }

    pub async fn fail_on(&self, p: FailPoint) {
        self.0.lock().await.failures.insert(p);
    }

    pub async fn heal(&self, p: FailPoint) {
        self.0.lock().await.failures.remove(&p);
    }

    pub async fn comments(&self) -> Vec<Comment> {
        self.0.lock().await.comments.values().cloned().collect()
    }

    pub async fn relations(&self) -> Vec<Relation> {
        self.0.lock().await.relations.clone()
    }
}

#[async_trait::async_trait]
impl CommentStore for MockDb {
    async fn insert_comment(&self, c: NewComment) -> Result<Comment, Error> {
        let mut s = self.0.lock().await;
        let now = s.tick();
        let comment = c.into_comment(CommentId::new(), now);
        s.comments.insert(comment.id, comment.clone());
        Ok(comment)
    }

    async fn find_comment(&self, id: CommentId) -> Result<Comment, Error> {
        self.0.lock().await.comments.get(&id).cloned().ok_or(Error::NotFound)
    }

    async fn find_comments(
        &self,
        filter: &CommentFilter,
        window: &Window<i64>,
    ) -> Result<Vec<Comment>, Error> {
        let s = self.0.lock().await;
        Ok(window.select(s.comments.values().filter(|c| filter.matches(c)).cloned()))
    }

    async fn count_comments(&self, filter: &CommentFilter) -> Result<u64, Error> {
        let s = self.0.lock().await;
        Ok(s.comments.values().filter(|c| filter.matches(c)).count() as u64)
    }

    async fn update_comment(&self, id: CommentId, patch: &CommentPatch) -> Result<(), Error> {
        let mut s = self.0.lock().await;
        patch.apply(s.comment_mut(id)?);
        Ok(())
    }

    async fn increment_comment_count(&self, id: CommentId, delta: i64) -> Result<(), Error> {
        let mut s = self.0.lock().await;
        s.check(FailPoint::CommentCount)?;
        s.comment_mut(id)?.count += delta;
        Ok(())
    }

    async fn delete_comment(&self, id: CommentId) -> Result<u64, Error> {
        let mut s = self.0.lock().await;
        Ok(s.comments.remove(&id).map_or(0, |_| 1))
    }
}

#[async_trait::async_trait]
impl SubjectStore for MockDb {
    async fn insert_subject(&self, new: NewSubject) -> Result<Subject, Error> {
        let mut s = self.0.lock().await;
        let now = s.tick();
        let id = new.id.unwrap_or_else(SubjectId::new);
        match s.subjects.entry(id) {
            btree_map::Entry::Occupied(_) => Err(Error::IllegalOperation(format!(
                "subject {id} already exists"
            ))),
            btree_map::Entry::Vacant(e) => Ok(e.insert(new.into_subject(id, now)).clone()),
        }
    }

    async fn find_subject(&self, id: SubjectId) -> Result<Subject, Error> {
        self.0.lock().await.subjects.get(&id).cloned().ok_or(Error::NotFound)
    }

    async fn update_subject(&self, id: SubjectId, patch: &SubjectPatch) -> Result<(), Error> {
        let mut s = self.0.lock().await;
        let now = s.tick();
        patch.apply(s.subject_mut(id)?, now);
        Ok(())
    }

    async fn increment_subject_counts(
        &self,
        id: SubjectId,
        all: i64,
        root: i64,
    ) -> Result<(), Error> {
        let mut s = self.0.lock().await;
        s.check(FailPoint::SubjectCounts)?;
        let now = s.tick();
        let subject = s.subject_mut(id)?;
        subject.all_count += all;
        subject.root_count += root;
        subject.update_time = now;
        Ok(())
    }

    async fn clear_top_comment(&self, id: SubjectId, comment: CommentId) -> Result<bool, Error> {
        let mut s = self.0.lock().await;
        s.check(FailPoint::ClearTopComment)?;
        let now = s.tick();
        match s.subjects.get_mut(&id) {
            Some(subject) if subject.top_comment_id == Some(comment) => {
                subject.top_comment_id = None;
                subject.update_time = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_subject(&self, id: SubjectId) -> Result<u64, Error> {
        let mut s = self.0.lock().await;
        Ok(s.subjects.remove(&id).map_or(0, |_| 1))
    }
}

/// Holds the whole store locked, staging writes until commit
pub struct MockTxn {
    guard: OwnedMutexGuard<State>,
    staged: State,
}

#[async_trait::async_trait]
impl PinTxn for MockTxn {
    async fn lock_subject(&mut self, id: SubjectId) -> Result<Subject, Error> {
        self.staged.subjects.get(&id).cloned().ok_or(Error::NotFound)
    }

    async fn find_comment(&mut self, id: CommentId) -> Result<Comment, Error> {
        self.staged.comments.get(&id).cloned().ok_or(Error::NotFound)
    }

    async fn set_top_comment(
        &mut self,
        subject: SubjectId,
        top: Option<CommentId>,
    ) -> Result<(), Error> {
        self.staged.check(FailPoint::SetTopComment)?;
        let now = self.staged.tick();
        let subject = self.staged.subject_mut(subject)?;
        subject.top_comment_id = top;
        subject.update_time = now;
        Ok(())
    }

    async fn set_comment_attrs(
        &mut self,
        id: CommentId,
        attrs: Attrs,
        sort_time: i64,
    ) -> Result<(), Error> {
        self.staged.check(FailPoint::SetCommentAttrs)?;
        let c = self.staged.comment_mut(id)?;
        c.attrs = attrs;
        c.sort_time = sort_time;
        Ok(())
    }

    async fn commit(mut self) -> Result<(), Error> {
        if self.guard.failures.contains(&FailPoint::Commit) {
            return Err(Error::TransactionAborted(String::from(
                "injected failure at commit",
            )));
        }
        *self.guard = self.staged;
        Ok(())
    }

    async fn abort(self) -> Result<(), Error> {
        Ok(())
    }
}

#[async_trait::async_trait]
impl Transactional for MockDb {
    type Txn = MockTxn;

    async fn begin(&self) -> Result<MockTxn, Error> {
        let guard = self.0.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(MockTxn { guard, staged })
    }
}

fn score(value: &str, terms: &[String]) -> f64 {
    let words = value
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<HashSet<_>>();
    terms.iter().filter(|t| words.contains(*t)).count() as f64
}

#[async_trait::async_trait]
impl LabelStore for MockDb {
    async fn insert_label(&self, l: NewLabel) -> Result<Label, Error> {
        let mut s = self.0.lock().await;
        let now = s.tick();
        let label = l.into_label(LabelId::new(), now);
        s.labels.insert(label.id, label.clone());
        Ok(label)
    }

    async fn find_label(&self, id: LabelId) -> Result<Label, Error> {
        self.0.lock().await.labels.get(&id).cloned().ok_or(Error::NotFound)
    }

    async fn find_labels(&self, ids: &[LabelId]) -> Result<Vec<Label>, Error> {
        let s = self.0.lock().await;
        Ok(ids.iter().filter_map(|id| s.labels.get(id).cloned()).collect())
    }

    async fn update_label(&self, id: LabelId, patch: &LabelPatch) -> Result<(), Error> {
        let mut s = self.0.lock().await;
        let now = s.tick();
        let label = s.labels.get_mut(&id).ok_or(Error::NotFound)?;
        patch.apply(label, now);
        Ok(())
    }

    async fn delete_label(&self, id: LabelId) -> Result<u64, Error> {
        let mut s = self.0.lock().await;
        Ok(s.labels.remove(&id).map_or(0, |_| 1))
    }

    async fn search_labels(
        &self,
        text: &str,
        window: &Window<ScoreKey>,
    ) -> Result<(Vec<ScoredLabel>, u64), Error> {
        let s = self.0.lock().await;
        if s.failures.contains(&FailPoint::Search) {
            return Err(Error::SearchFailure(String::from("injected failure at search")));
        }
        let terms = text
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>();
        let hits = s
            .labels
            .values()
            .map(|l| ScoredLabel {
                score: score(&l.value, &terms),
                label: l.clone(),
            })
            .filter(|l| l.score > 0.0)
            .collect::<Vec<_>>();
        let total = hits.len() as u64;
        Ok((window.select(hits), total))
    }

    async fn insert_objects(&self, objects: Vec<LabelObject>) -> Result<(), Error> {
        let mut s = self.0.lock().await;
        if let Some(o) = objects.iter().find(|o| s.objects.contains_key(&o.id)) {
            return Err(Error::IllegalOperation(format!("object {} already exists", o.id)));
        }
        s.objects.extend(objects.into_iter().map(|o| (o.id, o)));
        Ok(())
    }

    async fn update_object(&self, o: &NewLabelObject) -> Result<(), Error> {
        let mut s = self.0.lock().await;
        let now = s.tick();
        let object = s.objects.get_mut(&o.id).ok_or(Error::NotFound)?;
        object.object_type = o.object_type;
        object.labels = o.labels.clone();
        object.update_time = now;
        Ok(())
    }

    async fn delete_object(&self, id: ObjectId) -> Result<u64, Error> {
        let mut s = self.0.lock().await;
        Ok(s.objects.remove(&id).map_or(0, |_| 1))
    }

    async fn find_objects(
        &self,
        filter: &ObjectFilter,
        window: &Window<Uuid>,
    ) -> Result<Vec<LabelObject>, Error> {
        let s = self.0.lock().await;
        Ok(window.select(s.objects.values().filter(|o| filter.matches(o)).cloned()))
    }

    async fn count_objects(&self, filter: &ObjectFilter) -> Result<u64, Error> {
        let s = self.0.lock().await;
        Ok(s.objects.values().filter(|o| filter.matches(o)).count() as u64)
    }
}

#[async_trait::async_trait]
impl RelationStore for MockDb {
    async fn insert_relation(&self, key: RelationKey) -> Result<Option<Relation>, Error> {
        let mut s = self.0.lock().await;
        if s.relations.iter().any(|r| r.key == key) {
            return Ok(None);
        }
        let relation = Relation {
            id: RelationId::new(),
            key,
            create_time: s.tick(),
        };
        s.relations.push(relation.clone());
        Ok(Some(relation))
    }

    async fn find_relation(&self, key: &RelationKey) -> Result<Relation, Error> {
        let s = self.0.lock().await;
        s.relations
            .iter()
            .find(|r| r.key == *key)
            .cloned()
            .ok_or(Error::NotFound)
    }

    async fn find_relations(
        &self,
        filter: &RelationFilter,
        window: &Window<i64>,
    ) -> Result<Vec<Relation>, Error> {
        let s = self.0.lock().await;
        Ok(window.select(s.relations.iter().filter(|r| filter.matches(&r.key)).cloned()))
    }

    async fn count_relations(&self, filter: &RelationFilter) -> Result<u64, Error> {
        let s = self.0.lock().await;
        Ok(s.relations.iter().filter(|r| filter.matches(&r.key)).count() as u64)
    }

    async fn delete_relation(&self, key: &RelationKey) -> Result<u64, Error> {
        let mut s = self.0.lock().await;
        let before = s.relations.len();
        s.relations.retain(|r| r.key != *key);
        Ok((before - s.relations.len()) as u64)
    }

    async fn delete_node(&self, node: &Node) -> Result<u64, Error> {
        let mut s = self.0.lock().await;
        let before = s.relations.len();
        s.relations
            .retain(|r| r.key.from != *node && r.key.to != *node);
        Ok((before - s.relations.len()) as u64)
    }
}

#[derive(Debug, Default)]
struct GraphState {
    edges: Vec<Relation>,
    failing: bool,
}

impl GraphState {
    fn check(&self) -> Result<(), Error> {
        if self.failing {
            return Err(Error::StorageFailure(String::from("graph mirror unreachable")));
        }
        Ok(())
    }

    fn out_edges<'a>(&'a self, from: &'a Node, kind: i64) -> impl Iterator<Item = &'a Relation> {
        self.edges
            .iter()
            .filter(move |e| e.key.from == *from && e.key.relation_type == kind)
    }
}

/// In-memory graph mirror
#[derive(Clone, Default)]
pub struct MockGraph(Arc<Mutex<GraphState>>);

impl MockGraph {
    pub fn new() -> MockGraph {
        MockGraph::default()
    }

    pub async fn set_failing(&self, failing: bool) {
        self.0.lock().await.failing = failing;
    }

    pub async fn edges(&self) -> Vec<Relation> {
        self.0.lock().await.edges.clone()
    }
}

#[async_trait::async_trait]
impl GraphMirror for MockGraph {
    async fn create_edge(&self, r: &Relation) -> Result<(), Error> {
        let mut g = self.0.lock().await;
        g.check()?;
        if !g.edges.iter().any(|e| e.key == r.key) {
            g.edges.push(r.clone());
        }
        Ok(())
    }

    async fn delete_edge(&self, key: &RelationKey) -> Result<(), Error> {
        let mut g = self.0.lock().await;
        g.check()?;
        g.edges.retain(|e| e.key != *key);
        Ok(())
    }

    async fn delete_node(&self, node: &Node) -> Result<(), Error> {
        let mut g = self.0.lock().await;
        g.check()?;
        g.edges.retain(|e| e.key.from != *node && e.key.to != *node);
        Ok(())
    }

    async fn paths(&self, q: &PathQuery) -> Result<Vec<Relation>, Error> {
        let g = self.0.lock().await;
        g.check()?;
        let mut ends = g
            .out_edges(&q.from, q.first_edge)
            .flat_map(|first| g.out_edges(&first.key.to, q.second_edge))
            .cloned()
            .collect::<Vec<_>>();
        let mut seen = HashSet::new();
        ends.retain(|e| seen.insert(e.id));
        ends.sort_by(|a, b| b.create_time.cmp(&a.create_time));
        Ok(ends
            .into_iter()
            .skip(q.pagination.offset() as usize)
            .take(q.pagination.limit() as usize)
            .collect())
    }

    async fn count_paths(&self, q: &PathCountQuery) -> Result<u64, Error> {
        let g = self.0.lock().await;
        g.check()?;
        let ends = g
            .out_edges(&q.from, q.first_edge)
            .filter(|first| first.key.to.kind == q.via_type)
            .flat_map(|first| g.out_edges(&first.key.to, q.second_edge))
            .filter(|second| second.key.to.kind == q.to_type)
            .map(|second| &second.key.to)
            .collect::<HashSet<_>>();
        Ok(ends.len() as u64)
    }
}

#[derive(Debug, Default)]
struct NotifierState {
    sent: Vec<DeleteCommentRelations>,
    failing: bool,
}

/// Notifier recording every published message
#[derive(Clone, Default)]
pub struct MockNotifier(Arc<Mutex<NotifierState>>);

impl MockNotifier {
    pub fn new() -> MockNotifier {
        MockNotifier::default()
    }

    pub async fn set_failing(&self, failing: bool) {
        self.0.lock().await.failing = failing;
    }

    pub async fn sent(&self) -> Vec<DeleteCommentRelations> {
        self.0.lock().await.sent.clone()
    }
}

#[async_trait::async_trait]
impl Notifier for MockNotifier {
    async fn publish(&self, msg: &DeleteCommentRelations) -> Result<(), Error> {
        let mut n = self.0.lock().await;
        if n.failing {
            return Err(Error::PublishFailure(String::from("broker unreachable")));
        }
        tracing::debug!(?msg, "recording published message");
        n.sent.push(msg.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_api::{Pagination, UserId};

    #[tokio::test]
    async fn clock_never_repeats() {
        let db = MockDb::new();
        let subject = db
            .insert_subject(NewSubject::new(UserId::new()))
            .await
            .unwrap();
        let mut last = 0;
        for _ in 0..20 {
            let c = db
                .insert_comment(NewComment::root(subject.id, UserId::new(), String::new()))
                .await
                .unwrap();
            assert!(c.sort_time > last);
            last = c.sort_time;
        }
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_no_trace() {
        let db = MockDb::new();
        let subject = db
            .insert_subject(NewSubject::new(UserId::new()))
            .await
            .unwrap();
        {
            let mut txn = db.begin().await.unwrap();
            txn.set_top_comment(subject.id, Some(CommentId::new()))
                .await
                .unwrap();
        }
        assert_eq!(db.find_subject(subject.id).await.unwrap().top_comment_id, None);
    }

    #[tokio::test]
    async fn duplicate_subjects_are_rejected() {
        let db = MockDb::new();
        let mut new = NewSubject::new(UserId::new());
        new.id = Some(SubjectId::new());
        db.insert_subject(new.clone()).await.unwrap();
        assert!(matches!(
            db.insert_subject(new).await,
            Err(Error::IllegalOperation(_))
        ));
    }

    #[tokio::test]
    async fn two_hop_paths() {
        let g = MockGraph::new();
        let me = Node::new(1, "me");
        let friend = Node::new(1, "friend");
        let post = Node::new(2, "post");
        for (from, to, kind) in [(&me, &friend, 10), (&friend, &post, 20), (&me, &post, 20)] {
            g.create_edge(&Relation {
                id: RelationId::new(),
                key: RelationKey {
                    from: from.clone(),
                    to: to.clone(),
                    relation_type: kind,
                },
                create_time: now(),
            })
            .await
            .unwrap();
        }
        let paths = g
            .paths(&PathQuery {
                from: me.clone(),
                first_edge: 10,
                second_edge: 20,
                pagination: Pagination::default(),
            })
            .await
            .unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].key.to, post);
        let count = g
            .count_paths(&PathCountQuery {
                from: me,
                via_type: 1,
                first_edge: 10,
                second_edge: 20,
                to_type: 2,
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
