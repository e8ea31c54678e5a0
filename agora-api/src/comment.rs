use crate::{
    classify, millis, CommentId, Error, LabelId, Level, Page, Pagination, SortKey, SubjectId,
    Time, UserId, Uuid,
};

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum State {
    #[default]
    Normal,
    Deleted,
}

impl State {
    pub fn to_i16(self) -> i16 {
        match self {
            State::Normal => 1,
            State::Deleted => 2,
        }
    }

    pub fn from_i16(v: i16) -> Option<State> {
        match v {
            1 => Some(State::Normal),
            2 => Some(State::Deleted),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Attrs {
    #[default]
    None,
    Highlighted,
    Pinned,
    PinnedHighlighted,
}

impl Attrs {
    pub fn is_pinned(self) -> bool {
        matches!(self, Attrs::Pinned | Attrs::PinnedHighlighted)
    }

    pub fn to_i16(self) -> i16 {
        match self {
            Attrs::None => 1,
            Attrs::Highlighted => 2,
            Attrs::Pinned => 3,
            Attrs::PinnedHighlighted => 4,
        }
    }

    pub fn from_i16(v: i16) -> Option<Attrs> {
        match v {
            1 => Some(Attrs::None),
            2 => Some(Attrs::Highlighted),
            3 => Some(Attrs::Pinned),
            4 => Some(Attrs::PinnedHighlighted),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Comment {
    pub id: CommentId,
    pub subject_id: SubjectId,

    /// Either the subject id (root comment) or the id of the root comment
    pub root_id: Uuid,

    /// Either the subject id (root comment) or the id of the comment replied to
    pub father_id: Uuid,

    pub user_id: UserId,
    pub at_user_id: Option<UserId>,
    pub content: String,
    pub meta: String,
    pub labels: Vec<LabelId>,

    /// Number of replies, only maintained on root comments
    pub count: i64,

    pub state: State,
    pub attrs: Attrs,
    pub create_time: Time,
    pub sort_time: i64,
}

impl Comment {
    pub fn level(&self) -> Level {
        classify(&self.root_id, &self.father_id, &self.subject_id.0)
    }

    /// The root comment whose reply count this comment contributes to
    pub fn root_comment(&self) -> Option<CommentId> {
        match self.level() {
            Level::Root => None,
            Level::Reply => Some(CommentId(self.root_id)),
        }
    }

    /// Sort time of this comment when it is not pinned
    pub fn natural_sort_time(&self) -> i64 {
        millis(&self.create_time)
    }
}

impl SortKey for Comment {
    type Key = i64;

    fn sort_key(&self) -> i64 {
        self.sort_time
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewComment {
    pub subject_id: SubjectId,
    pub root_id: Uuid,
    pub father_id: Uuid,
    pub user_id: UserId,
    #[serde(default)]
    pub at_user_id: Option<UserId>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub meta: String,
    #[serde(default)]
    pub labels: Vec<LabelId>,
}

impl NewComment {
    pub fn root(subject_id: SubjectId, user_id: UserId, content: String) -> NewComment {
        NewComment {
            subject_id,
            root_id: subject_id.0,
            father_id: subject_id.0,
            user_id,
            at_user_id: None,
            content,
            meta: String::new(),
            labels: Vec::new(),
        }
    }

    pub fn reply(root: &Comment, father: &Comment, user_id: UserId, content: String) -> NewComment {
        NewComment {
            subject_id: root.subject_id,
            root_id: root.id.0,
            father_id: father.id.0,
            user_id,
            at_user_id: Some(father.user_id),
            content,
            meta: String::new(),
            labels: Vec::new(),
        }
    }

    /// Rejects the shapes where only one of root and father points at the subject
    pub fn validate(&self) -> Result<(), Error> {
        let subject = self.subject_id.0;
        if (self.root_id == subject) != (self.father_id == subject) {
            return Err(Error::IllegalOperation(format!(
                "root {} and father {} disagree on whether comment is a root of subject {}",
                self.root_id, self.father_id, subject
            )));
        }
        Ok(())
    }

    pub fn into_comment(self, id: CommentId, now: Time) -> Comment {
        Comment {
            id,
            subject_id: self.subject_id,
            root_id: self.root_id,
            father_id: self.father_id,
            user_id: self.user_id,
            at_user_id: self.at_user_id,
            content: self.content,
            meta: self.meta,
            labels: self.labels,
            count: 0,
            state: State::Normal,
            attrs: Attrs::None,
            create_time: now,
            sort_time: millis(&now),
        }
    }
}

/// Fields of a comment that callers may change directly
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CommentPatch {
    #[serde(default)]
    pub meta: Option<String>,
    #[serde(default)]
    pub labels: Option<Vec<LabelId>>,
    #[serde(default)]
    pub state: Option<State>,
}

impl CommentPatch {
    pub fn apply(&self, c: &mut Comment) {
        if let Some(meta) = &self.meta {
            c.meta = meta.clone();
        }
        if let Some(labels) = &self.labels {
            c.labels = labels.clone();
        }
        if let Some(state) = self.state {
            c.state = state;
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CommentFilter {
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub at_user_id: Option<UserId>,
    #[serde(default)]
    pub subject_id: Option<SubjectId>,
    #[serde(default)]
    pub root_id: Option<Uuid>,
    #[serde(default)]
    pub father_id: Option<Uuid>,
    #[serde(default)]
    pub ids: Option<Vec<CommentId>>,
    #[serde(default)]
    pub state: Option<State>,
    #[serde(default)]
    pub attrs: Option<Attrs>,
}

impl CommentFilter {
    pub fn by_root(root_id: Uuid) -> CommentFilter {
        CommentFilter {
            root_id: Some(root_id),
            ..CommentFilter::default()
        }
    }

    pub fn matches(&self, c: &Comment) -> bool {
        self.user_id.map_or(true, |u| c.user_id == u)
            && self.at_user_id.map_or(true, |u| c.at_user_id == Some(u))
            && self.subject_id.map_or(true, |s| c.subject_id == s)
            && self.root_id.map_or(true, |r| c.root_id == r)
            && self.father_id.map_or(true, |f| c.father_id == f)
            && self.ids.as_ref().map_or(true, |ids| ids.contains(&c.id))
            && self.state.map_or(true, |s| c.state == s)
            && self.attrs.map_or(true, |a| c.attrs == a)
    }
}

/// A root comment together with the first page of its replies
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CommentBlock {
    pub root: Comment,
    pub replies: Page<Comment>,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(tag = "kind", content = "page", rename_all = "kebab-case")]
pub enum CommentBlocks {
    /// Listing directly under the subject
    Roots(Page<CommentBlock>),

    /// Listing under a root comment
    Replies(Page<Comment>),
}

#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ListComments {
    #[serde(default)]
    pub filter: CommentFilter,
    #[serde(default)]
    pub pagination: Pagination,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CommentBlocksQuery {
    pub subject_id: SubjectId,
    pub root_id: Uuid,
    #[serde(default)]
    pub pagination: Pagination,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SetAttrs {
    pub attrs: Attrs,
}
