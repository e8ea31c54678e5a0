use crate::{Attrs, CommentId, State, SubjectId, Time, UserId};

/// Relation node type under which user nodes are stored
pub const USER_NODE_TYPE: i64 = 1;

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Subject {
    pub id: SubjectId,
    pub user_id: UserId,

    /// Comment currently pinned at the top of the subject, if any
    pub top_comment_id: Option<CommentId>,

    /// Number of root comments
    pub root_count: i64,

    /// Number of comments at any level
    pub all_count: i64,

    pub state: State,
    pub attrs: Attrs,
    pub create_time: Time,
    pub update_time: Time,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewSubject {
    /// Subjects usually share the id of the object they discuss
    #[serde(default)]
    pub id: Option<SubjectId>,
    pub user_id: UserId,
    #[serde(default)]
    pub state: State,
    #[serde(default)]
    pub attrs: Attrs,
}

impl NewSubject {
    pub fn new(user_id: UserId) -> NewSubject {
        NewSubject {
            id: None,
            user_id,
            state: State::Normal,
            attrs: Attrs::None,
        }
    }

    pub fn into_subject(self, id: SubjectId, now: Time) -> Subject {
        Subject {
            id,
            user_id: self.user_id,
            top_comment_id: None,
            root_count: 0,
            all_count: 0,
            state: self.state,
            attrs: self.attrs,
            create_time: now,
            update_time: now,
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SubjectPatch {
    #[serde(default)]
    pub state: Option<State>,
    #[serde(default)]
    pub attrs: Option<Attrs>,
}

impl SubjectPatch {
    pub fn apply(&self, s: &mut Subject, now: Time) {
        if let Some(state) = self.state {
            s.state = state;
        }
        if let Some(attrs) = self.attrs {
            s.attrs = attrs;
        }
        s.update_time = now;
    }
}

/// Published once a subject is gone, so that relation owners can drop the
/// edges hanging off the subject's author
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct DeleteCommentRelations {
    pub from_type: i64,
    pub from_id: String,
}

impl DeleteCommentRelations {
    pub fn for_author(user_id: UserId) -> DeleteCommentRelations {
        DeleteCommentRelations {
            from_type: USER_NODE_TYPE,
            from_id: user_id.to_string(),
        }
    }
}
