use crate::{Comment, CommentStore, Level, SubjectStore};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Delta {
    Increment,
    Decrement,
}

impl Delta {
    pub fn value(self) -> i64 {
        match self {
            Delta::Increment => 1,
            Delta::Decrement => -1,
        }
    }

    /// Adjustments to the subject's (all, root) counters and to the root
    /// comment's reply counter caused by `comment` appearing or disappearing
    pub fn split(self, comment: &Comment) -> (i64, i64, i64) {
        let d = self.value();
        match comment.level() {
            Level::Root => (d, d, 0),
            Level::Reply => (d, 0, d),
        }
    }
}

/// Applies the counter adjustments for `comment`. Both legs run concurrently
/// and are best-effort: failures are logged and never reach the caller.
pub async fn apply_delta<D>(db: &D, comment: &Comment, delta: Delta)
where
    D: CommentStore + SubjectStore + ?Sized,
{
    let (all, root, replies) = delta.split(comment);
    let subject_leg = db.increment_subject_counts(comment.subject_id, all, root);
    let comment_leg = async {
        match comment.root_comment() {
            Some(root_id) => db.increment_comment_count(root_id, replies).await,
            None => Ok(()),
        }
    };
    let (subject_res, comment_res) = futures::join!(subject_leg, comment_leg);
    if let Err(err) = subject_res {
        tracing::warn!(
            ?err,
            subject = %comment.subject_id,
            comment = %comment.id,
            ?delta,
            "failed updating subject counters"
        );
    }
    if let Err(err) = comment_res {
        tracing::warn!(
            ?err,
            root = %comment.root_id,
            comment = %comment.id,
            ?delta,
            "failed updating root comment reply counter"
        );
    }
}
