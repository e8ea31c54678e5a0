use std::str::FromStr;

use crate::{Attrs, Comment, CommentId, Error, PinTxn, Subject, SubjectId, Transactional};

/// Sort time of pinned comments, above any real timestamp
pub const PINNED_SORT_TIME: i64 = i64::MAX - 1;

/// What happens to the top comment slot when a comment other than the one
/// currently pinned is set to a non-pinned value
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReleaseMode {
    /// The target comment takes over the slot
    Adopt,

    /// The slot is emptied
    #[default]
    Clear,
}

impl FromStr for ReleaseMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<ReleaseMode> {
        match s {
            "adopt" => Ok(ReleaseMode::Adopt),
            "clear" => Ok(ReleaseMode::Clear),
            _ => Err(anyhow::anyhow!("unknown release mode {s:?}, expected adopt or clear")),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PinState {
    Empty,
    PinnedSelf,
    PinnedOther(CommentId),
}

impl PinState {
    pub fn of(subject: &Subject, target: CommentId) -> PinState {
        match subject.top_comment_id {
            None => PinState::Empty,
            Some(top) if top == target => PinState::PinnedSelf,
            Some(top) => PinState::PinnedOther(top),
        }
    }
}

/// Writes needed to move a subject to its new pin state. Fields left `None`
/// need no write.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PinPlan {
    /// New value of the subject's top comment slot
    pub top_comment: Option<Option<CommentId>>,

    /// Previous top comment, to be put back at its natural position
    pub demote: Option<CommentId>,

    /// New attrs and sort time of the target comment
    pub target: Option<(Attrs, i64)>,
}

impl PinPlan {
    pub fn is_noop(&self) -> bool {
        self.top_comment.is_none() && self.demote.is_none() && self.target.is_none()
    }
}

pub fn plan_pin(state: PinState, target: &Comment, attrs: Attrs, mode: ReleaseMode) -> PinPlan {
    let sort_time = if attrs.is_pinned() {
        PINNED_SORT_TIME
    } else {
        target.natural_sort_time()
    };
    let target_write = if (target.attrs, target.sort_time) != (attrs, sort_time) {
        Some((attrs, sort_time))
    } else {
        None
    };
    let (top_comment, demote) = match (state, attrs.is_pinned()) {
        (PinState::Empty, true) => (Some(Some(target.id)), None),
        (PinState::Empty, false) => (None, None),
        (PinState::PinnedSelf, true) => (None, None),
        (PinState::PinnedSelf, false) => (Some(None), None),
        (PinState::PinnedOther(old), true) => (Some(Some(target.id)), Some(old)),
        (PinState::PinnedOther(old), false) => match mode {
            ReleaseMode::Adopt => (Some(Some(target.id)), Some(old)),
            ReleaseMode::Clear => (Some(None), Some(old)),
        },
    };
    PinPlan {
        top_comment,
        demote,
        target: target_write,
    }
}

async fn apply<T: PinTxn>(
    txn: &mut T,
    subject_id: SubjectId,
    comment_id: CommentId,
    attrs: Attrs,
    mode: ReleaseMode,
) -> Result<PinPlan, Error> {
    let subject = txn.lock_subject(subject_id).await?;
    let target = txn.find_comment(comment_id).await?;
    if target.subject_id != subject_id {
        return Err(Error::IllegalOperation(format!(
            "comment {comment_id} does not belong to subject {subject_id}"
        )));
    }

    let state = PinState::of(&subject, comment_id);
    let plan = plan_pin(state, &target, attrs, mode);
    tracing::debug!(subject = %subject_id, comment = %comment_id, ?state, ?plan, "pinning");

    if let Some(top) = plan.top_comment {
        txn.set_top_comment(subject_id, top).await?;
    }
    if let Some(old) = plan.demote {
        match txn.find_comment(old).await {
            Ok(old) => {
                txn.set_comment_attrs(old.id, Attrs::None, old.natural_sort_time())
                    .await?
            }
            Err(Error::NotFound) => tracing::warn!(
                subject = %subject_id,
                top = %old,
                "top comment slot referenced a missing comment"
            ),
            Err(e) => return Err(e),
        }
    }
    if let Some((attrs, sort_time)) = plan.target {
        txn.set_comment_attrs(comment_id, attrs, sort_time).await?;
    }
    Ok(plan)
}

/// Sets the attrs of a comment, moving the subject's top comment slot as
/// needed, all in one transaction
pub(crate) async fn set_attrs<D: Transactional + ?Sized>(
    db: &D,
    subject_id: SubjectId,
    comment_id: CommentId,
    attrs: Attrs,
    mode: ReleaseMode,
) -> Result<PinPlan, Error> {
    let mut txn = db.begin().await?;
    let res = apply(&mut txn, subject_id, comment_id, attrs, mode).await;
    match res {
        Ok(plan) => {
            txn.commit().await?;
            Ok(plan)
        }
        Err(err) => {
            if let Err(abort_err) = txn.abort().await {
                tracing::error!(?abort_err, ?err, "failed aborting pin transaction");
            }
            Err(err)
        }
    }
}
