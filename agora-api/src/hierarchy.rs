#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Level {
    /// First-level comment, directly under the subject
    Root,

    /// Second- or third-level comment, counted against its root comment
    Reply,
}

/// Both the create and the delete paths go through this, so that counter
/// adjustments stay symmetric.
pub fn classify<T: PartialEq + ?Sized>(root_id: &T, father_id: &T, subject_id: &T) -> Level {
    if root_id == subject_id && father_id == subject_id {
        Level::Root
    } else {
        Level::Reply
    }
}
