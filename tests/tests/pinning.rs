use std::panic::AssertUnwindSafe;

use agora_api::{
    Attrs, CommentId, CommentStore, Error, ReleaseMode, SubjectStore, PINNED_SORT_TIME,
};
use agora_mock_db::FailPoint;
use tests::Fixture;

#[tokio::test]
async fn pinning_another_comment_demotes_the_old_one() {
    let f = Fixture::new();
    let subject = f.subject().await;
    let a = f.root(&subject).await;
    let b = f.root(&subject).await;

    f.service
        .set_comment_attrs(subject.id, a.id, Attrs::Pinned)
        .await
        .unwrap();
    assert_eq!(f.fetch_subject(&subject).await.top_comment_id, Some(a.id));
    let pinned = f.fetch(&a).await;
    assert_eq!(pinned.attrs, Attrs::Pinned);
    assert_eq!(pinned.sort_time, PINNED_SORT_TIME);

    let plan = f
        .service
        .set_comment_attrs(subject.id, b.id, Attrs::PinnedHighlighted)
        .await
        .unwrap();
    assert_eq!(plan.demote, Some(a.id));
    assert_eq!(f.fetch_subject(&subject).await.top_comment_id, Some(b.id));
    let a = f.fetch(&a).await;
    assert_eq!(a.attrs, Attrs::None);
    assert_eq!(a.sort_time, a.natural_sort_time());
    let b = f.fetch(&b).await;
    assert_eq!(b.attrs, Attrs::PinnedHighlighted);
    assert_eq!(b.sort_time, PINNED_SORT_TIME);
}

#[tokio::test]
async fn repeated_requests_write_nothing() {
    let f = Fixture::new();
    let subject = f.subject().await;
    let a = f.root(&subject).await;
    let b = f.root(&subject).await;

    f.service
        .set_comment_attrs(subject.id, a.id, Attrs::Pinned)
        .await
        .unwrap();
    let again = f
        .service
        .set_comment_attrs(subject.id, a.id, Attrs::Pinned)
        .await
        .unwrap();
    assert!(again.is_noop(), "{again:?}");

    f.service
        .set_comment_attrs(subject.id, b.id, Attrs::Highlighted)
        .await
        .unwrap();
    let before = f.fetch_subject(&subject).await;
    let again = f
        .service
        .set_comment_attrs(subject.id, b.id, Attrs::Highlighted)
        .await
        .unwrap();
    assert!(again.is_noop(), "{again:?}");
    assert_eq!(f.fetch_subject(&subject).await, before);
}

#[tokio::test]
async fn unpinning_self_empties_the_slot() {
    let f = Fixture::new();
    let subject = f.subject().await;
    let a = f.root(&subject).await;
    f.service
        .set_comment_attrs(subject.id, a.id, Attrs::PinnedHighlighted)
        .await
        .unwrap();
    f.service
        .set_comment_attrs(subject.id, a.id, Attrs::Highlighted)
        .await
        .unwrap();
    assert_eq!(f.fetch_subject(&subject).await.top_comment_id, None);
    let a = f.fetch(&a).await;
    assert_eq!(a.attrs, Attrs::Highlighted);
    assert_eq!(a.sort_time, a.natural_sort_time());
}

#[tokio::test]
async fn release_modes() {
    for (mode, expected_top) in [(ReleaseMode::Clear, false), (ReleaseMode::Adopt, true)] {
        let f = Fixture::with_release_mode(mode);
        let subject = f.subject().await;
        let a = f.root(&subject).await;
        let b = f.root(&subject).await;
        f.service
            .set_comment_attrs(subject.id, a.id, Attrs::Pinned)
            .await
            .unwrap();
        f.service
            .set_comment_attrs(subject.id, b.id, Attrs::Highlighted)
            .await
            .unwrap();

        let top = f.fetch_subject(&subject).await.top_comment_id;
        assert_eq!(top, expected_top.then_some(b.id), "{mode:?}");
        assert_eq!(f.fetch(&a).await.attrs, Attrs::None, "{mode:?}");
        let b = f.fetch(&b).await;
        assert_eq!(b.attrs, Attrs::Highlighted, "{mode:?}");
        assert_eq!(b.sort_time, b.natural_sort_time(), "{mode:?}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_pins_leave_one_winner() {
    let f = Fixture::new();
    let subject = f.subject().await;
    let mut comments = Vec::new();
    for _ in 0..8 {
        comments.push(f.root(&subject).await);
    }

    let tasks = comments
        .iter()
        .map(|c| {
            let service = f.service.clone();
            let (subject, comment) = (subject.id, c.id);
            tokio::spawn(async move {
                service
                    .set_comment_attrs(subject, comment, Attrs::Pinned)
                    .await
            })
        })
        .collect::<Vec<_>>();
    for res in futures::future::join_all(tasks).await {
        res.expect("joining pin task").expect("pinning comment");
    }

    let pinned = f
        .db
        .comments()
        .await
        .into_iter()
        .filter(|c| c.attrs.is_pinned())
        .collect::<Vec<_>>();
    assert_eq!(pinned.len(), 1);
    assert_eq!(
        f.fetch_subject(&subject).await.top_comment_id,
        Some(pinned[0].id)
    );
}

#[tokio::test]
async fn failed_write_rolls_everything_back() {
    let f = Fixture::new();
    let subject = f.subject().await;
    let a = f.root(&subject).await;
    let b = f.root(&subject).await;
    f.service
        .set_comment_attrs(subject.id, a.id, Attrs::Pinned)
        .await
        .unwrap();

    f.db.fail_on(FailPoint::SetCommentAttrs).await;
    let res = f
        .service
        .set_comment_attrs(subject.id, b.id, Attrs::Pinned)
        .await;
    assert!(matches!(res, Err(Error::StorageFailure(_))), "{res:?}");
    f.db.heal(FailPoint::SetCommentAttrs).await;

    assert_eq!(f.fetch_subject(&subject).await.top_comment_id, Some(a.id));
    assert_eq!(f.fetch(&a).await.attrs, Attrs::Pinned);
    assert_eq!(f.fetch(&b).await.attrs, Attrs::None);
}

#[tokio::test]
async fn failed_commit_is_reported_as_aborted() {
    let f = Fixture::new();
    let subject = f.subject().await;
    let a = f.root(&subject).await;

    f.db.fail_on(FailPoint::Commit).await;
    let res = f
        .service
        .set_comment_attrs(subject.id, a.id, Attrs::Pinned)
        .await;
    assert!(matches!(res, Err(Error::TransactionAborted(_))), "{res:?}");
    assert_eq!(f.fetch_subject(&subject).await.top_comment_id, None);
    assert_eq!(f.fetch(&a).await.attrs, Attrs::None);
}

#[tokio::test]
async fn dangling_top_comment_is_replaced() {
    let f = Fixture::new();
    let subject = f.subject().await;
    let a = f.root(&subject).await;
    let b = f.root(&subject).await;
    f.service
        .set_comment_attrs(subject.id, a.id, Attrs::Pinned)
        .await
        .unwrap();
    // bypass the service so the slot keeps pointing at the deleted comment
    assert_eq!(f.db.delete_comment(a.id).await.unwrap(), 1);

    f.service
        .set_comment_attrs(subject.id, b.id, Attrs::Pinned)
        .await
        .unwrap();
    assert_eq!(f.fetch_subject(&subject).await.top_comment_id, Some(b.id));
}

#[tokio::test]
async fn deleting_the_top_comment_frees_the_slot() {
    let f = Fixture::new();
    let subject = f.subject().await;
    let a = f.root(&subject).await;
    f.service
        .set_comment_attrs(subject.id, a.id, Attrs::Pinned)
        .await
        .unwrap();
    f.service.delete_comment(a.id).await.unwrap();
    assert_eq!(f.fetch_subject(&subject).await.top_comment_id, None);

    // a failed clear is only logged
    let b = f.root(&subject).await;
    f.service
        .set_comment_attrs(subject.id, b.id, Attrs::Pinned)
        .await
        .unwrap();
    f.db.fail_on(FailPoint::ClearTopComment).await;
    f.service.delete_comment(b.id).await.unwrap();
    let s = f.db.find_subject(subject.id).await.unwrap();
    assert_eq!(s.top_comment_id, Some(b.id));
}

#[tokio::test]
async fn comments_stay_in_their_subject() {
    let f = Fixture::new();
    let subject = f.subject().await;
    let other = f.subject().await;
    let a = f.root(&other).await;

    let res = f
        .service
        .set_comment_attrs(subject.id, a.id, Attrs::Pinned)
        .await;
    assert!(matches!(res, Err(Error::IllegalOperation(_))), "{res:?}");
    assert_eq!(f.fetch_subject(&subject).await.top_comment_id, None);

    let res = f
        .service
        .set_comment_attrs(subject.id, CommentId::new(), Attrs::Pinned)
        .await;
    assert_eq!(res, Err(Error::NotFound));
}

const ALL_ATTRS: [Attrs; 4] = [
    Attrs::None,
    Attrs::Highlighted,
    Attrs::Pinned,
    Attrs::PinnedHighlighted,
];

#[test]
fn at_most_one_pinned_comment() {
    let runtime = AssertUnwindSafe(
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed initializing tokio runtime"),
    );
    bolero::check!()
        .with_type::<(bool, Vec<(u8, u8)>)>()
        .cloned()
        .for_each(move |(adopt, steps)| {
            let mode = match adopt {
                true => ReleaseMode::Adopt,
                false => ReleaseMode::Clear,
            };
            runtime.block_on(async move {
                let f = Fixture::with_release_mode(mode);
                let subject = f.subject().await;
                let mut comments = Vec::new();
                for _ in 0..4 {
                    comments.push(f.root(&subject).await);
                }
                for (comment, attrs) in steps.into_iter().take(32) {
                    let target = &comments[comment as usize % comments.len()];
                    let attrs = ALL_ATTRS[attrs as usize % ALL_ATTRS.len()];
                    f.service
                        .set_comment_attrs(subject.id, target.id, attrs)
                        .await
                        .unwrap();
                    assert_eq!(f.fetch(target).await.attrs, attrs);

                    let current = f.db.comments().await;
                    let pinned = current
                        .iter()
                        .filter(|c| c.attrs.is_pinned())
                        .collect::<Vec<_>>();
                    assert!(pinned.len() <= 1, "{mode:?}: {pinned:?}");
                    for c in &current {
                        match c.attrs.is_pinned() {
                            true => assert_eq!(c.sort_time, PINNED_SORT_TIME),
                            false => assert_eq!(c.sort_time, c.natural_sort_time()),
                        }
                    }

                    let top = f.fetch_subject(&subject).await.top_comment_id;
                    match (pinned.first(), mode) {
                        (Some(p), _) => assert_eq!(top, Some(p.id), "{mode:?}"),
                        (None, ReleaseMode::Clear) => assert_eq!(top, None),
                        // the slot may stay with the last comment that asked
                        (None, ReleaseMode::Adopt) => assert!(
                            top.map_or(true, |t| comments.iter().any(|c| c.id == t)),
                            "{top:?}"
                        ),
                    }
                }
            })
        });
}
