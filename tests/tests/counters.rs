use std::panic::AssertUnwindSafe;

use bolero::generator::TypeGenerator;

use agora_api::{Comment, Level};
use agora_mock_db::FailPoint;
use tests::Fixture;

#[tokio::test]
async fn three_level_thread() {
    let f = Fixture::new();
    let subject = f.subject().await;
    let root = f.root(&subject).await;
    let a = f.reply(&root, &root).await;
    let b = f.reply(&root, &a).await;
    assert_eq!(b.level(), Level::Reply);
    assert_eq!(b.root_id, root.id.0);
    assert_eq!(b.father_id, a.id.0);

    let s = f.fetch_subject(&subject).await;
    assert_eq!((s.all_count, s.root_count), (3, 1));
    assert_eq!(f.fetch(&root).await.count, 2);
    assert_eq!(f.fetch(&a).await.count, 0);

    f.service.delete_comment(b.id).await.unwrap();
    let s = f.fetch_subject(&subject).await;
    assert_eq!((s.all_count, s.root_count), (2, 1));
    assert_eq!(f.fetch(&root).await.count, 1);

    f.service.delete_comment(root.id).await.unwrap();
    let s = f.fetch_subject(&subject).await;
    assert_eq!((s.all_count, s.root_count), (1, 0));
}

#[tokio::test]
async fn failing_legs_do_not_fail_the_write() {
    let f = Fixture::new();
    let subject = f.subject().await;
    let root = f.root(&subject).await;

    f.db.fail_on(FailPoint::SubjectCounts).await;
    let reply = f.reply(&root, &root).await;
    let s = f.fetch_subject(&subject).await;
    assert_eq!((s.all_count, s.root_count), (1, 1));
    assert_eq!(f.fetch(&root).await.count, 1);
    f.db.heal(FailPoint::SubjectCounts).await;

    f.db.fail_on(FailPoint::CommentCount).await;
    f.service.delete_comment(reply.id).await.unwrap();
    let s = f.fetch_subject(&subject).await;
    assert_eq!((s.all_count, s.root_count), (0, 1));
    assert_eq!(f.fetch(&root).await.count, 1);
}

#[tokio::test]
async fn deleting_twice_is_not_found() {
    let f = Fixture::new();
    let subject = f.subject().await;
    let root = f.root(&subject).await;
    f.service.delete_comment(root.id).await.unwrap();
    assert_eq!(
        f.service.delete_comment(root.id).await,
        Err(agora_api::Error::NotFound)
    );
    let s = f.fetch_subject(&subject).await;
    assert_eq!((s.all_count, s.root_count), (0, 0));
}

#[tokio::test]
async fn batch_delete_skips_missing() {
    let f = Fixture::new();
    let subject = f.subject().await;
    let root = f.root(&subject).await;
    let reply = f.reply(&root, &root).await;
    let deleted = f
        .service
        .delete_comments(&[reply.id, reply.id, agora_api::CommentId::new()])
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(f.fetch(&root).await.count, 0);
}

#[tokio::test]
async fn replies_must_hang_under_a_root_of_the_subject() {
    let f = Fixture::new();
    let subject = f.subject().await;
    let other = f.subject().await;
    let root = f.root(&subject).await;
    let reply = f.reply(&root, &root).await;

    let mut misplaced = agora_api::NewComment::reply(
        &root,
        &root,
        agora_api::UserId::new(),
        String::new(),
    );
    misplaced.subject_id = other.id;
    assert!(matches!(
        f.service.create_comment(misplaced).await,
        Err(agora_api::Error::IllegalOperation(_))
    ));

    let under_reply =
        agora_api::NewComment::reply(&reply, &reply, agora_api::UserId::new(), String::new());
    assert!(matches!(
        f.service.create_comment(under_reply).await,
        Err(agora_api::Error::IllegalOperation(_))
    ));

    let s = f.fetch_subject(&subject).await;
    assert_eq!((s.all_count, s.root_count), (2, 1));
}

#[derive(Clone, Debug, bolero::generator::TypeGenerator)]
enum Op {
    Root,
    Reply { root: u8, father: u8 },
    Delete { comment: u8 },
}

fn pick<T>(items: &[T], i: u8) -> Option<&T> {
    match items.len() {
        0 => None,
        n => items.get(i as usize % n),
    }
}

#[test]
fn counters_match_contents() {
    let runtime = AssertUnwindSafe(
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed initializing tokio runtime"),
    );
    bolero::check!()
        .with_generator(bolero::generator::gen_with::<Vec<Op>>().len(0..40usize))
        .cloned()
        .for_each(move |ops| {
            runtime.block_on(async move {
                let f = Fixture::new();
                let subject = f.subject().await;
                let mut roots: Vec<Comment> = Vec::new();
                let mut live: Vec<Comment> = Vec::new();
                for op in ops {
                    match op {
                        Op::Root => {
                            let c = f.root(&subject).await;
                            roots.push(c.clone());
                            live.push(c);
                        }
                        Op::Reply { root, father } => {
                            let Some(root) = pick(&roots, root).cloned() else {
                                continue;
                            };
                            let father = pick(&live, father)
                                .filter(|c| c.root_id == root.id.0)
                                .cloned()
                                .unwrap_or_else(|| root.clone());
                            live.push(f.reply(&root, &father).await);
                        }
                        Op::Delete { comment } => {
                            let Some(c) = pick(&live, comment).cloned() else {
                                continue;
                            };
                            f.service.delete_comment(c.id).await.unwrap();
                            live.retain(|l| l.id != c.id);
                            roots.retain(|r| r.id != c.id);
                        }
                    }
                }

                let s = f.fetch_subject(&subject).await;
                assert_eq!(s.all_count, live.len() as i64);
                assert_eq!(
                    s.root_count,
                    live.iter().filter(|c| c.level() == Level::Root).count() as i64
                );
                for r in &roots {
                    let replies = live.iter().filter(|c| c.root_id == r.id.0).count();
                    assert_eq!(f.fetch(r).await.count, replies as i64);
                }
            })
        });
}
