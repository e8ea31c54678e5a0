use agora_api::{
    CommentBlocks, CommentFilter, CommentId, Error, Page, Pagination, BLOCK_REPLIES,
};
use tests::Fixture;

fn ids<T>(page: &Page<T>, id: impl Fn(&T) -> CommentId) -> Vec<CommentId> {
    page.items.iter().map(id).collect()
}

#[tokio::test]
async fn walk_forward_then_back() {
    let f = Fixture::new();
    let subject = f.subject().await;
    let mut roots = Vec::new();
    for _ in 0..7 {
        roots.push(f.root(&subject).await.id);
    }
    roots.reverse();
    let filter = CommentFilter {
        subject_id: Some(subject.id),
        ..CommentFilter::default()
    };

    let p = Pagination::first(3);
    let first = f.service.list_comments(&filter, &p).await.unwrap();
    assert_eq!(ids(&first, |c| c.id), roots[0..3]);
    assert_eq!(first.total, 7);

    let p = p.next(&first);
    let second = f.service.list_comments(&filter, &p).await.unwrap();
    assert_eq!(ids(&second, |c| c.id), roots[3..6]);

    let p = p.next(&second);
    let third = f.service.list_comments(&filter, &p).await.unwrap();
    assert_eq!(ids(&third, |c| c.id), roots[6..]);

    let p = p.next(&third);
    let end = f.service.list_comments(&filter, &p).await.unwrap();
    assert!(end.items.is_empty());
    assert_eq!(end.total, 7);
    assert_eq!(end.token, third.token);

    let back = Pagination {
        backward: true,
        ..Pagination::first(3).next(&second)
    };
    let newer = f.service.list_comments(&filter, &back).await.unwrap();
    assert_eq!(ids(&newer, |c| c.id), roots[0..3]);
}

#[tokio::test]
async fn backward_without_token_starts_from_the_oldest() {
    let f = Fixture::new();
    let subject = f.subject().await;
    let mut roots = Vec::new();
    for _ in 0..5 {
        roots.push(f.root(&subject).await.id);
    }
    let p = Pagination {
        backward: true,
        ..Pagination::first(2)
    };
    let page = f
        .service
        .list_comments(&CommentFilter::default(), &p)
        .await
        .unwrap();
    assert_eq!(ids(&page, |c| c.id), vec![roots[1], roots[0]]);
}

#[tokio::test]
async fn garbage_tokens_are_rejected() {
    let f = Fixture::new();
    let p = Pagination {
        token: Some(String::from("not a token")),
        ..Pagination::default()
    };
    assert_eq!(
        f.service.list_comments(&CommentFilter::default(), &p).await,
        Err(Error::InvalidCursor)
    );
}

#[tokio::test]
async fn pinned_comments_lead_the_listing() {
    let f = Fixture::new();
    let subject = f.subject().await;
    let old = f.root(&subject).await;
    let new = f.root(&subject).await;
    f.service
        .set_comment_attrs(subject.id, old.id, agora_api::Attrs::Pinned)
        .await
        .unwrap();
    let page = f
        .service
        .list_comments(&CommentFilter::default(), &Pagination::default())
        .await
        .unwrap();
    assert_eq!(ids(&page, |c| c.id), vec![old.id, new.id]);
}

#[tokio::test]
async fn blocks_under_subject_and_under_root() {
    let f = Fixture::new();
    let subject = f.subject().await;
    let quiet = f.root(&subject).await;
    let busy = f.root(&subject).await;
    let mut replies = Vec::new();
    for _ in 0..5 {
        replies.push(f.reply(&busy, &busy).await.id);
    }
    replies.reverse();

    let blocks = f
        .service
        .get_comment_blocks(subject.id, subject.id.0, &Pagination::default())
        .await
        .unwrap();
    let CommentBlocks::Roots(page) = blocks else {
        panic!("expected root blocks, got {blocks:?}");
    };
    assert_eq!(ids(&page, |b| b.root.id), vec![busy.id, quiet.id]);
    assert_eq!(page.total, 2);
    let busy_block = &page.items[0];
    assert_eq!(busy_block.replies.items.len(), BLOCK_REPLIES as usize);
    assert_eq!(busy_block.replies.total, 5);
    assert_eq!(
        ids(&busy_block.replies, |c| c.id),
        replies[..BLOCK_REPLIES as usize]
    );
    assert!(page.items[1].replies.items.is_empty());

    let blocks = f
        .service
        .get_comment_blocks(subject.id, busy.id.0, &Pagination::first(2))
        .await
        .unwrap();
    let CommentBlocks::Replies(page) = blocks else {
        panic!("expected replies, got {blocks:?}");
    };
    assert_eq!(ids(&page, |c| c.id), replies[..2]);
    assert_eq!(page.total, 5);
}
