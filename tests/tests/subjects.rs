use agora_api::{
    Attrs, DeleteCommentRelations, Error, NewSubject, State, SubjectId, SubjectPatch, UserId,
};
use tests::Fixture;

#[tokio::test]
async fn subjects_can_share_an_object_id() {
    let f = Fixture::new();
    let id = SubjectId::new();
    let new = NewSubject {
        id: Some(id),
        ..NewSubject::new(UserId::new())
    };
    let s = f.service.create_subject(new.clone()).await.unwrap();
    assert_eq!(s.id, id);
    assert_eq!((s.all_count, s.root_count, s.top_comment_id), (0, 0, None));
    assert!(matches!(
        f.service.create_subject(new).await,
        Err(Error::IllegalOperation(_))
    ));
}

#[tokio::test]
async fn patches_touch_only_given_fields() {
    let f = Fixture::new();
    let s = f.subject().await;
    f.service
        .update_subject(
            s.id,
            &SubjectPatch {
                attrs: Some(Attrs::Highlighted),
                ..SubjectPatch::default()
            },
        )
        .await
        .unwrap();
    let after = f.fetch_subject(&s).await;
    assert_eq!(after.attrs, Attrs::Highlighted);
    assert_eq!(after.state, State::Normal);
    assert!(after.update_time > s.update_time);
}

#[tokio::test]
async fn deletion_is_announced() {
    let f = Fixture::new();
    let s = f.subject().await;
    f.service.delete_subject(s.id).await.unwrap();
    assert_eq!(f.service.get_subject(s.id).await, Err(Error::NotFound));
    assert_eq!(
        f.notifier.sent().await,
        vec![DeleteCommentRelations::for_author(s.user_id)]
    );
    assert_eq!(f.service.delete_subject(s.id).await, Err(Error::NotFound));
    assert_eq!(f.notifier.sent().await.len(), 1);
}

#[tokio::test]
async fn failed_announcement_keeps_the_deletion() {
    let f = Fixture::new();
    let s = f.subject().await;
    f.notifier.set_failing(true).await;
    let res = f.service.delete_subject(s.id).await;
    assert!(matches!(res, Err(Error::PublishFailure(_))), "{res:?}");
    assert_eq!(f.service.get_subject(s.id).await, Err(Error::NotFound));
    assert!(f.notifier.sent().await.is_empty());
}
