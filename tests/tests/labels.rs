use agora_api::{
    Error, LabelId, LabelPatch, NewLabel, NewLabelObject, ObjectFilter, ObjectId, Pagination,
};
use agora_mock_db::FailPoint;
use tests::Fixture;

fn label(value: &str) -> NewLabel {
    NewLabel {
        value: String::from(value),
        zone: String::from("forum"),
        sub_zone: String::new(),
    }
}

#[tokio::test]
async fn batch_lookup_follows_request_order() {
    let f = Fixture::new();
    let a = f.service.create_label(label("rust")).await.unwrap();
    let b = f.service.create_label(label("tokio")).await.unwrap();
    let missing = LabelId::new();

    let res = f
        .service
        .get_labels_in_batch(&[b.id, missing, a.id])
        .await
        .unwrap();
    assert_eq!(res, vec![Some(b.clone()), None, Some(a.clone())]);
    assert!(f.service.get_labels_in_batch(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn update_and_delete() {
    let f = Fixture::new();
    let l = f.service.create_label(label("rust")).await.unwrap();
    f.service
        .update_label(
            l.id,
            &LabelPatch {
                value: Some(String::from("rust lang")),
                ..LabelPatch::default()
            },
        )
        .await
        .unwrap();
    let updated = f.service.get_label(l.id).await.unwrap();
    assert_eq!(updated.value, "rust lang");
    assert_eq!(updated.zone, "forum");

    f.service.delete_label(l.id).await.unwrap();
    assert_eq!(f.service.delete_label(l.id).await, Err(Error::NotFound));
    assert_eq!(f.service.get_label(l.id).await, Err(Error::NotFound));
}

#[tokio::test]
async fn search_ranks_and_pages() {
    let f = Fixture::new();
    let both = f.service.create_label(label("async rust")).await.unwrap();
    let mut one = Vec::new();
    for v in ["rust", "rust book", "rust jobs"] {
        one.push(f.service.create_label(label(v)).await.unwrap().id);
    }
    f.service.create_label(label("python")).await.unwrap();

    let p = Pagination::first(2);
    let first = f.service.search_labels("Rust async", &p).await.unwrap();
    assert_eq!(first.total, 4);
    assert_eq!(first.items.len(), 2);
    assert_eq!(first.items[0].label.id, both.id);
    assert!(first.items[0].score > first.items[1].score);

    let second = f
        .service
        .search_labels("Rust async", &p.next(&first))
        .await
        .unwrap();
    assert_eq!(second.items.len(), 2);
    let mut seen = first
        .items
        .iter()
        .chain(&second.items)
        .map(|l| l.label.id)
        .skip(1)
        .collect::<Vec<_>>();
    seen.sort();
    one.sort();
    assert_eq!(seen, one);
}

#[tokio::test]
async fn search_failures_are_reported() {
    let f = Fixture::new();
    f.db.fail_on(FailPoint::Search).await;
    let res = f.service.search_labels("rust", &Pagination::default()).await;
    assert!(matches!(res, Err(Error::SearchFailure(_))), "{res:?}");
}

fn object(object_type: i64, labels: &[LabelId]) -> NewLabelObject {
    NewLabelObject {
        id: ObjectId::new(),
        object_type,
        labels: labels.to_vec(),
    }
}

#[tokio::test]
async fn objects_are_listed_by_label_and_type() {
    let f = Fixture::new();
    let (rust, tokio) = (LabelId::new(), LabelId::new());
    let objects = vec![
        object(1, &[rust]),
        object(1, &[rust, tokio]),
        object(2, &[rust]),
        object(1, &[tokio]),
        object(2, &[]),
    ];
    f.service.create_objects(objects.clone()).await.unwrap();

    let filter = ObjectFilter {
        label_id: Some(rust),
        object_type: None,
    };
    let mut expected = objects[..3].iter().map(|o| o.id).collect::<Vec<_>>();
    expected.sort();
    expected.reverse();

    let mut seen = Vec::new();
    let mut p = Pagination::first(2);
    loop {
        let page = f.service.get_objects(&filter, &p).await.unwrap();
        assert_eq!(page.total, 3);
        if page.items.is_empty() {
            break;
        }
        seen.extend(page.items.iter().copied());
        p = p.next(&page);
    }
    assert_eq!(seen, expected);

    let filter = ObjectFilter {
        label_id: Some(tokio),
        object_type: Some(1),
    };
    let page = f
        .service
        .get_objects(&filter, &Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    let mut ids = page.items;
    ids.sort();
    let mut expected = vec![objects[1].id, objects[3].id];
    expected.sort();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn object_batches_are_all_or_nothing() {
    let f = Fixture::new();
    let existing = object(1, &[]);
    f.service.create_object(existing.clone()).await.unwrap();

    let fresh = object(1, &[]);
    let res = f
        .service
        .create_objects(vec![fresh.clone(), existing.clone()])
        .await;
    assert!(matches!(res, Err(Error::IllegalOperation(_))), "{res:?}");
    let res = f
        .service
        .create_objects(vec![fresh.clone(), fresh.clone()])
        .await;
    assert!(matches!(res, Err(Error::IllegalOperation(_))), "{res:?}");

    let page = f
        .service
        .get_objects(&ObjectFilter::default(), &Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.items, vec![existing.id]);
}

#[tokio::test]
async fn objects_can_be_relabelled_and_deleted() {
    let f = Fixture::new();
    let (a, b) = (LabelId::new(), LabelId::new());
    let mut o = object(3, &[a]);
    f.service.create_object(o.clone()).await.unwrap();

    o.labels = vec![b];
    o.object_type = 4;
    f.service.update_object(&o).await.unwrap();
    let by_label = |label| ObjectFilter {
        label_id: Some(label),
        object_type: None,
    };
    let p = Pagination::default();
    assert_eq!(f.service.get_objects(&by_label(a), &p).await.unwrap().total, 0);
    let page = f.service.get_objects(&by_label(b), &p).await.unwrap();
    assert_eq!(page.items, vec![o.id]);

    f.service.delete_object(o.id).await.unwrap();
    assert_eq!(f.service.delete_object(o.id).await, Err(Error::NotFound));
    assert_eq!(f.service.update_object(&o).await, Err(Error::NotFound));
    assert_eq!(f.service.get_objects(&by_label(b), &p).await.unwrap().total, 0);
}
