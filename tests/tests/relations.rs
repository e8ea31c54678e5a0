use agora_api::{
    Error, Node, Pagination, PathCountQuery, PathQuery, RelationFilter, RelationKey,
};
use tests::Fixture;

fn follows(from: &str, to: &str) -> RelationKey {
    RelationKey {
        from: Node::new(1, from),
        to: Node::new(1, to),
        relation_type: 10,
    }
}

#[tokio::test]
async fn creating_twice_is_a_no_op() {
    let f = Fixture::new();
    assert!(f.service.create_relation(follows("a", "b")).await.unwrap());
    assert!(!f.service.create_relation(follows("a", "b")).await.unwrap());
    assert_eq!(f.db.relations().await.len(), 1);
    assert_eq!(f.graph.edges().await.len(), 1);

    let r = f.service.get_relation(&follows("a", "b")).await.unwrap();
    assert_eq!(r.key, follows("a", "b"));
    assert_eq!(
        f.service.get_relation(&follows("b", "a")).await,
        Err(Error::NotFound)
    );
}

#[tokio::test]
async fn filters_pick_a_direction() {
    let f = Fixture::new();
    for to in ["b", "c", "d"] {
        f.service.create_relation(follows("a", to)).await.unwrap();
    }
    f.service.create_relation(follows("d", "a")).await.unwrap();

    let outgoing = RelationFilter::From {
        from: Node::new(1, "a"),
        to_type: 1,
        relation_type: 10,
    };
    assert_eq!(f.service.count_relations(&outgoing).await.unwrap(), 3);
    let page = f
        .service
        .list_relations(&outgoing, &Pagination::first(2))
        .await
        .unwrap();
    let ends = page.items.iter().map(|r| r.key.to.id.as_str()).collect::<Vec<_>>();
    assert_eq!(ends, ["d", "c"]);
    assert_eq!(page.total, 3);

    let incoming = RelationFilter::To {
        from_type: 1,
        to: Node::new(1, "a"),
        relation_type: 10,
    };
    assert_eq!(f.service.count_relations(&incoming).await.unwrap(), 1);
}

#[tokio::test]
async fn deleting_mirrors_only_actual_deletions() {
    let f = Fixture::new();
    f.service.create_relation(follows("a", "b")).await.unwrap();
    assert_eq!(f.service.delete_relation(&follows("a", "b")).await.unwrap(), 1);
    assert!(f.graph.edges().await.is_empty());

    f.graph.set_failing(true).await;
    assert_eq!(f.service.delete_relation(&follows("a", "b")).await.unwrap(), 0);
}

#[tokio::test]
async fn deleting_a_node_removes_both_directions() {
    let f = Fixture::new();
    f.service.create_relation(follows("a", "b")).await.unwrap();
    f.service.create_relation(follows("b", "c")).await.unwrap();
    f.service.create_relation(follows("c", "d")).await.unwrap();

    assert_eq!(f.service.delete_node(&Node::new(1, "b")).await.unwrap(), 2);
    let left = f.db.relations().await;
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].key, follows("c", "d"));
    assert_eq!(f.graph.edges().await.len(), 1);
}

#[tokio::test]
async fn mirror_failures_are_surfaced() {
    let f = Fixture::new();
    f.graph.set_failing(true).await;
    let res = f.service.create_relation(follows("a", "b")).await;
    assert!(matches!(res, Err(Error::StorageFailure(_))), "{res:?}");
    // the primary store keeps the relation
    assert_eq!(f.db.relations().await.len(), 1);
}

#[tokio::test]
async fn two_hop_queries() {
    let f = Fixture::new();
    f.service.create_relation(follows("a", "b")).await.unwrap();
    f.service.create_relation(follows("a", "c")).await.unwrap();
    f.service.create_relation(follows("b", "d")).await.unwrap();
    f.service.create_relation(follows("c", "d")).await.unwrap();
    f.service.create_relation(follows("c", "e")).await.unwrap();

    let paths = f
        .service
        .relation_paths(&PathQuery {
            from: Node::new(1, "a"),
            first_edge: 10,
            second_edge: 10,
            pagination: Pagination::default(),
        })
        .await
        .unwrap();
    let ends = paths.iter().map(|r| r.key.to.id.as_str()).collect::<Vec<_>>();
    assert_eq!(ends, ["e", "d", "d"]);

    let count = f
        .service
        .relation_paths_count(&PathCountQuery {
            from: Node::new(1, "a"),
            via_type: 1,
            first_edge: 10,
            second_edge: 10,
            to_type: 1,
        })
        .await
        .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn path_queries_need_the_mirror() {
    let f = Fixture::without_graph();
    assert!(f.service.create_relation(follows("a", "b")).await.unwrap());
    assert!(f.graph.edges().await.is_empty());
    assert_eq!(f.service.delete_node(&Node::new(1, "a")).await.unwrap(), 1);

    let res = f
        .service
        .relation_paths(&PathQuery {
            from: Node::new(1, "a"),
            first_edge: 10,
            second_edge: 10,
            pagination: Pagination::default(),
        })
        .await;
    assert!(matches!(res, Err(Error::ComponentUnavailable(_))), "{res:?}");
}
