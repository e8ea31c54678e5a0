#![cfg(test)]

use std::{cmp, fmt::Debug, ops::RangeTo, panic::AssertUnwindSafe, path::Path, sync::Arc};

use agora_api::{
    Attrs, Comment, CommentBlocks, CommentBlocksQuery, CommentFilter, Error as ApiError, LabelId,
    Level, ListComments, ListObjects, ListRelations, NewComment, NewLabelObject, NewSubject, Node,
    ObjectFilter, ObjectId, Page, Pagination, PathQuery, Relation, RelationFilter, RelationKey,
    Service, ServiceConfig, SetAttrs, Subject, SubjectId, UserId, PINNED_SORT_TIME,
};
use agora_mock_db::{MockDb, MockGraph, MockNotifier};
use axum::http::{self, request};
use bolero::generator::TypeGenerator;
use sqlx::PgPool;
use tower::{Service as _, ServiceExt};

use crate::{db::PgDb, *};

macro_rules! do_tokio_test {
    ( $name:ident, $typ:ty, $fn:expr ) => {
        #[test]
        fn $name() {
            let runtime = AssertUnwindSafe(
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed initializing tokio runtime"),
            );
            bolero::check!()
                .with_type::<$typ>()
                .cloned()
                .for_each(move |v| {
                    let () = runtime.block_on($fn(v));
                })
        }
    };
}

fn mock_app(with_graph: bool) -> Router {
    let service = Service::new(
        MockDb::new(),
        Arc::new(MockNotifier::new()),
        ServiceConfig::default(),
    );
    let service = match with_graph {
        true => service.with_graph(Arc::new(MockGraph::new())),
        false => service,
    };
    app(Arc::new(service))
}

async fn call<Req, Resp>(
    app: &mut Router,
    req: request::Request<axum::body::Body>,
    req_body: &Req,
) -> Result<Resp, ApiError>
where
    Req: Debug,
    Resp: 'static + for<'de> serde::Deserialize<'de>,
{
    app.ready().await.expect("waiting for app to be ready");
    let resp = app.call(req).await.expect("running request");
    let status = resp.status();
    let body = hyper::body::to_bytes(resp.into_body())
        .await
        .expect("recovering resp bytes");
    if status == http::StatusCode::OK {
        if std::any::TypeId::of::<Resp>() == std::any::TypeId::of::<()>() {
            // handlers returning () send an empty body, which is not valid json
            return Ok(serde_json::from_slice(b"null").unwrap());
        }
        return Ok(serde_json::from_slice(&body).unwrap_or_else(|err| {
            panic!("failed parsing resp body: {err}\nbody: {body:?}\nrequest: {req_body:?}")
        }));
    }
    assert_ne!(
        status,
        http::StatusCode::INTERNAL_SERVER_ERROR,
        "internal error for request {req_body:?}: {body:?}"
    );
    Err(ApiError::parse(&body)
        .unwrap_or_else(|err| panic!("parsing error response body {err}, body is {body:?}")))
}

async fn run_on_app<Req, Resp>(
    app: &mut Router,
    method: &str,
    uri: &str,
    body: &Req,
) -> Result<Resp, ApiError>
where
    Req: Debug + serde::Serialize,
    Resp: 'static + for<'de> serde::Deserialize<'de>,
{
    let req = request::Builder::new()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(
            serde_json::to_vec(body).expect("serializing request body to json"),
        ))
        .expect("building request");
    call(app, req, body).await
}

do_tokio_test!(fuzz_id_path_extractor, String, |id: String| async move {
    let mut app = mock_app(false);
    let Ok(req) = request::Builder::new()
        .method(http::Method::GET)
        .uri(format!("/api/comments/{id}"))
        .body(axum::body::Body::empty())
    else {
        return;
    };
    let resp = app
        .ready()
        .await
        .expect("waiting for app to be ready")
        .call(req)
        .await
        .expect("running request");
    assert_ne!(resp.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
});

do_tokio_test!(fuzz_list_token, String, |token: String| async move {
    let mut app = mock_app(false);
    let query = ListComments {
        filter: CommentFilter::default(),
        pagination: Pagination {
            token: Some(token),
            ..Pagination::default()
        },
    };
    let res: Result<Page<Comment>, _> =
        run_on_app(&mut app, "POST", "/api/comments/list", &query).await;
    match res {
        Ok(page) => assert!(page.items.is_empty()),
        Err(ApiError::InvalidCursor) => (),
        Err(e) => panic!("got unexpected error: {e}"),
    }
});

#[tokio::test]
async fn comment_lifecycle_over_http() {
    let mut app = mock_app(false);
    let user = UserId::new();
    let subject: Subject = run_on_app(&mut app, "POST", "/api/subjects", &NewSubject::new(user))
        .await
        .unwrap();

    let root: Comment = run_on_app(
        &mut app,
        "POST",
        "/api/comments",
        &NewComment::root(subject.id, user, String::from("first")),
    )
    .await
    .unwrap();
    let reply: Comment = run_on_app(
        &mut app,
        "POST",
        "/api/comments",
        &NewComment::reply(&root, &root, user, String::from("second")),
    )
    .await
    .unwrap();

    let s: Subject = run_on_app(&mut app, "GET", &format!("/api/subjects/{}", subject.id), &())
        .await
        .unwrap();
    assert_eq!((s.all_count, s.root_count), (2, 1));
    let r: Comment = run_on_app(&mut app, "GET", &format!("/api/comments/{}", root.id), &())
        .await
        .unwrap();
    assert_eq!(r.count, 1);

    let pinned: Comment = run_on_app(
        &mut app,
        "PUT",
        &format!("/api/subjects/{}/comments/{}/attrs", subject.id, root.id),
        &SetAttrs {
            attrs: Attrs::Pinned,
        },
    )
    .await
    .unwrap();
    assert_eq!(pinned.attrs, Attrs::Pinned);
    assert_eq!(pinned.sort_time, PINNED_SORT_TIME);

    let blocks: CommentBlocks = run_on_app(
        &mut app,
        "POST",
        "/api/comments/blocks",
        &CommentBlocksQuery {
            subject_id: subject.id,
            root_id: subject.id.0,
            pagination: Pagination::default(),
        },
    )
    .await
    .unwrap();
    let CommentBlocks::Roots(page) = blocks else {
        panic!("expected root blocks, got {blocks:?}");
    };
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].replies.items[0].id, reply.id);

    let () = run_on_app(&mut app, "DELETE", &format!("/api/comments/{}", root.id), &())
        .await
        .unwrap();
    let s: Subject = run_on_app(&mut app, "GET", &format!("/api/subjects/{}", subject.id), &())
        .await
        .unwrap();
    assert_eq!(s.top_comment_id, None);
    assert_eq!((s.all_count, s.root_count), (1, 0));

    let gone: Result<Comment, _> =
        run_on_app(&mut app, "GET", &format!("/api/comments/{}", root.id), &()).await;
    assert_eq!(gone, Err(ApiError::NotFound));
}

#[tokio::test]
async fn malformed_ids_are_rejected() {
    let mut app = mock_app(false);
    let res: Result<Subject, _> =
        run_on_app(&mut app, "GET", "/api/subjects/not-an-id", &()).await;
    assert!(matches!(res, Err(ApiError::InvalidIdentifier(_))), "{res:?}");

    let res: Result<Comment, _> = run_on_app(
        &mut app,
        "PUT",
        &format!("/api/subjects/{}/comments/nope/attrs", SubjectId::new()),
        &SetAttrs {
            attrs: Attrs::Pinned,
        },
    )
    .await;
    assert!(matches!(res, Err(ApiError::InvalidIdentifier(_))), "{res:?}");
}

async fn post_raw<Resp>(app: &mut Router, uri: &str, body: String) -> Result<Resp, ApiError>
where
    Resp: 'static + for<'de> serde::Deserialize<'de>,
{
    let req = request::Builder::new()
        .method(http::Method::POST)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(body.clone()))
        .expect("building request");
    call(app, req, &body).await
}

do_tokio_test!(fuzz_json_bodies, String, |body: String| async move {
    let mut app = mock_app(false);
    let res: Result<u64, _> = post_raw(&mut app, "/api/comments/delete", body).await;
    match res {
        Ok(0) | Err(ApiError::InvalidIdentifier(_)) | Err(ApiError::IllegalOperation(_)) => (),
        res => panic!("got unexpected result: {res:?}"),
    }
});

#[tokio::test]
async fn malformed_bodies_get_structured_errors() {
    let mut app = mock_app(false);
    let res: Result<u64, _> = post_raw(
        &mut app,
        "/api/comments/delete",
        String::from(r#"["not-a-uuid"]"#),
    )
    .await;
    assert!(matches!(res, Err(ApiError::InvalidIdentifier(_))), "{res:?}");

    let res: Result<Subject, _> =
        post_raw(&mut app, "/api/subjects", String::from(r#"{"user_id": 12}"#)).await;
    assert!(matches!(res, Err(ApiError::IllegalOperation(_))), "{res:?}");

    let res: Result<Comment, _> =
        post_raw(&mut app, "/api/comments", String::from("{not json")).await;
    assert!(matches!(res, Err(ApiError::IllegalOperation(_))), "{res:?}");

    let deleted: u64 = post_raw(&mut app, "/api/comments/delete", String::from("[]"))
        .await
        .unwrap();
    assert_eq!(deleted, 0);
}

#[tokio::test]
async fn path_queries_need_the_graph() {
    let key = RelationKey {
        from: Node::new(1, "alice"),
        to: Node::new(1, "bob"),
        relation_type: 10,
    };
    let query = PathQuery {
        from: Node::new(1, "alice"),
        first_edge: 10,
        second_edge: 10,
        pagination: Pagination::default(),
    };

    let mut app = mock_app(false);
    let created: bool = run_on_app(&mut app, "POST", "/api/relations", &key)
        .await
        .unwrap();
    assert!(created);
    let res: Result<Vec<agora_api::Relation>, _> =
        run_on_app(&mut app, "POST", "/api/relations/paths", &query).await;
    assert!(
        matches!(res, Err(ApiError::ComponentUnavailable(_))),
        "{res:?}"
    );

    let mut app = mock_app(true);
    let created: bool = run_on_app(&mut app, "POST", "/api/relations", &key)
        .await
        .unwrap();
    assert!(created);
    let again: bool = run_on_app(&mut app, "POST", "/api/relations", &key)
        .await
        .unwrap();
    assert!(!again);
    let paths: Vec<agora_api::Relation> =
        run_on_app(&mut app, "POST", "/api/relations/paths", &query)
            .await
            .unwrap();
    assert!(paths.is_empty());
}

fn build_pg_cluster(data: &Path) -> Option<postgresfixture::cluster::Cluster> {
    let mut runtime = None;
    let mut best_version = None;
    for r in postgresfixture::runtime::Runtime::find_on_path() {
        if let Ok(v) = r.version() {
            if best_version.as_ref().map_or(true, |best| *best < v) {
                runtime = Some(r);
                best_version = Some(v);
            }
        }
    }
    Some(postgresfixture::cluster::Cluster::new(data, runtime?))
}

macro_rules! do_sqlx_test {
    ( $name:ident, $gen:expr, $fn:expr ) => {
        #[test]
        fn $name() {
            if std::env::var("RUST_LOG").is_ok() {
                tracing_subscriber::fmt::init();
            }
            let lockfile = tempfile::tempfile().expect("creating tempfile");
            let datadir = tempfile::tempdir().expect("creating tempdir");
            let datadir_path: &Path = datadir.as_ref();
            let Some(cluster) = build_pg_cluster(datadir_path) else {
                eprintln!("postgresql is not installed in path, skipping {}", stringify!($name));
                return;
            };
            let datadir_path: &str = datadir_path.to_str().expect("tempdir is not valid utf8");
            postgresfixture::coordinate::run_and_destroy(&cluster, lockfile.into(), || {
                cluster.createdb("test_db").expect("creating test_db database");
                let runtime = AssertUnwindSafe(
                    tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                        .expect("failed initializing tokio runtime"),
                );
                let pool = AssertUnwindSafe(runtime.block_on(async move {
                    let url = format!("postgresql://?host={datadir_path}&dbname=test_db");
                    let pool = create_sqlx_pool(&url).await.expect("creating sqlx pool");
                    MIGRATOR
                        .run(&mut *pool.acquire().await.expect("getting migrator connection"))
                        .await
                        .expect("failed applying migrations");
                    pool
                }));
                bolero::check!()
                    .with_generator($gen)
                    .cloned()
                    .for_each(move |v| {
                        let pool = pool.clone();
                        let idle_before = pool.num_idle();
                        let v_str = format!("{v:?}");
                        let idle_after_res: Result<usize, _> = {
                            let pool = pool.clone();
                            std::panic::catch_unwind(AssertUnwindSafe(|| {
                                runtime.block_on(async move {
                                    let () = $fn(pool.clone(), v).await;
                                    let mut idle_after = pool.num_idle();
                                    let wait_release_since = std::time::Instant::now();
                                    while idle_after < idle_before
                                        && wait_release_since.elapsed()
                                            <= std::time::Duration::from_secs(1)
                                    {
                                        tokio::task::yield_now().await;
                                        idle_after = pool.num_idle();
                                    }
                                    idle_after
                                })
                            }))
                        };
                        runtime.block_on(async move {
                            let mut conn =
                                pool.acquire().await.expect("getting db cleanup connection");
                            sqlx::query(include_str!("../reset-test-db.sql"))
                                .execute(&mut *conn)
                                .await
                                .expect("failed cleaning up database");
                        });
                        match idle_after_res {
                            Err(e) => std::panic::resume_unwind(e),
                            Ok(idle_after) => assert!(
                                idle_after >= idle_before,
                                "test {} held onto pool: {idle_before} idle connections before, {idle_after} after, with value {v_str}",
                                stringify!($name)
                            ),
                        }
                    });
            })
            .expect("coordinating spinup and shutdown of the pg cluster");
        }
    };
}

#[derive(Clone, Debug, bolero::generator::TypeGenerator)]
enum FuzzOp {
    CreateSubject,
    CreateComment {
        subject: usize,
        reply_to: Option<usize>,
    },
    DeleteComment {
        comment: usize,
    },
    SetAttrs {
        comment: usize,
        attrs: u8,
    },
    ListComments {
        subject: usize,
        limit: u8,
        backward: bool,
    },
    CreateRelation {
        from: u8,
        to: u8,
        relation_type: u8,
    },
    DeleteRelation {
        from: u8,
        to: u8,
        relation_type: u8,
    },
    DeleteNode {
        node: u8,
    },
    ListRelations {
        from: u8,
        relation_type: u8,
        limit: u8,
    },
    CreateObject {
        object_type: u8,
        labels: u8,
    },
    ListObjects {
        label: Option<u8>,
        object_type: Option<u8>,
        limit: u8,
    },
}

const ALL_ATTRS: [Attrs; 4] = [
    Attrs::None,
    Attrs::Highlighted,
    Attrs::Pinned,
    Attrs::PinnedHighlighted,
];

fn resize_int(fuzz_id: usize, RangeTo { end }: RangeTo<usize>) -> Option<usize> {
    if end == 0 {
        return None;
    }
    let bucket_size = cmp::max(1, usize::MAX / end);
    let id = fuzz_id / bucket_size;
    Some(cmp::min(id, end - 1))
}

fn compare<T>(name: &str, app_res: Result<T, ApiError>, mock_res: Result<T, ApiError>)
where
    T: Debug + PartialEq,
{
    // messages carry ids, which differ between the two sides
    assert_eq!(
        app_res.map_err(|e| e.code()),
        mock_res.map_err(|e| e.code()),
        "app and mock did not return the same result for {name}"
    );
}

fn node(n: u8) -> Node {
    Node::new(1, format!("node-{}", n % 6))
}

fn relation_key(from: u8, to: u8, relation_type: u8) -> RelationKey {
    RelationKey {
        from: node(from),
        to: node(to),
        relation_type: i64::from(relation_type % 3),
    }
}

/// Entities created on both sides, at the same index
struct Twins<T> {
    app: Vec<T>,
    mock: Vec<T>,
}

impl<T> Default for Twins<T> {
    fn default() -> Twins<T> {
        Twins {
            app: Vec::new(),
            mock: Vec::new(),
        }
    }
}

struct ComparativeFuzzer {
    app: Router,
    mock: Service<MockDb>,
    user: UserId,
    labels: [LabelId; 3],
    subjects: Twins<SubjectId>,
    comments: Twins<Comment>,
}

/// Subject as seen through entity indices
#[derive(Debug, PartialEq)]
struct SubjectShape {
    all_count: i64,
    root_count: i64,
    top: Option<Option<usize>>,
}

/// Comment as seen through entity indices
#[derive(Debug, PartialEq)]
struct CommentShape {
    index: Option<usize>,
    level: Level,
    count: i64,
    attrs: Attrs,
    pinned_first: bool,
}

impl ComparativeFuzzer {
    fn new(pool: PgPool) -> ComparativeFuzzer {
        let notifier = Arc::new(MockNotifier::new());
        let app = app(Arc::new(Service::new(
            PgDb::new(pool),
            notifier.clone(),
            ServiceConfig::default(),
        )));
        let mock = Service::new(MockDb::new(), notifier, ServiceConfig::default());
        ComparativeFuzzer {
            app,
            mock,
            user: UserId::new(),
            labels: [LabelId::new(), LabelId::new(), LabelId::new()],
            subjects: Twins::default(),
            comments: Twins::default(),
        }
    }

    fn comment_shape(&self, side: &[Comment], c: &Comment) -> CommentShape {
        CommentShape {
            index: side.iter().position(|known| known.id == c.id),
            level: c.level(),
            count: c.count,
            attrs: c.attrs,
            pinned_first: c.sort_time == PINNED_SORT_TIME,
        }
    }

    fn subject_shape(&self, side: &[Comment], s: &Subject) -> SubjectShape {
        SubjectShape {
            all_count: s.all_count,
            root_count: s.root_count,
            top: s
                .top_comment_id
                .map(|top| side.iter().position(|c| c.id == top)),
        }
    }

    /// Keeps creation times of the two sides from colliding within a page
    async fn settle() {
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }

    async fn check_subjects(&mut self) {
        for i in 0..self.subjects.app.len() {
            let app_id = self.subjects.app[i];
            let app: Result<Subject, _> =
                run_on_app(&mut self.app, "GET", &format!("/api/subjects/{app_id}"), &()).await;
            let mock = self.mock.get_subject(self.subjects.mock[i]).await;
            compare(
                "GetSubject",
                app.map(|s| self.subject_shape(&self.comments.app, &s)),
                mock.map(|s| self.subject_shape(&self.comments.mock, &s)),
            );
        }
    }

    async fn create_subject(&mut self) {
        let new = NewSubject::new(self.user);
        let app: Result<Subject, _> =
            run_on_app(&mut self.app, "POST", "/api/subjects", &new).await;
        let mock = self.mock.create_subject(new).await;
        if let (Ok(app), Ok(mock)) = (&app, &mock) {
            self.subjects.app.push(app.id);
            self.subjects.mock.push(mock.id);
        }
        compare("CreateSubject", app.map(|_| ()), mock.map(|_| ()));
    }

    fn new_comment(
        &self,
        side: &[Comment],
        subjects: &[SubjectId],
        (subject, reply_to): (usize, Option<usize>),
    ) -> NewComment {
        let content = format!("comment {}", side.len());
        match reply_to {
            None => NewComment::root(subjects[subject], self.user, content),
            Some(father) => {
                let father = &side[father];
                let root = match father.root_comment() {
                    None => father,
                    Some(root) => side.iter().find(|c| c.id == root).unwrap_or(father),
                };
                NewComment::reply(root, father, self.user, content)
            }
        }
    }

    async fn execute_fuzz_op(&mut self, op: FuzzOp) {
        match op {
            FuzzOp::CreateSubject => self.create_subject().await,
            FuzzOp::CreateComment { subject, reply_to } => {
                if self.subjects.app.is_empty() {
                    self.create_subject().await;
                }
                let Some(subject) = resize_int(subject, ..self.subjects.app.len()) else {
                    return;
                };
                let reply_to = reply_to.and_then(|c| resize_int(c, ..self.comments.app.len()));
                let target = (subject, reply_to);
                let app_new = self.new_comment(&self.comments.app, &self.subjects.app, target);
                let mock_new = self.new_comment(&self.comments.mock, &self.subjects.mock, target);
                let app: Result<Comment, _> =
                    run_on_app(&mut self.app, "POST", "/api/comments", &app_new).await;
                let mock = self.mock.create_comment(mock_new).await;
                Self::settle().await;
                if let (Ok(app), Ok(mock)) = (&app, &mock) {
                    self.comments.app.push(app.clone());
                    self.comments.mock.push(mock.clone());
                }
                compare(
                    "CreateComment",
                    app.map(|c| (c.level(), c.count, c.attrs)),
                    mock.map(|c| (c.level(), c.count, c.attrs)),
                );
            }
            FuzzOp::DeleteComment { comment } => {
                let Some(i) = resize_int(comment, ..self.comments.app.len()) else {
                    return;
                };
                let app_id = self.comments.app[i].id;
                let uri = format!("/api/comments/{app_id}");
                let app: Result<(), _> = run_on_app(&mut self.app, "DELETE", &uri, &()).await;
                let mock = self.mock.delete_comment(self.comments.mock[i].id).await;
                compare("DeleteComment", app, mock);
            }
            FuzzOp::SetAttrs { comment, attrs } => {
                let Some(i) = resize_int(comment, ..self.comments.app.len()) else {
                    return;
                };
                let attrs = ALL_ATTRS[attrs as usize % ALL_ATTRS.len()];
                let (app_c, mock_c) = (&self.comments.app[i], &self.comments.mock[i]);
                let uri = format!("/api/subjects/{}/comments/{}/attrs", app_c.subject_id, app_c.id);
                let (mock_subject, mock_id) = (mock_c.subject_id, mock_c.id);
                let app: Result<Comment, _> =
                    run_on_app(&mut self.app, "PUT", &uri, &SetAttrs { attrs }).await;
                let mock = match self.mock.set_comment_attrs(mock_subject, mock_id, attrs).await {
                    Ok(_) => self.mock.get_comment(mock_id).await,
                    Err(e) => Err(e),
                };
                compare(
                    "SetAttrs",
                    app.map(|c| self.comment_shape(&self.comments.app, &c)),
                    mock.map(|c| self.comment_shape(&self.comments.mock, &c)),
                );
            }
            FuzzOp::ListComments {
                subject,
                limit,
                backward,
            } => {
                let Some(s) = resize_int(subject, ..self.subjects.app.len()) else {
                    return;
                };
                let mut app_p = Pagination {
                    limit: Some(u32::from(limit % 4) + 1),
                    backward,
                    ..Pagination::default()
                };
                let mut mock_p = app_p.clone();
                for _ in 0..16 {
                    let query = ListComments {
                        filter: CommentFilter {
                            subject_id: Some(self.subjects.app[s]),
                            ..CommentFilter::default()
                        },
                        pagination: app_p.clone(),
                    };
                    let app: Result<Page<Comment>, _> =
                        run_on_app(&mut self.app, "POST", "/api/comments/list", &query).await;
                    let filter = CommentFilter {
                        subject_id: Some(self.subjects.mock[s]),
                        ..CommentFilter::default()
                    };
                    let mock = self.mock.list_comments(&filter, &mock_p).await;
                    let done = match (&app, &mock) {
                        (Ok(app), Ok(mock)) => {
                            app_p = app_p.next(app);
                            mock_p = mock_p.next(mock);
                            app.items.is_empty() || app.token.is_none()
                        }
                        _ => true,
                    };
                    let shapes = |side: &[Comment], page: Page<Comment>| {
                        page.map(|c| self.comment_shape(side, &c))
                    };
                    compare(
                        "ListComments",
                        app.map(|p| {
                            let p = shapes(&self.comments.app, p);
                            (p.items, p.total)
                        }),
                        mock.map(|p| {
                            let p = shapes(&self.comments.mock, p);
                            (p.items, p.total)
                        }),
                    );
                    if done {
                        break;
                    }
                }
            }
            FuzzOp::CreateRelation {
                from,
                to,
                relation_type,
            } => {
                let key = relation_key(from, to, relation_type);
                let app: Result<bool, _> =
                    run_on_app(&mut self.app, "POST", "/api/relations", &key).await;
                let mock = self.mock.create_relation(key).await;
                Self::settle().await;
                compare("CreateRelation", app, mock);
            }
            FuzzOp::DeleteRelation {
                from,
                to,
                relation_type,
            } => {
                let key = relation_key(from, to, relation_type);
                let app: Result<u64, _> =
                    run_on_app(&mut self.app, "POST", "/api/relations/delete", &key).await;
                let mock = self.mock.delete_relation(&key).await;
                compare("DeleteRelation", app, mock);
            }
            FuzzOp::DeleteNode { node: n } => {
                let n = node(n);
                let app: Result<u64, _> =
                    run_on_app(&mut self.app, "POST", "/api/nodes/delete", &n).await;
                let mock = self.mock.delete_node(&n).await;
                compare("DeleteNode", app, mock);
            }
            FuzzOp::ListRelations {
                from,
                relation_type,
                limit,
            } => {
                let mut query = ListRelations {
                    filter: RelationFilter::From {
                        from: node(from),
                        to_type: 1,
                        relation_type: i64::from(relation_type % 3),
                    },
                    pagination: Pagination::first(u32::from(limit % 4) + 1),
                };
                for _ in 0..16 {
                    let app: Result<Page<Relation>, _> =
                        run_on_app(&mut self.app, "POST", "/api/relations/list", &query).await;
                    let mock = self
                        .mock
                        .list_relations(&query.filter, &query.pagination)
                        .await;
                    let keys = |p: Page<Relation>| {
                        let keys = p.items.into_iter().map(|r| r.key).collect::<Vec<_>>();
                        (keys, p.total)
                    };
                    let next = match &mock {
                        Ok(page) if !page.items.is_empty() && page.token.is_some() => {
                            Some(query.pagination.next(page))
                        }
                        _ => None,
                    };
                    compare("ListRelations", app.map(keys), mock.map(keys));
                    match next {
                        Some(p) => query.pagination = p,
                        None => break,
                    }
                }
            }
            FuzzOp::CreateObject {
                object_type,
                labels,
            } => {
                let object = NewLabelObject {
                    id: ObjectId::new(),
                    object_type: i64::from(object_type % 3),
                    labels: (0..3)
                        .filter(|i| labels & (1 << i) != 0)
                        .map(|i| self.labels[i])
                        .collect(),
                };
                let app: Result<(), _> =
                    run_on_app(&mut self.app, "POST", "/api/objects", &object).await;
                let mock = self.mock.create_object(object).await;
                compare("CreateObject", app, mock);
            }
            FuzzOp::ListObjects {
                label,
                object_type,
                limit,
            } => {
                let mut query = ListObjects {
                    filter: ObjectFilter {
                        label_id: label.map(|l| self.labels[l as usize % 3]),
                        object_type: object_type.map(|t| i64::from(t % 3)),
                    },
                    pagination: Pagination::first(u32::from(limit % 4) + 1),
                };
                for _ in 0..16 {
                    let app: Result<Page<ObjectId>, _> =
                        run_on_app(&mut self.app, "POST", "/api/objects/list", &query).await;
                    let mock = self
                        .mock
                        .get_objects(&query.filter, &query.pagination)
                        .await;
                    let next = match &mock {
                        Ok(page) if !page.items.is_empty() && page.token.is_some() => {
                            Some(query.pagination.next(page))
                        }
                        _ => None,
                    };
                    compare("ListObjects", app, mock);
                    match next {
                        Some(p) => query.pagination = p,
                        None => break,
                    }
                }
            }
        }
        self.check_subjects().await;
    }
}

do_sqlx_test!(
    compare_with_mock,
    bolero::generator::gen_with::<Vec<FuzzOp>>().len(1..60usize),
    |pool, test: Vec<FuzzOp>| async move {
        let mut fuzzer = ComparativeFuzzer::new(pool);
        for op in test {
            fuzzer.execute_fuzz_op(op).await;
        }
    }
);
