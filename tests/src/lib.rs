//! Shared setup for the scenarios under `tests/`

use std::sync::Arc;

use agora_api::{
    Comment, NewComment, NewSubject, ReleaseMode, Service, ServiceConfig, Subject, UserId,
};
use agora_mock_db::{MockDb, MockGraph, MockNotifier};

pub struct Fixture {
    pub db: MockDb,
    pub graph: MockGraph,
    pub notifier: MockNotifier,
    pub service: Arc<Service<MockDb>>,
}

impl Fixture {
    pub fn new() -> Fixture {
        Fixture::build(ReleaseMode::Clear, true)
    }

    pub fn with_release_mode(mode: ReleaseMode) -> Fixture {
        Fixture::build(mode, true)
    }

    pub fn without_graph() -> Fixture {
        Fixture::build(ReleaseMode::Clear, false)
    }

    fn build(release_mode: ReleaseMode, with_graph: bool) -> Fixture {
        let db = MockDb::new();
        let graph = MockGraph::new();
        let notifier = MockNotifier::new();
        let service = Service::new(
            db.clone(),
            Arc::new(notifier.clone()),
            ServiceConfig { release_mode },
        );
        let service = match with_graph {
            true => service.with_graph(Arc::new(graph.clone())),
            false => service,
        };
        Fixture {
            db,
            graph,
            notifier,
            service: Arc::new(service),
        }
    }

    pub async fn subject(&self) -> Subject {
        self.service
            .create_subject(NewSubject::new(UserId::new()))
            .await
            .expect("creating subject")
    }

    pub async fn root(&self, subject: &Subject) -> Comment {
        self.service
            .create_comment(NewComment::root(
                subject.id,
                UserId::new(),
                String::from("root comment"),
            ))
            .await
            .expect("creating root comment")
    }

    pub async fn reply(&self, root: &Comment, father: &Comment) -> Comment {
        self.service
            .create_comment(NewComment::reply(
                root,
                father,
                UserId::new(),
                String::from("reply"),
            ))
            .await
            .expect("creating reply")
    }

    pub async fn fetch_subject(&self, s: &Subject) -> Subject {
        self.service.get_subject(s.id).await.expect("fetching subject")
    }

    pub async fn fetch(&self, c: &Comment) -> Comment {
        self.service.get_comment(c.id).await.expect("fetching comment")
    }
}

impl Default for Fixture {
    fn default() -> Fixture {
        Fixture::new()
    }
}
