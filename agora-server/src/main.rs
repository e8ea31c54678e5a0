use std::{net::SocketAddr, sync::Arc};

use agora_api::{Db, ReleaseMode, Service, ServiceConfig};
use anyhow::Context;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use sqlx::{postgres::PgPoolOptions, PgPool};

mod db;
mod error;
mod extractors;
mod fuzz;
mod graph;
mod handlers;
mod notify;
mod query;

pub use error::Error;

use db::PgDb;
use extractors::AppState;
use graph::Neo4jMirror;
use notify::PgNotifier;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(structopt::StructOpt)]
struct Opt {
    /// PostgreSQL connection string
    #[structopt(long, env = "DATABASE_URL")]
    database_url: String,

    /// Address to listen on
    #[structopt(long, env = "AGORA_LISTEN", default_value = "127.0.0.1:3000")]
    listen: SocketAddr,

    /// What happens to a pinned comment when a request leaves it unpinned:
    /// `clear` empties the subject's top comment, `adopt` keeps the
    /// requested comment as top
    #[structopt(long, env = "AGORA_PIN_RELEASE_MODE", default_value = "clear")]
    pin_release_mode: ReleaseMode,

    /// Neo4j bolt URI, the graph mirror is disabled when unset
    #[structopt(long, env = "AGORA_NEO4J_URL")]
    neo4j_url: Option<String>,

    #[structopt(long, env = "AGORA_NEO4J_USER", default_value = "neo4j")]
    neo4j_user: String,

    #[structopt(long, env = "AGORA_NEO4J_PASSWORD", default_value = "")]
    neo4j_password: String,

    #[structopt(long, env = "AGORA_NEO4J_DATABASE", default_value = "neo4j")]
    neo4j_database: String,

    /// Channel on which subject deletions are announced
    #[structopt(
        long,
        env = "AGORA_NOTIFY_CHANNEL",
        default_value = "delete_comment_relations"
    )]
    notify_channel: String,
}

pub async fn create_sqlx_pool(db_url: &str) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(8)
        .connect(db_url)
        .await
        .with_context(|| format!("Error opening database {db_url:?}"))
}

pub fn app<D: Db>(service: Arc<Service<D>>) -> Router {
    use handlers::*;
    Router::new()
        .route("/api/subjects", post(create_subject::<D>))
        .route(
            "/api/subjects/:id",
            get(get_subject::<D>)
                .patch(update_subject::<D>)
                .delete(delete_subject::<D>),
        )
        .route(
            "/api/subjects/:subject/comments/:comment/attrs",
            put(set_comment_attrs::<D>),
        )
        .route("/api/comments", post(create_comment::<D>))
        .route("/api/comments/list", post(list_comments::<D>))
        .route("/api/comments/blocks", post(get_comment_blocks::<D>))
        .route("/api/comments/delete", post(delete_comments::<D>))
        .route(
            "/api/comments/:id",
            get(get_comment::<D>)
                .patch(update_comment::<D>)
                .delete(delete_comment::<D>),
        )
        .route("/api/labels", post(create_label::<D>))
        .route("/api/labels/batch", post(get_labels_in_batch::<D>))
        .route("/api/labels/search", post(search_labels::<D>))
        .route(
            "/api/labels/:id",
            get(get_label::<D>)
                .patch(update_label::<D>)
                .delete(delete_label::<D>),
        )
        .route(
            "/api/objects",
            post(create_object::<D>).put(update_object::<D>),
        )
        .route("/api/objects/batch", post(create_objects::<D>))
        .route("/api/objects/list", post(get_objects::<D>))
        .route("/api/objects/:id", delete(delete_object::<D>))
        .route("/api/relations", post(create_relation::<D>))
        .route("/api/relations/get", post(get_relation::<D>))
        .route("/api/relations/delete", post(delete_relation::<D>))
        .route("/api/relations/list", post(list_relations::<D>))
        .route("/api/relations/count", post(count_relations::<D>))
        .route("/api/relations/paths", post(relation_paths::<D>))
        .route("/api/relations/paths/count", post(relation_paths_count::<D>))
        .route("/api/nodes/delete", post(delete_node::<D>))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(AppState { service })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let opt = <Opt as structopt::StructOpt>::from_args();

    let pool = create_sqlx_pool(&opt.database_url).await?;
    MIGRATOR
        .run(&pool)
        .await
        .context("running pending migrations")?;

    let notifier = Arc::new(PgNotifier::new(pool.clone(), opt.notify_channel));
    let config = ServiceConfig {
        release_mode: opt.pin_release_mode,
    };
    let mut service = Service::new(PgDb::new(pool), notifier, config);
    match opt.neo4j_url {
        Some(url) => {
            tracing::info!(%url, "mirroring relations to neo4j");
            let mirror = Neo4jMirror::connect(
                &url,
                &opt.neo4j_database,
                &opt.neo4j_user,
                &opt.neo4j_password,
            )
            .await?;
            service = service.with_graph(Arc::new(mirror));
        }
        None => tracing::warn!("no neo4j url configured, path queries are unavailable"),
    }

    let app = app(Arc::new(service));

    tracing::info!("listening on {}", opt.listen);
    axum::Server::bind(&opt.listen)
        .serve(app.into_make_service())
        .await
        .context("serving axum webserver")
}
