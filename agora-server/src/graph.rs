use agora_api::{
    from_millis, millis, Error as ApiError, GraphMirror, Node, PathCountQuery, PathQuery,
    Relation, RelationId, RelationKey, Uuid,
};
use anyhow::{anyhow, Context};
use neo4rs::{query, ConfigBuilder, Graph, Query, Row};

/// Mirrors relations into Neo4j, where `:Node {type, id}` vertices are linked
/// by `:RELATION {relation_type}` edges
pub struct Neo4jMirror {
    graph: Graph,
}

fn graph_err(err: anyhow::Error) -> ApiError {
    tracing::error!(?err, "graph mirror failure");
    ApiError::StorageFailure(format!("graph mirror: {err:#}"))
}

fn with_key(q: Query, key: &RelationKey) -> Query {
    q.param("from_type", key.from.kind)
        .param("from_id", key.from.id.as_str())
        .param("to_type", key.to.kind)
        .param("to_id", key.to.id.as_str())
        .param("relation_type", key.relation_type)
}

fn relation(
    id: &str,
    from: Node,
    to: Node,
    relation_type: i64,
    create_time: i64,
) -> anyhow::Result<Relation> {
    Ok(Relation {
        id: RelationId(Uuid::try_parse(id).with_context(|| format!("parsing relation id {id:?}"))?),
        key: RelationKey {
            from,
            to,
            relation_type,
        },
        create_time: from_millis(create_time)
            .ok_or_else(|| anyhow!("creation time {create_time} out of range"))?,
    })
}

fn relation_from_row(row: &Row) -> anyhow::Result<Relation> {
    let int = |name: &str| {
        row.get::<i64>(name)
            .with_context(|| format!("reading column {name:?}"))
    };
    let string = |name: &str| {
        row.get::<String>(name)
            .with_context(|| format!("reading column {name:?}"))
    };
    relation(
        &string("id")?,
        Node::new(int("from_type")?, string("from_id")?),
        Node::new(int("to_type")?, string("to_id")?),
        int("relation_type")?,
        int("create_time")?,
    )
}

impl Neo4jMirror {
    pub async fn connect(
        uri: &str,
        database: &str,
        user: &str,
        password: &str,
    ) -> anyhow::Result<Neo4jMirror> {
        let config = ConfigBuilder::default()
            .uri(uri)
            .user(user)
            .password(password)
            .db(database)
            .build()
            .context("building neo4j configuration")?;
        let graph = Graph::connect(config)
            .await
            .with_context(|| format!("connecting to neo4j at {uri}"))?;
        Ok(Neo4jMirror { graph })
    }

    async fn run(&self, q: Query, what: &'static str) -> Result<(), ApiError> {
        self.graph
            .run(q)
            .await
            .context(what)
            .map_err(graph_err)
    }

    async fn fetch(&self, q: Query, what: &'static str) -> Result<Vec<Row>, ApiError> {
        let mut stream = self.graph.execute(q).await.context(what).map_err(graph_err)?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await.context(what).map_err(graph_err)? {
            rows.push(row);
        }
        Ok(rows)
    }
}

#[async_trait::async_trait]
impl GraphMirror for Neo4jMirror {
    async fn create_edge(&self, r: &Relation) -> Result<(), ApiError> {
        let q = query(
            "MERGE (a:Node {type: $from_type, id: $from_id})
             MERGE (b:Node {type: $to_type, id: $to_id})
             MERGE (a)-[r:RELATION {relation_type: $relation_type}]->(b)
             ON CREATE SET r.id = $id, r.create_time = $create_time",
        );
        let q = with_key(q, &r.key)
            .param("id", r.id.to_string())
            .param("create_time", millis(&r.create_time));
        self.run(q, "creating edge").await
    }

    async fn delete_edge(&self, key: &RelationKey) -> Result<(), ApiError> {
        let q = query(
            "MATCH (:Node {type: $from_type, id: $from_id})
                   -[r:RELATION {relation_type: $relation_type}]->
                   (:Node {type: $to_type, id: $to_id})
             DELETE r",
        );
        self.run(with_key(q, key), "deleting edge").await
    }

    async fn delete_node(&self, node: &Node) -> Result<(), ApiError> {
        let q = query("MATCH (n:Node {type: $type, id: $id}) DETACH DELETE n")
            .param("type", node.kind)
            .param("id", node.id.as_str());
        self.run(q, "deleting node").await
    }

    async fn paths(&self, q: &PathQuery) -> Result<Vec<Relation>, ApiError> {
        let cypher = query(
            "MATCH (:Node {type: $from_type, id: $from_id})
                   -[:RELATION {relation_type: $first_edge}]->(b:Node)
                   -[r:RELATION {relation_type: $second_edge}]->(c:Node)
             RETURN DISTINCT r.id AS id,
                    b.type AS from_type, b.id AS from_id,
                    c.type AS to_type, c.id AS to_id,
                    r.relation_type AS relation_type, r.create_time AS create_time
             ORDER BY create_time DESC
             SKIP $offset LIMIT $limit",
        )
        .param("from_type", q.from.kind)
        .param("from_id", q.from.id.as_str())
        .param("first_edge", q.first_edge)
        .param("second_edge", q.second_edge)
        .param("offset", i64::from(q.pagination.offset()))
        .param("limit", i64::from(q.pagination.limit()));
        let rows = self.fetch(cypher, "listing two-hop paths").await?;
        rows.iter()
            .map(relation_from_row)
            .collect::<anyhow::Result<_>>()
            .map_err(graph_err)
    }

    async fn count_paths(&self, q: &PathCountQuery) -> Result<u64, ApiError> {
        let cypher = query(
            "MATCH (:Node {type: $from_type, id: $from_id})
                   -[:RELATION {relation_type: $first_edge}]->(:Node {type: $via_type})
                   -[:RELATION {relation_type: $second_edge}]->(c:Node {type: $to_type})
             RETURN count(DISTINCT c) AS count",
        )
        .param("from_type", q.from.kind)
        .param("from_id", q.from.id.as_str())
        .param("via_type", q.via_type)
        .param("first_edge", q.first_edge)
        .param("second_edge", q.second_edge)
        .param("to_type", q.to_type);
        let rows = self.fetch(cypher, "counting two-hop paths").await?;
        let row = rows
            .first()
            .ok_or_else(|| graph_err(anyhow!("path count query returned no row")))?;
        let count = row
            .get::<i64>("count")
            .context("reading path count")
            .map_err(graph_err)?;
        u64::try_from(count)
            .context("negative path count")
            .map_err(graph_err)
    }
}
