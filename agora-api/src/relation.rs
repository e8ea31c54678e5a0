use crate::{millis, Db, Error, Page, Pagination, RelationId, Service, SortKey, Time};

/// Endpoint of a relation. Nodes belong to other systems, so their ids are
/// kept opaque.
#[derive(Clone, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Node {
    #[serde(rename = "type")]
    pub kind: i64,
    pub id: String,
}

impl Node {
    pub fn new(kind: i64, id: impl Into<String>) -> Node {
        Node {
            kind,
            id: id.into(),
        }
    }
}

/// Identity of a relation: there is at most one relation per key
#[derive(Clone, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct RelationKey {
    pub from: Node,
    pub to: Node,
    pub relation_type: i64,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Relation {
    pub id: RelationId,
    #[serde(flatten)]
    pub key: RelationKey,
    pub create_time: Time,
}

impl SortKey for Relation {
    type Key = i64;

    fn sort_key(&self) -> i64 {
        millis(&self.create_time)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RelationFilter {
    /// Relations going out of `from` towards nodes of type `to_type`
    From {
        from: Node,
        to_type: i64,
        relation_type: i64,
    },

    /// Relations coming into `to` from nodes of type `from_type`
    To {
        from_type: i64,
        to: Node,
        relation_type: i64,
    },
}

impl RelationFilter {
    pub fn matches(&self, key: &RelationKey) -> bool {
        match self {
            RelationFilter::From {
                from,
                to_type,
                relation_type,
            } => key.from == *from && key.to.kind == *to_type && key.relation_type == *relation_type,
            RelationFilter::To {
                from_type,
                to,
                relation_type,
            } => key.to == *to && key.from.kind == *from_type && key.relation_type == *relation_type,
        }
    }
}

/// Two-hop paths `from -[first_edge]-> _ -[second_edge]-> _`
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PathQuery {
    pub from: Node,
    pub first_edge: i64,
    pub second_edge: i64,
    #[serde(default)]
    pub pagination: Pagination,
}

/// Counts the distinct nodes of type `to_type` reachable from `from` through
/// a node of type `via_type`
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PathCountQuery {
    pub from: Node,
    pub via_type: i64,
    pub first_edge: i64,
    pub second_edge: i64,
    pub to_type: i64,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ListRelations {
    pub filter: RelationFilter,
    #[serde(default)]
    pub pagination: Pagination,
}

impl<D: Db> Service<D> {
    /// Returns whether the relation was created, creating an existing
    /// relation being a no-op
    pub async fn create_relation(&self, key: RelationKey) -> Result<bool, Error> {
        let relation = match self.db.insert_relation(key).await? {
            Some(r) => r,
            None => return Ok(false),
        };
        match &self.graph {
            Some(g) => g.create_edge(&relation).await.map_err(|err| {
                tracing::error!(?err, relation = %relation.id, "failed mirroring relation");
                err
            })?,
            None => tracing::debug!(relation = %relation.id, "graph mirror disabled, not mirroring"),
        }
        Ok(true)
    }

    pub async fn get_relation(&self, key: &RelationKey) -> Result<Relation, Error> {
        self.db.find_relation(key).await
    }

    pub async fn list_relations(
        &self,
        filter: &RelationFilter,
        p: &Pagination,
    ) -> Result<Page<Relation>, Error> {
        let window = p.time_window()?;
        let (items, total) = futures::try_join!(
            self.db.find_relations(filter, &window),
            self.db.count_relations(filter),
        )?;
        Ok(p.finish(items, total))
    }

    pub async fn count_relations(&self, filter: &RelationFilter) -> Result<u64, Error> {
        self.db.count_relations(filter).await
    }

    pub async fn delete_relation(&self, key: &RelationKey) -> Result<u64, Error> {
        let deleted = self.db.delete_relation(key).await?;
        if deleted > 0 {
            if let Some(g) = &self.graph {
                g.delete_edge(key).await.map_err(|err| {
                    tracing::error!(?err, ?key, "failed removing mirrored relation");
                    err
                })?;
            }
        }
        Ok(deleted)
    }

    /// Deletes every relation touching `node`, in both directions
    pub async fn delete_node(&self, node: &Node) -> Result<u64, Error> {
        let deleted = self.db.delete_node(node).await?;
        tracing::info!(?node, deleted, "deleted node relations");
        if let Some(g) = &self.graph {
            g.delete_node(node).await.map_err(|err| {
                tracing::error!(?err, ?node, "failed removing mirrored node");
                err
            })?;
        }
        Ok(deleted)
    }

    pub async fn relation_paths(&self, q: &PathQuery) -> Result<Vec<Relation>, Error> {
        self.graph()?.paths(q).await
    }

    pub async fn relation_paths_count(&self, q: &PathCountQuery) -> Result<u64, Error> {
        self.graph()?.count_paths(q).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_match_one_direction() {
        let user = Node::new(1, "u1");
        let post = Node::new(2, "p1");
        let key = RelationKey {
            from: user.clone(),
            to: post.clone(),
            relation_type: 7,
        };
        assert!(RelationFilter::From {
            from: user.clone(),
            to_type: 2,
            relation_type: 7
        }
        .matches(&key));
        assert!(!RelationFilter::From {
            from: user.clone(),
            to_type: 2,
            relation_type: 8
        }
        .matches(&key));
        assert!(RelationFilter::To {
            from_type: 1,
            to: post.clone(),
            relation_type: 7
        }
        .matches(&key));
        assert!(!RelationFilter::To {
            from_type: 1,
            to: user,
            relation_type: 7
        }
        .matches(&key));
    }

    #[test]
    fn relations_flatten_their_key() {
        let r = Relation {
            id: RelationId::stub(),
            key: RelationKey {
                from: Node::new(1, "a"),
                to: Node::new(2, "b"),
                relation_type: 3,
            },
            create_time: crate::now(),
        };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["from"]["type"], 1);
        assert_eq!(json["relation_type"], 3);
        assert_eq!(serde_json::from_value::<Relation>(json).unwrap(), r);
    }
}
