use dbarchiver_errors::GraphError;

use crate::graph::{new_child_node, DepKind, EdgeMeta, Graph, Node};
use crate::ordering::kahn_order;

/// Tree-shaped input to [`GraphBuilder::from_relation_spec`]: one node per
/// child relation, recursively nested. The job's root table is *not*
/// represented here; it is supplied separately as `root_table`/`root_pk`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationSpec {
    pub table: String,
    pub primary_key: String,
    pub foreign_key: String,
    /// `Some("one-to-one")`, `Some("one-to-many")`, or `None` (defaults to
    /// one-to-many).
    pub dep_kind: Option<String>,
    pub children: Vec<RelationSpec>,
}

/// Incrementally constructs a [`Graph`], validating as it goes.
///
/// The high-level entry point is [`GraphBuilder::from_relation_spec`], which
/// walks a [`RelationSpec`] tree the way a job configuration describes it and
/// rejects duplicate table names unconditionally (every node has exactly one
/// parent edge).
///
/// The lower-level `add_bare_node`/`add_edge_to_existing` methods exist
/// because the abstract [`Graph`] data model allows a node to have more than
/// one parent (diamonds), even though the tree-shaped configuration format
/// cannot express that directly — they are used to construct such graphs
/// for testing Ordering/Discovery, and are not reachable from job
/// configuration.
pub struct GraphBuilder {
    graph: Graph,
}

impl GraphBuilder {
    /// Start a new builder with just the root node registered.
    pub fn new(root_table: impl Into<String>, root_pk: impl Into<String>) -> Result<Self, GraphError> {
        let root_table = root_table.into();
        let root_pk = root_pk.into();
        if root_table.trim().is_empty() {
            return Err(GraphError::EmptyTableName);
        }
        if root_pk.trim().is_empty() {
            return Err(GraphError::MissingPrimaryKey(root_table));
        }
        Ok(GraphBuilder {
            graph: Graph::new_root(root_table, root_pk),
        })
    }

    /// Register a node with no edges yet. Used only by low-level tests; the
    /// real job-configuration path always registers a node and its single
    /// parent edge together (see [`Self::from_relation_spec`]).
    pub fn add_bare_node(
        &mut self,
        table: impl Into<String>,
        pk_column: impl Into<String>,
    ) -> Result<(), GraphError> {
        let table = table.into();
        let pk_column = pk_column.into();
        if table.trim().is_empty() {
            return Err(GraphError::EmptyTableName);
        }
        if self.graph.contains(&table) {
            return Err(GraphError::DuplicateTable(table));
        }
        self.graph.insert_child_node(Node {
            name: table,
            pk_column,
            is_root: false,
            fk_column: None,
            ref_column: None,
            dep_kind: None,
        });
        Ok(())
    }

    /// Add an edge between two already-registered nodes. If `child`'s
    /// node-level `fk_column`/`dep_kind` are still unset, they are filled in
    /// from this edge (the "primary" parent); additional parents only add to
    /// the edge map.
    pub fn add_edge_to_existing(
        &mut self,
        parent: &str,
        child: &str,
        fk_column: impl Into<String>,
        dep_kind: Option<&str>,
    ) -> Result<(), GraphError> {
        if !self.graph.contains(parent) {
            return Err(GraphError::UnknownTable(parent.to_string()));
        }
        if !self.graph.contains(child) {
            return Err(GraphError::UnknownTable(child.to_string()));
        }
        let fk_column = fk_column.into();
        if fk_column.trim().is_empty() {
            return Err(GraphError::MissingForeignKey(child.to_string()));
        }
        let dep_kind = parse_dep_kind(child, dep_kind)?;
        let ref_column = self.graph.pk(parent)?.to_string();

        if let Some(node) = self.graph.nodes.get_mut(child) {
            if node.fk_column.is_none() {
                node.fk_column = Some(fk_column.clone());
                node.ref_column = Some(ref_column.clone());
                node.dep_kind = Some(dep_kind);
            }
        }

        self.graph.insert_edge(
            parent,
            child,
            EdgeMeta {
                fk_column,
                ref_column,
                dep_kind,
            },
        );
        Ok(())
    }

    /// Finalize: run cycle detection and compute the copy order.
    pub fn build(mut self) -> Result<Graph, GraphError> {
        let order = kahn_order(&self.graph)?;
        self.graph.copy_order = order;
        Ok(self.graph)
    }

    /// Build a [`GraphBuilder`] (not yet finalized) from a root table and a
    /// tree of relations, so callers can add further low-level edges before
    /// calling [`Self::build`].
    pub fn from_relation_spec_builder(
        root_table: impl Into<String>,
        root_pk: impl Into<String>,
        relations: &[RelationSpec],
    ) -> Result<Self, GraphError> {
        let mut builder = GraphBuilder::new(root_table, root_pk)?;
        let root_name = builder.graph.root_name().to_string();
        for relation in relations {
            builder.add_relation_tree(&root_name, relation)?;
        }
        Ok(builder)
    }

    /// Walk a [`RelationSpec`] tree and build a complete, validated
    /// [`Graph`] in one call. This is the entry point job configuration
    /// loading uses.
    pub fn from_relation_spec(
        root_table: impl Into<String>,
        root_pk: impl Into<String>,
        relations: &[RelationSpec],
    ) -> Result<Graph, GraphError> {
        GraphBuilder::from_relation_spec_builder(root_table, root_pk, relations)?.build()
    }

    fn add_relation_tree(&mut self, parent: &str, spec: &RelationSpec) -> Result<(), GraphError> {
        if spec.table.trim().is_empty() {
            return Err(GraphError::EmptyTableName);
        }
        if spec.primary_key.trim().is_empty() {
            return Err(GraphError::MissingPrimaryKey(spec.table.clone()));
        }
        if spec.foreign_key.trim().is_empty() {
            return Err(GraphError::MissingForeignKey(spec.table.clone()));
        }
        if self.graph.contains(&spec.table) {
            return Err(GraphError::DuplicateTable(spec.table.clone()));
        }

        let dep_kind = parse_dep_kind(&spec.table, spec.dep_kind.as_deref())?;
        let ref_column = self.graph.pk(parent)?.to_string();

        self.graph.insert_child_node(new_child_node(
            spec.table.clone(),
            spec.primary_key.clone(),
            spec.foreign_key.clone(),
            ref_column.clone(),
            dep_kind,
        ));
        self.graph.insert_edge(
            parent,
            &spec.table,
            EdgeMeta {
                fk_column: spec.foreign_key.clone(),
                ref_column,
                dep_kind,
            },
        );

        for child in &spec.children {
            self.add_relation_tree(&spec.table, child)?;
        }
        Ok(())
    }
}

fn parse_dep_kind(table: &str, raw: Option<&str>) -> Result<DepKind, GraphError> {
    match raw {
        None => Ok(DepKind::default()),
        Some(s) => s.parse().map_err(|_| GraphError::InvalidDependencyType {
            table: table.to_string(),
            value: s.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_spec() -> Vec<RelationSpec> {
        vec![RelationSpec {
            table: "orders".into(),
            primary_key: "id".into(),
            foreign_key: "user_id".into(),
            dep_kind: None,
            children: vec![],
        }]
    }

    #[test]
    fn builds_a_simple_parent_child_graph() {
        let graph = GraphBuilder::from_relation_spec("users", "id", &simple_spec()).unwrap();
        assert_eq!(graph.len(), 2);
        assert!(graph.node("users").unwrap().is_root);
        assert!(!graph.node("orders").unwrap().is_root);
        assert_eq!(graph.pk("orders").unwrap(), "id");
        let meta = graph.edge_meta("users", "orders").unwrap();
        assert_eq!(meta.fk_column, "user_id");
        assert_eq!(meta.ref_column, "id");
        assert_eq!(meta.dep_kind, DepKind::OneToMany);
    }

    #[test]
    fn rejects_duplicate_table_name() {
        let spec = vec![
            RelationSpec {
                table: "orders".into(),
                primary_key: "id".into(),
                foreign_key: "user_id".into(),
                dep_kind: None,
                children: vec![],
            },
            RelationSpec {
                table: "orders".into(),
                primary_key: "id".into(),
                foreign_key: "user_id".into(),
                dep_kind: None,
                children: vec![],
            },
        ];
        let err = GraphBuilder::from_relation_spec("users", "id", &spec).unwrap_err();
        assert_eq!(err, GraphError::DuplicateTable("orders".into()));
    }

    #[test]
    fn rejects_missing_primary_key() {
        let spec = vec![RelationSpec {
            table: "orders".into(),
            primary_key: "".into(),
            foreign_key: "user_id".into(),
            dep_kind: None,
            children: vec![],
        }];
        let err = GraphBuilder::from_relation_spec("users", "id", &spec).unwrap_err();
        assert_eq!(err, GraphError::MissingPrimaryKey("orders".into()));
    }

    #[test]
    fn rejects_invalid_dependency_type() {
        let spec = vec![RelationSpec {
            table: "orders".into(),
            primary_key: "id".into(),
            foreign_key: "user_id".into(),
            dep_kind: Some("many-to-many".into()),
            children: vec![],
        }];
        let err = GraphBuilder::from_relation_spec("users", "id", &spec).unwrap_err();
        assert_eq!(
            err,
            GraphError::InvalidDependencyType {
                table: "orders".into(),
                value: "many-to-many".into(),
            }
        );
    }

    #[test]
    fn every_non_root_node_has_at_least_one_parent() {
        let spec = vec![RelationSpec {
            table: "orders".into(),
            primary_key: "id".into(),
            foreign_key: "user_id".into(),
            dep_kind: None,
            children: vec![RelationSpec {
                table: "order_items".into(),
                primary_key: "id".into(),
                foreign_key: "order_id".into(),
                dep_kind: None,
                children: vec![],
            }],
        }];
        let graph = GraphBuilder::from_relation_spec("users", "id", &spec).unwrap();
        for name in graph.table_names() {
            if name == graph.root_name() {
                continue;
            }
            assert!(!graph.parents_of(name).is_empty(), "{name} has no parent");
        }
    }
}
