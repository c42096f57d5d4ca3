use std::collections::HashMap;
use std::str::FromStr;

use dbarchiver_errors::GraphError;

/// Whether a child relation represents a one-to-one or one-to-many
/// dependency on its parent. Only affects documentation/rendering today;
/// Discovery and the phases treat both the same way (a set of matching PKs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepKind {
    OneToOne,
    OneToMany,
}

impl Default for DepKind {
    fn default() -> Self {
        DepKind::OneToMany
    }
}

impl FromStr for DepKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one-to-one" => Ok(DepKind::OneToOne),
            "one-to-many" => Ok(DepKind::OneToMany),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for DepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DepKind::OneToOne => "one-to-one",
            DepKind::OneToMany => "one-to-many",
        };
        f.write_str(s)
    }
}

/// Metadata attached to a directed parent -> child edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeMeta {
    /// Column on the child whose value equals `ref_column` on the parent.
    pub fk_column: String,
    /// Column on the parent (always the parent's primary key).
    pub ref_column: String,
    pub dep_kind: DepKind,
}

/// A single table in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    pub pk_column: String,
    pub is_root: bool,
    /// Unset on the root.
    pub fk_column: Option<String>,
    /// Unset on the root.
    pub ref_column: Option<String>,
    /// Unset on the root.
    pub dep_kind: Option<DepKind>,
}

impl Node {
    fn root(name: impl Into<String>, pk_column: impl Into<String>) -> Self {
        Node {
            name: name.into(),
            pk_column: pk_column.into(),
            is_root: true,
            fk_column: None,
            ref_column: None,
            dep_kind: None,
        }
    }

    fn child(
        name: impl Into<String>,
        pk_column: impl Into<String>,
        fk_column: impl Into<String>,
        ref_column: impl Into<String>,
        dep_kind: DepKind,
    ) -> Self {
        Node {
            name: name.into(),
            pk_column: pk_column.into(),
            is_root: false,
            fk_column: Some(fk_column.into()),
            ref_column: Some(ref_column.into()),
            dep_kind: Some(dep_kind),
        }
    }
}

/// An immutable, validated directed acyclic graph of tables.
///
/// Construct one with [`crate::GraphBuilder`]. Once built, a `Graph` is
/// never mutated: it is shared (read-only) across every batch of a run.
#[derive(Debug, Clone)]
pub struct Graph {
    pub(crate) root_name: String,
    pub(crate) nodes: HashMap<String, Node>,
    pub(crate) children: HashMap<String, Vec<String>>,
    pub(crate) parents: HashMap<String, Vec<String>>,
    pub(crate) edge_meta: HashMap<(String, String), EdgeMeta>,
    /// Order nodes were first registered in, used only to break ties
    /// deterministically during Kahn's algorithm.
    pub(crate) insertion_order: Vec<String>,
    pub(crate) copy_order: Vec<String>,
}

impl Graph {
    pub fn root_name(&self) -> &str {
        &self.root_name
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.insertion_order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn children_of(&self, name: &str) -> &[String] {
        self.children.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn parents_of(&self, name: &str) -> &[String] {
        self.parents.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn edge_meta(&self, parent: &str, child: &str) -> Option<&EdgeMeta> {
        self.edge_meta
            .get(&(parent.to_string(), child.to_string()))
    }

    /// The primary key column for `table`.
    pub fn pk(&self, table: &str) -> Result<&str, GraphError> {
        self.nodes
            .get(table)
            .map(|n| n.pk_column.as_str())
            .ok_or_else(|| GraphError::UnknownTable(table.to_string()))
    }

    /// Tables in copy order: parents strictly before children. Produced by
    /// Kahn's algorithm at build time; every node appears exactly once.
    pub fn copy_order(&self) -> &[String] {
        &self.copy_order
    }

    /// Tables in delete order: children strictly before parents. Always
    /// `copy_order().reverse()`.
    pub fn delete_order(&self) -> Vec<String> {
        let mut order = self.copy_order.clone();
        order.reverse();
        order
    }

    pub(crate) fn new_root(root_name: String, root_pk: String) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(root_name.clone(), Node::root(root_name.clone(), root_pk));
        Graph {
            insertion_order: vec![root_name.clone()],
            root_name,
            nodes,
            children: HashMap::new(),
            parents: HashMap::new(),
            edge_meta: HashMap::new(),
            copy_order: Vec::new(),
        }
    }

    pub(crate) fn insert_child_node(&mut self, node: Node) {
        self.insertion_order.push(node.name.clone());
        self.nodes.insert(node.name.clone(), node);
    }

    pub(crate) fn insert_edge(&mut self, parent: &str, child: &str, meta: EdgeMeta) {
        self.children
            .entry(parent.to_string())
            .or_default()
            .push(child.to_string());
        self.parents
            .entry(child.to_string())
            .or_default()
            .push(parent.to_string());
        self.edge_meta
            .insert((parent.to_string(), child.to_string()), meta);
    }
}

pub(crate) fn new_child_node(
    name: impl Into<String>,
    pk_column: impl Into<String>,
    fk_column: impl Into<String>,
    ref_column: impl Into<String>,
    dep_kind: DepKind,
) -> Node {
    Node::child(name, pk_column, fk_column, ref_column, dep_kind)
}
