//! Conversion between the flat stored records of one scope and the parts of a tree.
//!
//! Nothing here performs I/O. Category costs are carried through as stored; the engine
//! recomputes them when it is built from the decoded parts.

use crate::error::{GraphError, GraphResult};
use crate::graph::GraphEngine;
use crate::model::{Adjacency, Amount, Node, NodeIndex, RecordId, Scope, StoredRecord, ROOT};
use std::collections::{BTreeMap, HashSet};
use tracing::{trace, warn};

/// The nodes (sorted by index, root first) and adjacency decoded from a scope's records.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Decoded {
    pub nodes: Vec<Node>,
    pub adjacency: Adjacency,
}

impl Decoded {
    /// Builds an engine from the decoded parts, recomputing every category cost.
    pub fn into_engine(self) -> GraphResult<GraphEngine> {
        GraphEngine::from_parts(self.nodes, self.adjacency)
    }
}

/// Splits records into nodes and adjacency.
///
/// When two records claim the same node index, or the same adjacency key, the one with the
/// highest store id wins. A node record without `is_leaf` is a category when it appears as an
/// adjacency key and a leaf otherwise. The root always exists in the output, even for no records.
pub fn decode(records: &[StoredRecord]) -> GraphResult<Decoded> {
    let mut node_records: BTreeMap<NodeIndex, &StoredRecord> = BTreeMap::new();
    let mut adjacency_records: BTreeMap<NodeIndex, &StoredRecord> = BTreeMap::new();

    for record in records {
        if record.is_adjacency {
            let key = parse_key(record)?;
            keep_latest(&mut adjacency_records, key, record, "adjacency entry");
        } else {
            let index = record.index.ok_or_else(|| {
                GraphError::corrupt(format!(
                    "node record {} has no index",
                    describe_id(record.id)
                ))
            })?;
            keep_latest(&mut node_records, index, record, "node");
        }
    }

    let adjacency: Adjacency = adjacency_records
        .into_iter()
        .map(|(key, record)| (key, record.values.clone().unwrap_or_default()))
        .collect();
    let parents: HashSet<NodeIndex> = adjacency.keys().copied().collect();

    let mut nodes = Vec::with_capacity(node_records.len() + 1);
    if !node_records.contains_key(&ROOT) {
        nodes.push(Node::root());
    }
    for (index, record) in node_records {
        let name = record.name.clone().ok_or_else(|| {
            GraphError::corrupt(format!("node record for index {index} has no name"))
        })?;
        let is_leaf = match record.is_leaf {
            _ if index == ROOT => false,
            Some(is_leaf) => is_leaf,
            None => !parents.contains(&index),
        };
        trace!("Decoded node {index} '{name}' (leaf: {is_leaf})");
        nodes.push(Node {
            index,
            is_leaf,
            cost: record.cost.unwrap_or(Amount::ZERO),
            visible: record.visible,
            meta: if is_leaf { record.meta() } else { Default::default() },
            original_name: Some(name.clone()),
            name,
        });
    }

    Ok(Decoded { nodes, adjacency })
}

/// Builds the records persisting `nodes` and `adjacency` under `scope`.
///
/// The root is not persisted. Node records come first, sorted by index, followed by one record
/// per non-empty adjacency entry sorted by key. Records carry no store id.
pub fn encode<'a>(
    scope: &Scope,
    nodes: impl IntoIterator<Item = &'a Node>,
    adjacency: &Adjacency,
) -> Vec<StoredRecord> {
    let mut sorted: Vec<&Node> = nodes.into_iter().filter(|n| !n.is_root()).collect();
    sorted.sort_by_key(|n| n.index);

    let mut records: Vec<StoredRecord> = sorted
        .into_iter()
        .map(|node| {
            let mut record =
                StoredRecord::node(scope, node.name.clone(), node.index, node.cost, node.is_leaf);
            if node.is_leaf {
                record = record.with_meta(&node.meta);
            }
            record.visible = node.visible;
            record.original_name = node.original_name.clone();
            record
        })
        .collect();

    records.extend(
        adjacency
            .iter()
            .filter(|(_, children)| !children.is_empty())
            .map(|(&key, children)| StoredRecord::adjacency(scope, key, children.clone())),
    );
    records
}

/// Encodes the current state of an engine.
pub fn encode_engine(scope: &Scope, engine: &GraphEngine) -> Vec<StoredRecord> {
    encode(scope, engine.nodes(), engine.adjacency())
}

fn parse_key(record: &StoredRecord) -> GraphResult<NodeIndex> {
    let key = record.key.as_deref().ok_or_else(|| {
        GraphError::corrupt(format!(
            "adjacency record {} has no key",
            describe_id(record.id)
        ))
    })?;
    key.trim().parse::<NodeIndex>().map_err(|_| {
        GraphError::corrupt(format!(
            "adjacency record {} has a non-numeric key '{key}'",
            describe_id(record.id)
        ))
    })
}

fn keep_latest<'a>(
    map: &mut BTreeMap<NodeIndex, &'a StoredRecord>,
    index: NodeIndex,
    record: &'a StoredRecord,
    what: &str,
) {
    match map.get(&index) {
        Some(existing) => {
            warn!(
                "Found more than one {what} for index {index} (records {} and {})",
                describe_id(existing.id),
                describe_id(record.id)
            );
            if record.id > existing.id {
                map.insert(index, record);
            }
        }
        None => {
            map.insert(index, record);
        }
    }
}

fn describe_id(id: Option<RecordId>) -> String {
    match id {
        Some(id) => id.to_string(),
        None => "(unsaved)".to_string(),
    }
}
