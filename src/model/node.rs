use crate::model::Amount;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifies a node within the tree of one owner+period scope.
pub type NodeIndex = u32;

/// The index of the synthetic root category.
pub const ROOT: NodeIndex = 0;

/// The display name of the synthetic root category.
pub const ROOT_NAME: &str = "Expenses";

/// The authoritative parent → children structure. Child lists keep insertion order.
pub type Adjacency = BTreeMap<NodeIndex, Vec<NodeIndex>>;

/// Descriptive fields of a transaction. The engine carries these through unchanged.
#[derive(Default, Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LeafMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
}

impl LeafMeta {
    pub fn is_empty(&self) -> bool {
        self.date.is_none()
            && self.location.is_none()
            && self.bank.is_none()
            && self.raw_text.is_none()
    }
}

/// A spending category or an individual transaction.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Node {
    pub index: NodeIndex,
    pub name: String,
    pub is_leaf: bool,
    /// For a leaf, the transaction amount. For a category, the sum of its children, always
    /// recomputed by the engine.
    pub cost: Amount,
    pub visible: bool,
    #[serde(default, skip_serializing_if = "LeafMeta::is_empty")]
    pub meta: LeafMeta,
    /// The name this node had when it was last persisted. `None` for nodes created since.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
}

impl Node {
    pub fn root() -> Self {
        Self::category(ROOT, ROOT_NAME)
    }

    pub fn category(index: NodeIndex, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            is_leaf: false,
            cost: Amount::ZERO,
            visible: true,
            meta: LeafMeta::default(),
            original_name: None,
        }
    }

    pub fn leaf(index: NodeIndex, name: impl Into<String>, cost: Amount, meta: LeafMeta) -> Self {
        Self {
            index,
            name: name.into(),
            is_leaf: true,
            cost,
            visible: true,
            meta,
            original_name: None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.index == ROOT
    }

    /// True when the name differs from the name it was last persisted under.
    pub fn is_renamed(&self) -> bool {
        matches!(&self.original_name, Some(original) if original != &self.name)
    }
}

/// A derived view of one parent → child relationship.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Edge {
    pub source: NodeIndex,
    pub target: NodeIndex,
    /// The target's current cost.
    pub value: Amount,
}

/// The nodes and derived edges of a tree, as returned by a query.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GraphView {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// Normalized form of a category name used for matching: trimmed and lowercased.
pub(crate) fn category_key(name: &str) -> String {
    name.trim().to_lowercase()
}
