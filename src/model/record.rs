//! The flat record layout shared by every record store backend.

use crate::model::{Amount, LeafMeta, NodeIndex};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Identity assigned to a record by the store.
pub type RecordId = i64;

/// The storage partition under which one independent tree lives, e.g. a user and a month.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Scope {
    owner: String,
    period: String,
}

impl Scope {
    pub fn new(owner: impl Into<String>, period: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            period: period.into(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn period(&self) -> &str {
        &self.period
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.period)
    }
}

/// One stored record. Two kinds share this shape and are told apart by `is_adjacency`:
///
/// - node records carry `name`, `index`, `cost`, `is_leaf` and the optional leaf fields,
/// - adjacency records carry `key` (the parent index, as text) and `values` (child indices).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StoredRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub owner: String,
    pub period: String,
    #[serde(default)]
    pub is_adjacency: bool,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<NodeIndex>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_leaf: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<NodeIndex>>,
}

fn default_visible() -> bool {
    true
}

impl StoredRecord {
    fn empty(scope: &Scope, is_adjacency: bool) -> Self {
        Self {
            id: None,
            owner: scope.owner().to_string(),
            period: scope.period().to_string(),
            is_adjacency,
            visible: true,
            name: None,
            index: None,
            cost: None,
            is_leaf: None,
            date: None,
            location: None,
            bank: None,
            raw_text: None,
            original_name: None,
            key: None,
            values: None,
        }
    }

    /// Creates an unsaved node record.
    pub fn node(
        scope: &Scope,
        name: impl Into<String>,
        index: NodeIndex,
        cost: Amount,
        is_leaf: bool,
    ) -> Self {
        Self {
            name: Some(name.into()),
            index: Some(index),
            cost: Some(cost),
            is_leaf: Some(is_leaf),
            ..Self::empty(scope, false)
        }
    }

    /// Creates an unsaved adjacency record.
    pub fn adjacency(scope: &Scope, key: NodeIndex, values: Vec<NodeIndex>) -> Self {
        Self {
            key: Some(key.to_string()),
            values: Some(values),
            ..Self::empty(scope, true)
        }
    }

    pub fn with_meta(mut self, meta: &LeafMeta) -> Self {
        self.date = meta.date.clone();
        self.location = meta.location.clone();
        self.bank = meta.bank.clone();
        self.raw_text = meta.raw_text.clone();
        self
    }

    pub fn with_id(mut self, id: RecordId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn scope(&self) -> Scope {
        Scope::new(self.owner.clone(), self.period.clone())
    }

    pub fn in_scope(&self, scope: &Scope) -> bool {
        self.owner == scope.owner() && self.period == scope.period()
    }

    pub fn meta(&self) -> LeafMeta {
        LeafMeta {
            date: self.date.clone(),
            location: self.location.clone(),
            bank: self.bank.clone(),
            raw_text: self.raw_text.clone(),
        }
    }

    /// True when both records hold the same data, ignoring their store ids.
    pub fn same_content(&self, other: &StoredRecord) -> bool {
        let mut a = self.clone();
        a.id = other.id;
        &a == other
    }
}
