//! Works out the writes that make a scope's stored records match an encoded tree.

use crate::model::{NodeIndex, RecordId, StoredRecord};
use crate::store::ChangeSet;
use std::collections::HashMap;
use tracing::{debug, trace};

/// What a stored or encoded record stands for, independent of its store id.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
enum RecordKey {
    Node { name: String, index: NodeIndex },
    Adjacency(String),
    /// Malformed records match nothing and are therefore removed.
    Unkeyed(Option<RecordId>),
}

impl RecordKey {
    fn of(record: &StoredRecord) -> Self {
        if record.is_adjacency {
            return match &record.key {
                Some(key) => RecordKey::Adjacency(key.trim().to_string()),
                None => RecordKey::Unkeyed(record.id),
            };
        }
        match (&record.name, record.index) {
            (Some(name), Some(index)) => RecordKey::Node {
                name: name.clone(),
                index,
            },
            _ => RecordKey::Unkeyed(record.id),
        }
    }
}

/// The writes for one save, plus counts used for logging and reporting.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct SavePlan {
    pub changes: ChangeSet,
    /// Stored records removed because the node they belong to was renamed.
    pub renamed: usize,
    /// Encoded records that already match their stored record exactly.
    pub unchanged: usize,
}

impl SavePlan {
    /// Diffs `stored` (the scope's current records) against `encoded` (the tree to persist).
    ///
    /// - A node whose name differs from its persisted baseline deletes the stored record keyed by
    ///   `(baseline, index)`.
    /// - An encoded record matching a stored record by `(name, index)`, or by key for adjacency,
    ///   updates it in place when the content differs and is skipped otherwise.
    /// - Encoded records matching nothing are inserted.
    /// - Stored records matched by nothing are deleted.
    pub fn new(stored: Vec<StoredRecord>, encoded: Vec<StoredRecord>) -> Self {
        let mut by_key: HashMap<RecordKey, Vec<StoredRecord>> = HashMap::new();
        for record in stored {
            by_key.entry(RecordKey::of(&record)).or_default().push(record);
        }
        // Newest first, so a duplicate is matched by its most recent write
        for records in by_key.values_mut() {
            records.sort_by(|a, b| b.id.cmp(&a.id));
        }

        let mut plan = SavePlan::default();

        for record in encoded.iter().filter(|r| !r.is_adjacency) {
            let (Some(original), Some(name), Some(index)) =
                (&record.original_name, &record.name, record.index)
            else {
                continue;
            };
            if original == name {
                continue;
            }
            let old_key = RecordKey::Node {
                name: original.clone(),
                index,
            };
            if let Some(old) = by_key.get_mut(&old_key).and_then(pop_front) {
                debug!("Node {index} was renamed from '{original}' to '{name}'");
                if let Some(id) = old.id {
                    plan.changes.deletes.push(id);
                }
                plan.renamed += 1;
            }
        }

        for record in encoded {
            let key = RecordKey::of(&record);
            match by_key.get_mut(&key).and_then(pop_front) {
                Some(existing) if same_payload(&existing, &record) => {
                    trace!("Record {:?} is unchanged", existing.id);
                    plan.unchanged += 1;
                }
                Some(existing) => match existing.id {
                    Some(id) => plan.changes.updates.push(record.with_id(id)),
                    None => plan.changes.inserts.push(record),
                },
                None => plan.changes.inserts.push(record),
            }
        }

        let mut stale: Vec<RecordId> = by_key
            .into_values()
            .flatten()
            .filter_map(|r| r.id)
            .collect();
        stale.sort_unstable();
        if !stale.is_empty() {
            debug!("Removing {} stale record(s)", stale.len());
        }
        plan.changes.deletes.extend(stale);

        plan
    }

    /// True when the store already matches the tree.
    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }
}

fn pop_front(records: &mut Vec<StoredRecord>) -> Option<StoredRecord> {
    if records.is_empty() {
        None
    } else {
        Some(records.remove(0))
    }
}

/// Compares two records ignoring their store ids and rename bookkeeping.
fn same_payload(a: &StoredRecord, b: &StoredRecord) -> bool {
    let strip = |r: &StoredRecord| StoredRecord {
        id: None,
        original_name: None,
        ..r.clone()
    };
    strip(a) == strip(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Amount, Scope};
    use std::str::FromStr;

    fn scope() -> Scope {
        Scope::new("ana@example.com", "2025-03")
    }

    fn leaf(name: &str, index: u32, cost: &str) -> StoredRecord {
        StoredRecord::node(&scope(), name, index, Amount::from_str(cost).unwrap(), true)
    }

    fn baseline(record: StoredRecord, original: &str) -> StoredRecord {
        StoredRecord {
            original_name: Some(original.to_string()),
            ..record
        }
    }

    #[test]
    fn test_first_save_inserts_everything() {
        let encoded = vec![
            leaf("Coffee", 2, "4.50"),
            StoredRecord::adjacency(&scope(), 1, vec![2]),
        ];
        let plan = SavePlan::new(vec![], encoded.clone());
        assert_eq!(plan.changes.inserts, encoded);
        assert!(plan.changes.deletes.is_empty());
        assert!(plan.changes.updates.is_empty());
    }

    #[test]
    fn test_identical_records_are_skipped() {
        let stored = vec![
            baseline(leaf("Coffee", 2, "4.50"), "Cafe").with_id(1),
            StoredRecord::adjacency(&scope(), 1, vec![2]).with_id(2),
        ];
        let encoded = vec![
            baseline(leaf("Coffee", 2, "4.5"), "Coffee"),
            StoredRecord::adjacency(&scope(), 1, vec![2]),
        ];
        let plan = SavePlan::new(stored, encoded);
        assert!(plan.is_noop(), "{plan:?}");
        assert_eq!(plan.unchanged, 2);
    }

    #[test]
    fn test_rename_deletes_old_record_and_inserts_new() {
        let stored = vec![
            baseline(leaf("Coffee", 2, "4.50"), "Coffee").with_id(10),
            StoredRecord::adjacency(&scope(), 1, vec![2]).with_id(11),
        ];
        let encoded = vec![
            baseline(leaf("Latte", 2, "4.50"), "Coffee"),
            StoredRecord::adjacency(&scope(), 1, vec![2]),
        ];
        let plan = SavePlan::new(stored, encoded);
        assert_eq!(plan.renamed, 1);
        assert_eq!(plan.changes.deletes, vec![10]);
        assert_eq!(plan.changes.inserts.len(), 1);
        assert_eq!(plan.changes.inserts[0].name.as_deref(), Some("Latte"));
        assert!(plan.changes.updates.is_empty());
    }

    #[test]
    fn test_changed_cost_updates_in_place() {
        let stored = vec![baseline(leaf("Coffee", 2, "4.50"), "Coffee").with_id(3)];
        let encoded = vec![baseline(leaf("Coffee", 2, "5.00"), "Coffee")];
        let plan = SavePlan::new(stored, encoded);
        assert_eq!(plan.changes.updates.len(), 1);
        assert_eq!(plan.changes.updates[0].id, Some(3));
        assert!(plan.changes.inserts.is_empty());
        assert!(plan.changes.deletes.is_empty());
    }

    #[test]
    fn test_stale_and_duplicate_records_are_deleted() {
        let stored = vec![
            leaf("Coffee", 2, "4.50").with_id(1),
            leaf("Coffee", 2, "4.50").with_id(7),
            leaf("Bagel", 3, "3").with_id(2),
            StoredRecord::adjacency(&scope(), 1, vec![2, 3]).with_id(4),
        ];
        let encoded = vec![
            baseline(leaf("Coffee", 2, "4.50"), "Coffee"),
            StoredRecord::adjacency(&scope(), 1, vec![2]),
        ];
        let plan = SavePlan::new(stored, encoded);
        // The newest Coffee is kept, the older duplicate and the deleted Bagel go
        assert_eq!(plan.changes.deletes, vec![1, 2]);
        assert_eq!(plan.changes.updates.len(), 1);
        assert_eq!(plan.changes.updates[0].id, Some(4));
        assert_eq!(plan.unchanged, 1);
    }

    #[test]
    fn test_malformed_stored_records_are_deleted() {
        let mut broken = StoredRecord::adjacency(&scope(), 1, vec![2]).with_id(5);
        broken.key = None;
        let plan = SavePlan::new(vec![broken], vec![]);
        assert_eq!(plan.changes.deletes, vec![5]);
    }
}
