//! Types that represent the core data model: tree nodes, derived edges, monetary amounts and
//! the flat records that the stores persist.
mod amount;
mod node;
mod record;

pub use amount::{Amount, AmountError};
pub(crate) use node::category_key;
pub use node::{Adjacency, Edge, GraphView, LeafMeta, Node, NodeIndex, ROOT, ROOT_NAME};
pub use record::{RecordId, Scope, StoredRecord};
