//! The category tree: its engine and its record codec.

pub mod codec;
mod engine;

pub use codec::{decode, encode, encode_engine, Decoded};
pub use engine::{GraphEngine, LeafEdit};
