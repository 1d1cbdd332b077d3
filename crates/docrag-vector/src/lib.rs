//! LanceDB-backed index store: named collections of embedded chunks with
//! exact cosine-distance lookup.

pub mod schema;
pub mod store;
pub mod table;

pub use store::{cosine_distance, Collection, IndexStore};
