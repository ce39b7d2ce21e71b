//! Revision-scoped full-text search over source-control history.
//!
//! Every path revision gets a document with a validity window
//! [first, last]; the indexer keeps windows disjoint and contiguous
//! per path while replaying history incrementally, and the query side
//! filters matches to the revision range being asked about.

pub mod analysis;
pub mod engine;
pub mod index;
pub mod query;
pub mod repo;
pub mod search;
pub mod types;

pub use index::{IndexMode, IndexOptions, Indexer};
pub use query::QueryError;
pub use repo::{RepositoryAccess, ScriptedHistory, ScriptedRepository};
pub use search::{Hit, Index, IndexProperties, SearchResult};
pub use types::{Credentials, Revision};
