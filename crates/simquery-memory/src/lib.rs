//! In-process vector store engine for simquery.
//!
//! [`MemoryConnector`] hands out sessions over a shared in-memory store that
//! behaves like the `vector_db` stored routines: cosine similarity with a
//! `>=` threshold, a weighted lexical + vector blend for hybrid search, and
//! upserts that keep `source` and `created_at` while refreshing
//! `updated_at`. Stored data outlives individual sessions, so a client can
//! close, reconnect, and read back what it wrote.
//!
//! ```rust,ignore
//! use simquery_client::SimilarityClient;
//! use simquery_memory::MemoryConnector;
//!
//! let mut client = SimilarityClient::new(MemoryConnector::new());
//! assert!(client.connect().await);
//! ```

mod engine;

pub use engine::{cosine_similarity, MemoryConnector, MemoryEngine};

// Re-export core traits/types for convenience.
pub use simquery_core::{Connector, VectorEngine};
