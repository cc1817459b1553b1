//! simquery: a client for vector-similarity stored routines.
//!
//! This crate re-exports the simquery sub-crates for single-import usage.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `default` | `memory` |
//! | `memory` | In-process engine reproducing the stored-routine contract |
//! | `pgvector` | PostgreSQL + pgvector engine over sqlx |
//! | `full` | All features enabled |
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use simquery::core::{DocumentRecord, SimilarityQuery};
//! use simquery::pgvector::{PgConfig, PgConnector};
//! use simquery::SimilarityClient;
//! ```

/// Queries, results, records, `SimQueryError`, engine traits and row schemas.
/// Always available.
pub use simquery_core as core;

/// The client with its lifecycle and failure policy. Always available.
pub use simquery_client::{ConnectionState, SimilarityClient};

/// In-process engine.
#[cfg(feature = "memory")]
pub use simquery_memory as memory;

/// PostgreSQL + pgvector engine.
#[cfg(feature = "pgvector")]
pub use simquery_pgvector as pgvector;
