//! PostgreSQL + pgvector engine for simquery.
//!
//! [`PgConnector`] opens a single [`sqlx::PgConnection`] per session and
//! drives the stored routines and views of the `vector_db` schema (the
//! schema name is configurable). Ranking, thresholds and hybrid scoring all
//! run inside PostgreSQL; this crate only marshals parameters and decodes
//! rows by column name, checking every result set against the column
//! contracts in [`simquery_core::schema`].
//!
//! # Quick start
//!
//! ```rust,no_run
//! use simquery_client::SimilarityClient;
//! use simquery_core::SimilarityQuery;
//! use simquery_pgvector::{PgConfig, PgConnector};
//!
//! # async fn example() {
//! let config = PgConfig::new()
//!     .with_host("db.internal")
//!     .with_password("secret");
//! let mut client = SimilarityClient::new(PgConnector::new(config));
//! if client.connect().await {
//!     let hits = client
//!         .search(&SimilarityQuery::new(vec![0.1; 1536]).with_limit(3))
//!         .await;
//!     println!("{} hits", hits.len());
//!     client.close().await;
//! }
//! # }
//! ```

mod config;
mod decode;
mod engine;

pub use config::PgConfig;
pub use engine::{PgConnector, PgEngine};

// Re-export core traits/types for convenience.
pub use simquery_core::{Connector, SimQueryError, VectorEngine};
