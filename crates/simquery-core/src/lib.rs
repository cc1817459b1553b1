use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod schema;

pub use schema::RoutineSchema;

/// An embedding vector. Its length must match the dimensionality of the
/// target collection; the engine, not the client, enforces that.
pub type Embedding = Vec<f32>;

/// Free-form structured metadata stored as JSONB.
pub type Metadata = HashMap<String, Value>;

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// A vector similarity request.
///
/// The threshold is forwarded to the engine unchecked; values outside
/// `[0, 1]` are the engine's concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityQuery {
    vector: Embedding,
    threshold: f64,
    limit: u32,
}

impl SimilarityQuery {
    pub const DEFAULT_THRESHOLD: f64 = 0.8;
    pub const DEFAULT_LIMIT: u32 = 10;

    pub fn new(vector: Embedding) -> Self {
        Self {
            vector,
            threshold: Self::DEFAULT_THRESHOLD,
            limit: Self::DEFAULT_LIMIT,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn vector(&self) -> &[f32] {
        &self.vector
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}

/// A blended lexical + vector request. The weights are passed through
/// unmodified; nothing checks that they sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridQuery {
    text: String,
    vector: Embedding,
    text_weight: f64,
    vector_weight: f64,
    limit: u32,
}

impl HybridQuery {
    pub const DEFAULT_TEXT_WEIGHT: f64 = 0.3;
    pub const DEFAULT_VECTOR_WEIGHT: f64 = 0.7;
    pub const DEFAULT_LIMIT: u32 = 10;

    pub fn new(text: impl Into<String>, vector: Embedding) -> Self {
        Self {
            text: text.into(),
            vector,
            text_weight: Self::DEFAULT_TEXT_WEIGHT,
            vector_weight: Self::DEFAULT_VECTOR_WEIGHT,
            limit: Self::DEFAULT_LIMIT,
        }
    }

    pub fn with_weights(mut self, text_weight: f64, vector_weight: f64) -> Self {
        self.text_weight = text_weight;
        self.vector_weight = vector_weight;
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn vector(&self) -> &[f32] {
        &self.vector
    }

    pub fn text_weight(&self) -> f64 {
        self.text_weight
    }

    pub fn vector_weight(&self) -> f64 {
        self.vector_weight
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// One row of `search_similar_documents`, in engine order (descending score).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    pub document_id: String,
    pub title: String,
    pub similarity: f64,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// One row of `hybrid_document_search`. `combined_score` comes from the
/// engine and is never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridResult {
    pub document_id: String,
    pub title: String,
    pub combined_score: f64,
    pub text_score: f64,
    pub vector_score: f64,
    pub content: String,
}

/// One row of `get_product_recommendations`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub product_id: String,
    pub product_name: String,
    pub similarity: f64,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A document to insert or update, keyed by `document_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document_id: String,
    pub title: String,
    pub content: String,
    pub embedding: Embedding,
    /// Written on insert only; an update keeps the stored source.
    pub source: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl DocumentRecord {
    pub const DEFAULT_SOURCE: &'static str = "api";

    pub fn new(
        document_id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        embedding: Embedding,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            title: title.into(),
            content: content.into(),
            embedding,
            source: Self::DEFAULT_SOURCE.to_string(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A product to insert or update, keyed by `product_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub product_id: String,
    pub product_name: String,
    pub description: String,
    pub category: String,
    pub price: f64,
    pub embedding: Embedding,
    #[serde(default)]
    pub features: Metadata,
}

impl ProductRecord {
    pub fn new(
        product_id: impl Into<String>,
        product_name: impl Into<String>,
        category: impl Into<String>,
        price: f64,
        embedding: Embedding,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            product_name: product_name.into(),
            description: String::new(),
            category: category.into(),
            price,
            embedding,
            features: Metadata::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_features(mut self, features: Metadata) -> Self {
        self.features = features;
        self
    }
}

/// A document as read back from `document_embeddings`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub record: DocumentRecord,
    pub created_at: DateTime<Utc>,
    /// Modification marker, refreshed by every upsert of this key.
    pub updated_at: DateTime<Utc>,
}

/// A product as read back from `product_embeddings`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredProduct {
    pub product_id: String,
    pub product_name: String,
    pub description: String,
    pub category: String,
    pub price: Option<f64>,
    pub embedding: Embedding,
    pub features: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// The single row of the `document_stats` view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentStats {
    pub total: i64,
    pub unique_sources: i64,
    pub avg_embedding_dims: Option<f64>,
    pub first_document: Option<DateTime<Utc>>,
    pub latest_document: Option<DateTime<Utc>>,
}

/// The single row of the `product_stats` view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductStats {
    pub total: i64,
    pub unique_categories: i64,
    /// `0.0` when the view reports NULL.
    pub avg_price: f64,
    pub active_products: i64,
}

/// Both summary views merged. A view that returned no row leaves its
/// section absent, which is not an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents: Option<DocumentStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub products: Option<ProductStats>,
}

impl StatsSnapshot {
    pub fn is_empty(&self) -> bool {
        self.documents.is_none() && self.products.is_none()
    }

    /// The snapshot as a nested JSON mapping.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Object(Default::default()))
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Every way a simquery operation can fail.
///
/// An empty result set is not an error.
#[derive(Debug, Error)]
pub enum SimQueryError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("not connected: call connect() before issuing operations")]
    NotConnected,
    #[error("operation error: {0}")]
    Operation(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("schema mismatch in {routine}: expected columns {expected:?}, found {found:?}")]
    Schema {
        routine: &'static str,
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("config error: {0}")]
    Config(String),
}

impl SimQueryError {
    /// True when the link itself is the problem, so reconnecting may help.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::NotConnected)
    }
}

// ---------------------------------------------------------------------------
// Engine traits
// ---------------------------------------------------------------------------

/// Opens sessions against a vector store engine.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish a new session. Failures are reported as
    /// [`SimQueryError::Connection`].
    async fn connect(&self) -> Result<Box<dyn VectorEngine>, SimQueryError>;

    /// Human-readable target, used in log lines.
    fn endpoint(&self) -> String;
}

/// One open session with the engine that owns storage, indexing and scoring.
///
/// Calls are issued one at a time; each completes, commit or rollback
/// included, before the next begins.
#[async_trait]
pub trait VectorEngine: Send {
    /// Rows of `search_similar_documents`, in engine order.
    async fn search_similar_documents(
        &mut self,
        query: &SimilarityQuery,
    ) -> Result<Vec<SimilarityResult>, SimQueryError>;

    /// Rows of `hybrid_document_search`, in engine order.
    async fn hybrid_document_search(
        &mut self,
        query: &HybridQuery,
    ) -> Result<Vec<HybridResult>, SimQueryError>;

    /// Products similar to the stored embedding of `product_id`.
    async fn product_recommendations(
        &mut self,
        product_id: &str,
        limit: u32,
    ) -> Result<Vec<RecommendationResult>, SimQueryError>;

    /// Insert or update a document. All-or-nothing.
    async fn upsert_document(&mut self, record: &DocumentRecord) -> Result<(), SimQueryError>;

    /// Insert or update a product. All-or-nothing.
    async fn upsert_product(&mut self, record: &ProductRecord) -> Result<(), SimQueryError>;

    async fn get_document(
        &mut self,
        document_id: &str,
    ) -> Result<Option<StoredDocument>, SimQueryError>;

    async fn get_product(&mut self, product_id: &str)
        -> Result<Option<StoredProduct>, SimQueryError>;

    /// The `document_stats` row, or `None` when the view returned no row.
    async fn document_stats(&mut self) -> Result<Option<DocumentStats>, SimQueryError>;

    /// The `product_stats` row, or `None` when the view returned no row.
    async fn product_stats(&mut self) -> Result<Option<ProductStats>, SimQueryError>;

    /// Release the session. Further calls fail with
    /// [`SimQueryError::NotConnected`].
    async fn close(&mut self) -> Result<(), SimQueryError>;
}
