//! Similarity query client.
//!
//! [`SimilarityClient`] owns one session with a vector store engine and
//! marshals typed requests into calls on it. It has two lifecycle states,
//! [`ConnectionState::Disconnected`] (initial) and
//! [`ConnectionState::Connected`].
//!
//! Every operation comes in two forms:
//!
//! - `try_*` returns `Result<_, SimQueryError>` so callers can tell zero
//!   matches from a failure and pick retry or abort;
//! - the plain form never fails: on error it returns an empty sequence,
//!   `false`, or an empty snapshot, logs a warning, and stores the error in
//!   [`SimilarityClient::last_error`]. It never returns a partial list.
//!
//! Data operations issued while disconnected fail with
//! [`SimQueryError::NotConnected`] without touching the engine.
//!
//! ```rust,ignore
//! use simquery_client::SimilarityClient;
//! use simquery_core::SimilarityQuery;
//!
//! let mut client = SimilarityClient::new(connector);
//! if client.connect().await {
//!     let hits = client.search(&SimilarityQuery::new(vector).with_limit(3)).await;
//!     client.close().await;
//! }
//! ```

use std::sync::Arc;

use simquery_core::{
    Connector, DocumentRecord, HybridQuery, HybridResult, ProductRecord, RecommendationResult,
    SimQueryError, SimilarityQuery, SimilarityResult, StatsSnapshot, StoredDocument,
    StoredProduct, VectorEngine,
};

pub use simquery_core;

/// Lifecycle state of a [`SimilarityClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Client for the similarity routines of a vector store engine.
pub struct SimilarityClient {
    connector: Arc<dyn Connector>,
    engine: Option<Box<dyn VectorEngine>>,
    last_error: Option<SimQueryError>,
}

impl SimilarityClient {
    /// Create a disconnected client. Nothing is opened until
    /// [`connect`](Self::connect).
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self::from_arc(Arc::new(connector))
    }

    pub fn from_arc(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            engine: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        if self.engine.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.engine.is_some()
    }

    /// The failure recorded by the most recent plain (non-`try_`) call, if
    /// it failed. Cleared when a plain call succeeds.
    pub fn last_error(&self) -> Option<&SimQueryError> {
        self.last_error.as_ref()
    }

    pub fn take_last_error(&mut self) -> Option<SimQueryError> {
        self.last_error.take()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Open a session. Connecting an already connected client is a no-op.
    pub async fn try_connect(&mut self) -> Result<(), SimQueryError> {
        if self.engine.is_some() {
            tracing::debug!(endpoint = %self.connector.endpoint(), "already connected");
            return Ok(());
        }
        let engine = self.connector.connect().await?;
        self.engine = Some(engine);
        tracing::info!(endpoint = %self.connector.endpoint(), "connected to vector store");
        Ok(())
    }

    /// Open a session, reporting success as a flag.
    pub async fn connect(&mut self) -> bool {
        let result = self.try_connect().await;
        self.settle("connect", result.map(|()| true))
    }

    /// Release the session. The client is disconnected afterwards even if
    /// the engine reported an error while closing.
    pub async fn try_close(&mut self) -> Result<(), SimQueryError> {
        let Some(mut engine) = self.engine.take() else {
            return Ok(());
        };
        engine.close().await?;
        tracing::info!(endpoint = %self.connector.endpoint(), "vector store connection closed");
        Ok(())
    }

    pub async fn close(&mut self) {
        let result = self.try_close().await;
        self.settle("close", result);
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Documents similar to `query.vector()`, in engine order.
    ///
    /// A `limit` of zero yields an empty sequence without calling the
    /// engine.
    pub async fn try_search(
        &mut self,
        query: &SimilarityQuery,
    ) -> Result<Vec<SimilarityResult>, SimQueryError> {
        let engine = self.engine()?;
        require_vector(query.vector())?;
        if query.limit() == 0 {
            return Ok(Vec::new());
        }
        let results = engine.search_similar_documents(query).await?;
        tracing::debug!(count = results.len(), "similarity search finished");
        Ok(results)
    }

    pub async fn search(&mut self, query: &SimilarityQuery) -> Vec<SimilarityResult> {
        let result = self.try_search(query).await;
        self.settle("search", result)
    }

    /// Blended text and vector search. Scores are surfaced exactly as the
    /// engine returns them.
    pub async fn try_hybrid_search(
        &mut self,
        query: &HybridQuery,
    ) -> Result<Vec<HybridResult>, SimQueryError> {
        let engine = self.engine()?;
        require_vector(query.vector())?;
        if query.limit() == 0 {
            return Ok(Vec::new());
        }
        let results = engine.hybrid_document_search(query).await?;
        tracing::debug!(count = results.len(), "hybrid search finished");
        Ok(results)
    }

    pub async fn hybrid_search(&mut self, query: &HybridQuery) -> Vec<HybridResult> {
        let result = self.try_hybrid_search(query).await;
        self.settle("hybrid_search", result)
    }

    /// Products similar to the stored embedding of `product_id`.
    pub async fn try_get_recommendations(
        &mut self,
        product_id: &str,
        limit: u32,
    ) -> Result<Vec<RecommendationResult>, SimQueryError> {
        let engine = self.engine()?;
        require_id("product_id", product_id)?;
        if limit == 0 {
            return Ok(Vec::new());
        }
        let results = engine.product_recommendations(product_id, limit).await?;
        tracing::debug!(product_id, count = results.len(), "recommendations finished");
        Ok(results)
    }

    pub async fn get_recommendations(
        &mut self,
        product_id: &str,
        limit: u32,
    ) -> Vec<RecommendationResult> {
        let result = self.try_get_recommendations(product_id, limit).await;
        self.settle("get_recommendations", result)
    }

    /// Both summary views merged into one snapshot.
    pub async fn try_get_stats(&mut self) -> Result<StatsSnapshot, SimQueryError> {
        let engine = self.engine()?;
        let documents = engine.document_stats().await?;
        let products = engine.product_stats().await?;
        Ok(StatsSnapshot {
            documents,
            products,
        })
    }

    pub async fn get_stats(&mut self) -> StatsSnapshot {
        let result = self.try_get_stats().await;
        self.settle("get_stats", result)
    }

    // -----------------------------------------------------------------------
    // Records
    // -----------------------------------------------------------------------

    /// Insert a document, or overwrite the one stored under the same id.
    pub async fn try_upsert_document(
        &mut self,
        record: &DocumentRecord,
    ) -> Result<(), SimQueryError> {
        let engine = self.engine()?;
        require_id("document_id", &record.document_id)?;
        require_vector(&record.embedding)?;
        engine.upsert_document(record).await?;
        tracing::info!(document_id = %record.document_id, "document embedding upserted");
        Ok(())
    }

    pub async fn upsert_document(&mut self, record: &DocumentRecord) -> bool {
        let result = self.try_upsert_document(record).await;
        self.settle("upsert_document", result.map(|()| true))
    }

    /// Insert a product, or overwrite the one stored under the same id.
    pub async fn try_upsert_product(&mut self, record: &ProductRecord) -> Result<(), SimQueryError> {
        let engine = self.engine()?;
        require_id("product_id", &record.product_id)?;
        require_vector(&record.embedding)?;
        engine.upsert_product(record).await?;
        tracing::info!(product_id = %record.product_id, "product embedding upserted");
        Ok(())
    }

    pub async fn upsert_product(&mut self, record: &ProductRecord) -> bool {
        let result = self.try_upsert_product(record).await;
        self.settle("upsert_product", result.map(|()| true))
    }

    pub async fn try_get_document(
        &mut self,
        document_id: &str,
    ) -> Result<Option<StoredDocument>, SimQueryError> {
        let engine = self.engine()?;
        require_id("document_id", document_id)?;
        engine.get_document(document_id).await
    }

    pub async fn get_document(&mut self, document_id: &str) -> Option<StoredDocument> {
        let result = self.try_get_document(document_id).await;
        self.settle("get_document", result)
    }

    pub async fn try_get_product(
        &mut self,
        product_id: &str,
    ) -> Result<Option<StoredProduct>, SimQueryError> {
        let engine = self.engine()?;
        require_id("product_id", product_id)?;
        engine.get_product(product_id).await
    }

    pub async fn get_product(&mut self, product_id: &str) -> Option<StoredProduct> {
        let result = self.try_get_product(product_id).await;
        self.settle("get_product", result)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn engine(&mut self) -> Result<&mut Box<dyn VectorEngine>, SimQueryError> {
        self.engine.as_mut().ok_or(SimQueryError::NotConnected)
    }

    /// Collapse a result into its plain-API form, recording any failure.
    fn settle<T: Default>(&mut self, operation: &'static str, result: Result<T, SimQueryError>) -> T {
        match result {
            Ok(value) => {
                self.last_error = None;
                value
            }
            Err(error) => {
                tracing::warn!(operation, error = %error, "operation failed");
                self.last_error = Some(error);
                T::default()
            }
        }
    }
}

fn require_vector(vector: &[f32]) -> Result<(), SimQueryError> {
    if vector.is_empty() {
        return Err(SimQueryError::Validation(
            "embedding must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn require_id(field: &str, value: &str) -> Result<(), SimQueryError> {
    if value.is_empty() {
        return Err(SimQueryError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}
