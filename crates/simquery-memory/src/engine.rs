use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use simquery_core::{
    Connector, DocumentRecord, DocumentStats, HybridQuery, HybridResult, ProductRecord,
    ProductStats, RecommendationResult, SimQueryError, SimilarityQuery, SimilarityResult,
    StoredDocument, StoredProduct, VectorEngine,
};
use tokio::sync::RwLock;

struct DocumentRow {
    record: DocumentRecord,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

struct ProductRow {
    record: ProductRecord,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct MemoryState {
    documents: HashMap<String, DocumentRow>,
    products: HashMap<String, ProductRow>,
    last_tick: Option<DateTime<Utc>>,
}

impl MemoryState {
    /// Current time, strictly later than any previously issued marker.
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.last_tick {
            Some(last) if now <= last => last + chrono::Duration::microseconds(1),
            _ => now,
        };
        self.last_tick = Some(next);
        next
    }
}

// ---------------------------------------------------------------------------
// MemoryConnector
// ---------------------------------------------------------------------------

/// Opens [`MemoryEngine`] sessions over one shared store.
///
/// Clones share the same store.
#[derive(Clone)]
pub struct MemoryConnector {
    state: Arc<RwLock<MemoryState>>,
    document_dimensions: Option<usize>,
    product_dimensions: Option<usize>,
    reachable: bool,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
            document_dimensions: None,
            product_dimensions: None,
            reachable: true,
        }
    }

    /// Reject document embeddings whose length differs from `dimensions`,
    /// like a `vector(n)` column would.
    pub fn with_document_dimensions(mut self, dimensions: usize) -> Self {
        self.document_dimensions = Some(dimensions);
        self
    }

    pub fn with_product_dimensions(mut self, dimensions: usize) -> Self {
        self.product_dimensions = Some(dimensions);
        self
    }

    /// A connector whose every connection attempt fails.
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::new()
        }
    }

    pub async fn document_count(&self) -> usize {
        self.state.read().await.documents.len()
    }

    pub async fn product_count(&self) -> usize {
        self.state.read().await.products.len()
    }
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Box<dyn VectorEngine>, SimQueryError> {
        if !self.reachable {
            return Err(SimQueryError::Connection(
                "memory store is unreachable".to_string(),
            ));
        }
        tracing::debug!("memory engine session opened");
        Ok(Box::new(MemoryEngine {
            state: Some(Arc::clone(&self.state)),
            document_dimensions: self.document_dimensions,
            product_dimensions: self.product_dimensions,
        }))
    }

    fn endpoint(&self) -> String {
        "memory".to_string()
    }
}

// ---------------------------------------------------------------------------
// MemoryEngine
// ---------------------------------------------------------------------------

/// One session over a [`MemoryConnector`]'s store.
pub struct MemoryEngine {
    state: Option<Arc<RwLock<MemoryState>>>,
    document_dimensions: Option<usize>,
    product_dimensions: Option<usize>,
}

impl MemoryEngine {
    fn state(&self) -> Result<&Arc<RwLock<MemoryState>>, SimQueryError> {
        self.state.as_ref().ok_or(SimQueryError::NotConnected)
    }
}

#[async_trait]
impl VectorEngine for MemoryEngine {
    async fn search_similar_documents(
        &mut self,
        query: &SimilarityQuery,
    ) -> Result<Vec<SimilarityResult>, SimQueryError> {
        let state = self.state()?.read().await;

        let mut scored = Vec::with_capacity(state.documents.len());
        for row in state.documents.values() {
            check_same_dimensions(query.vector(), &row.record.embedding)?;
            let similarity = cosine_similarity(query.vector(), &row.record.embedding);
            if similarity >= query.threshold() {
                scored.push((similarity, row));
            }
        }
        scored.sort_by(|a, b| {
            by_score_desc(a.0, b.0)
                .then_with(|| a.1.record.document_id.cmp(&b.1.record.document_id))
        });
        scored.truncate(query.limit() as usize);

        Ok(scored
            .into_iter()
            .map(|(similarity, row)| SimilarityResult {
                document_id: row.record.document_id.clone(),
                title: row.record.title.clone(),
                similarity,
                content: row.record.content.clone(),
                metadata: row.record.metadata.clone(),
            })
            .collect())
    }

    async fn hybrid_document_search(
        &mut self,
        query: &HybridQuery,
    ) -> Result<Vec<HybridResult>, SimQueryError> {
        let state = self.state()?.read().await;
        let terms = tokenize(query.text());

        let mut scored = Vec::with_capacity(state.documents.len());
        for row in state.documents.values() {
            check_same_dimensions(query.vector(), &row.record.embedding)?;
            let vector_score = cosine_similarity(query.vector(), &row.record.embedding);
            let text_score = text_overlap(&terms, &row.record.title, &row.record.content);
            let combined_score =
                query.text_weight() * text_score + query.vector_weight() * vector_score;
            scored.push(HybridResult {
                document_id: row.record.document_id.clone(),
                title: row.record.title.clone(),
                combined_score,
                text_score,
                vector_score,
                content: row.record.content.clone(),
            });
        }
        scored.sort_by(|a, b| {
            by_score_desc(a.combined_score, b.combined_score)
                .then_with(|| a.document_id.cmp(&b.document_id))
        });
        scored.truncate(query.limit() as usize);
        Ok(scored)
    }

    async fn product_recommendations(
        &mut self,
        product_id: &str,
        limit: u32,
    ) -> Result<Vec<RecommendationResult>, SimQueryError> {
        let state = self.state()?.read().await;
        let Some(reference) = state.products.get(product_id) else {
            return Ok(Vec::new());
        };

        let mut scored = Vec::new();
        for row in state.products.values() {
            if row.record.product_id == product_id {
                continue;
            }
            check_same_dimensions(&reference.record.embedding, &row.record.embedding)?;
            let similarity =
                cosine_similarity(&reference.record.embedding, &row.record.embedding);
            scored.push((similarity, row));
        }
        scored.sort_by(|a, b| {
            by_score_desc(a.0, b.0)
                .then_with(|| a.1.record.product_id.cmp(&b.1.record.product_id))
        });
        scored.truncate(limit as usize);

        Ok(scored
            .into_iter()
            .map(|(similarity, row)| RecommendationResult {
                product_id: row.record.product_id.clone(),
                product_name: row.record.product_name.clone(),
                similarity,
                category: row.record.category.clone(),
                price: Some(row.record.price),
            })
            .collect())
    }

    async fn upsert_document(&mut self, record: &DocumentRecord) -> Result<(), SimQueryError> {
        check_dimensions(self.document_dimensions, &record.embedding)?;
        let mut state = self.state()?.write().await;
        let now = state.tick();

        match state.documents.entry(record.document_id.clone()) {
            Entry::Occupied(mut entry) => {
                let row = entry.get_mut();
                let source = std::mem::take(&mut row.record.source);
                row.record = DocumentRecord {
                    source,
                    ..record.clone()
                };
                row.updated_at = now;
            }
            Entry::Vacant(entry) => {
                entry.insert(DocumentRow {
                    record: record.clone(),
                    created_at: now,
                    updated_at: now,
                });
            }
        }
        Ok(())
    }

    async fn upsert_product(&mut self, record: &ProductRecord) -> Result<(), SimQueryError> {
        check_dimensions(self.product_dimensions, &record.embedding)?;
        let mut state = self.state()?.write().await;
        let now = state.tick();

        match state.products.entry(record.product_id.clone()) {
            Entry::Occupied(mut entry) => {
                let row = entry.get_mut();
                row.record = record.clone();
                row.updated_at = now;
            }
            Entry::Vacant(entry) => {
                entry.insert(ProductRow {
                    record: record.clone(),
                    created_at: now,
                    updated_at: now,
                });
            }
        }
        Ok(())
    }

    async fn get_document(
        &mut self,
        document_id: &str,
    ) -> Result<Option<StoredDocument>, SimQueryError> {
        let state = self.state()?.read().await;
        Ok(state.documents.get(document_id).map(|row| StoredDocument {
            record: row.record.clone(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }))
    }

    async fn get_product(
        &mut self,
        product_id: &str,
    ) -> Result<Option<StoredProduct>, SimQueryError> {
        let state = self.state()?.read().await;
        Ok(state.products.get(product_id).map(|row| StoredProduct {
            product_id: row.record.product_id.clone(),
            product_name: row.record.product_name.clone(),
            description: row.record.description.clone(),
            category: row.record.category.clone(),
            price: Some(row.record.price),
            embedding: row.record.embedding.clone(),
            features: row.record.features.clone(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }))
    }

    async fn document_stats(&mut self) -> Result<Option<DocumentStats>, SimQueryError> {
        let state = self.state()?.read().await;
        let docs = &state.documents;

        let sources: HashSet<&str> = docs.values().map(|r| r.record.source.as_str()).collect();
        let avg_embedding_dims = if docs.is_empty() {
            None
        } else {
            let dims: usize = docs.values().map(|r| r.record.embedding.len()).sum();
            Some(dims as f64 / docs.len() as f64)
        };

        Ok(Some(DocumentStats {
            total: docs.len() as i64,
            unique_sources: sources.len() as i64,
            avg_embedding_dims,
            first_document: docs.values().map(|r| r.created_at).min(),
            latest_document: docs.values().map(|r| r.created_at).max(),
        }))
    }

    async fn product_stats(&mut self) -> Result<Option<ProductStats>, SimQueryError> {
        let state = self.state()?.read().await;
        let products = &state.products;

        let categories: HashSet<&str> =
            products.values().map(|r| r.record.category.as_str()).collect();
        let avg_price = if products.is_empty() {
            0.0
        } else {
            products.values().map(|r| r.record.price).sum::<f64>() / products.len() as f64
        };

        Ok(Some(ProductStats {
            total: products.len() as i64,
            unique_categories: categories.len() as i64,
            avg_price,
            active_products: products.len() as i64,
        }))
    }

    async fn close(&mut self) -> Result<(), SimQueryError> {
        self.state = None;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scoring helpers
// ---------------------------------------------------------------------------

/// Cosine similarity between two vectors of equal length. Zero vectors
/// score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

fn by_score_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

fn check_dimensions(expected: Option<usize>, embedding: &[f32]) -> Result<(), SimQueryError> {
    match expected {
        Some(dims) if dims != embedding.len() => Err(SimQueryError::Operation(format!(
            "expected {dims} dimensions, not {}",
            embedding.len()
        ))),
        _ => Ok(()),
    }
}

fn check_same_dimensions(a: &[f32], b: &[f32]) -> Result<(), SimQueryError> {
    if a.len() != b.len() {
        return Err(SimQueryError::Operation(format!(
            "different vector dimensions {} and {}",
            a.len(),
            b.len()
        )));
    }
    Ok(())
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Fraction of query terms that appear in the title or content.
fn text_overlap(terms: &HashSet<String>, title: &str, content: &str) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let mut words = tokenize(title);
    words.extend(tokenize(content));
    let hits = terms.iter().filter(|t| words.contains(*t)).count();
    hits as f64 / terms.len() as f64
}
