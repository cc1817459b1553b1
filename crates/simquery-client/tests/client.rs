use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use simquery_client::{ConnectionState, SimilarityClient};
use simquery_core::{
    Connector, DocumentRecord, DocumentStats, HybridQuery, HybridResult, ProductRecord,
    ProductStats, RecommendationResult, SimQueryError, SimilarityQuery, SimilarityResult,
    StoredDocument, StoredProduct, VectorEngine,
};
use simquery_memory::MemoryConnector;

// ---------------------------------------------------------------------------
// Scripted engine: returns canned rows and records every call
// ---------------------------------------------------------------------------

#[derive(Default, Clone)]
struct Script {
    similar: Vec<SimilarityResult>,
    hybrid: Vec<HybridResult>,
    recommendations: Vec<RecommendationResult>,
    document_stats: Option<DocumentStats>,
    product_stats: Option<ProductStats>,
    fail_with: Option<&'static str>,
}

#[derive(Clone)]
struct ScriptedConnector {
    script: Script,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedConnector {
    fn new(script: Script) -> Self {
        Self {
            script,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self) -> Result<Box<dyn VectorEngine>, SimQueryError> {
        Ok(Box::new(ScriptedEngine {
            script: self.script.clone(),
            calls: Arc::clone(&self.calls),
        }))
    }

    fn endpoint(&self) -> String {
        "scripted".to_string()
    }
}

struct ScriptedEngine {
    script: Script,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedEngine {
    fn record(&self, call: &str) -> Result<(), SimQueryError> {
        self.calls.lock().unwrap().push(call.to_string());
        match self.script.fail_with {
            Some(message) => Err(SimQueryError::Operation(message.to_string())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl VectorEngine for ScriptedEngine {
    async fn search_similar_documents(
        &mut self,
        _query: &SimilarityQuery,
    ) -> Result<Vec<SimilarityResult>, SimQueryError> {
        self.record("search_similar_documents")?;
        Ok(self.script.similar.clone())
    }

    async fn hybrid_document_search(
        &mut self,
        _query: &HybridQuery,
    ) -> Result<Vec<HybridResult>, SimQueryError> {
        self.record("hybrid_document_search")?;
        Ok(self.script.hybrid.clone())
    }

    async fn product_recommendations(
        &mut self,
        _product_id: &str,
        _limit: u32,
    ) -> Result<Vec<RecommendationResult>, SimQueryError> {
        self.record("product_recommendations")?;
        Ok(self.script.recommendations.clone())
    }

    async fn upsert_document(&mut self, _record: &DocumentRecord) -> Result<(), SimQueryError> {
        self.record("upsert_document")
    }

    async fn upsert_product(&mut self, _record: &ProductRecord) -> Result<(), SimQueryError> {
        self.record("upsert_product")
    }

    async fn get_document(
        &mut self,
        _document_id: &str,
    ) -> Result<Option<StoredDocument>, SimQueryError> {
        self.record("get_document")?;
        Ok(None)
    }

    async fn get_product(
        &mut self,
        _product_id: &str,
    ) -> Result<Option<StoredProduct>, SimQueryError> {
        self.record("get_product")?;
        Ok(None)
    }

    async fn document_stats(&mut self) -> Result<Option<DocumentStats>, SimQueryError> {
        self.record("document_stats")?;
        Ok(self.script.document_stats.clone())
    }

    async fn product_stats(&mut self) -> Result<Option<ProductStats>, SimQueryError> {
        self.record("product_stats")?;
        Ok(self.script.product_stats.clone())
    }

    async fn close(&mut self) -> Result<(), SimQueryError> {
        self.calls.lock().unwrap().push("close".to_string());
        Ok(())
    }
}

fn hit(id: &str, similarity: f64) -> SimilarityResult {
    SimilarityResult {
        document_id: id.to_string(),
        title: format!("title {id}"),
        similarity,
        content: format!("content {id}"),
        metadata: HashMap::new(),
    }
}

async fn connected_memory() -> (SimilarityClient, MemoryConnector) {
    let connector = MemoryConnector::new();
    let mut client = SimilarityClient::new(connector.clone());
    assert!(client.connect().await);
    (client, connector)
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn starts_disconnected_and_connects() {
    let mut client = SimilarityClient::new(MemoryConnector::new());
    assert_eq!(client.state(), ConnectionState::Disconnected);

    assert!(client.connect().await);
    assert_eq!(client.state(), ConnectionState::Connected);

    client.close().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(client.last_error().is_none());
}

#[tokio::test]
async fn connect_failure_is_reported_out_of_band() {
    let mut client = SimilarityClient::new(MemoryConnector::unreachable());
    assert!(!client.connect().await);
    assert!(!client.is_connected());
    assert!(matches!(
        client.last_error(),
        Some(SimQueryError::Connection(_))
    ));
}

#[tokio::test]
async fn connecting_twice_is_a_noop() {
    let (mut client, _) = connected_memory().await;
    assert!(client.connect().await);
    assert!(client.is_connected());
}

#[tokio::test]
async fn closing_a_disconnected_client_is_harmless() {
    let mut client = SimilarityClient::new(MemoryConnector::new());
    client.close().await;
    assert!(client.try_close().await.is_ok());
}

#[tokio::test]
async fn operations_before_connect_fail_without_reaching_the_engine() {
    let connector = ScriptedConnector::new(Script::default());
    let mut client = SimilarityClient::new(connector.clone());

    let results = client.search(&SimilarityQuery::new(vec![0.1])).await;
    assert!(results.is_empty());
    assert!(matches!(client.last_error(), Some(SimQueryError::NotConnected)));

    let err = client
        .try_upsert_document(&DocumentRecord::new("d1", "T", "", vec![0.1]))
        .await
        .unwrap_err();
    assert!(err.is_connection());
    assert!(connector.calls().is_empty());
}

#[tokio::test]
async fn operations_after_close_fail_and_do_not_mutate() {
    let (mut client, connector) = connected_memory().await;
    client.close().await;

    let ok = client
        .upsert_document(&DocumentRecord::new("d1", "T", "body", vec![0.1, 0.2, 0.3]))
        .await;
    assert!(!ok);
    assert!(matches!(client.last_error(), Some(SimQueryError::NotConnected)));
    assert_eq!(connector.document_count().await, 0);

    assert!(client.get_stats().await.is_empty());
    assert!(client
        .get_recommendations("p1", 5)
        .await
        .is_empty());
}

// ---------------------------------------------------------------------------
// Degrade-to-empty policy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn engine_failure_yields_empty_and_records_error() {
    let connector = ScriptedConnector::new(Script {
        similar: vec![hit("a", 0.9)],
        fail_with: Some("relation does not exist"),
        ..Script::default()
    });
    let mut client = SimilarityClient::new(connector);
    assert!(client.connect().await);

    let results = client.search(&SimilarityQuery::new(vec![0.1])).await;
    assert!(results.is_empty());
    let err = client.last_error().expect("failure should be recorded");
    assert!(err.to_string().contains("relation does not exist"));

    let err = client
        .try_search(&SimilarityQuery::new(vec![0.1]))
        .await
        .unwrap_err();
    assert!(matches!(err, SimQueryError::Operation(_)));
}

#[tokio::test]
async fn success_clears_previous_error() {
    let (mut client, _) = connected_memory().await;
    assert!(client.search(&SimilarityQuery::new(vec![])).await.is_empty());
    assert!(matches!(client.last_error(), Some(SimQueryError::Validation(_))));

    client.search(&SimilarityQuery::new(vec![0.1])).await;
    assert!(client.last_error().is_none());
}

#[tokio::test]
async fn failed_upsert_reports_false() {
    let connector = ScriptedConnector::new(Script {
        fail_with: Some("duplicate key"),
        ..Script::default()
    });
    let mut client = SimilarityClient::new(connector);
    assert!(client.connect().await);

    let ok = client
        .upsert_product(&ProductRecord::new("p1", "Laptop", "Electronics", 10.0, vec![0.1]))
        .await;
    assert!(!ok);
    assert!(client.take_last_error().is_some());
    assert!(client.last_error().is_none());
}

// ---------------------------------------------------------------------------
// Request/response contract
// ---------------------------------------------------------------------------

#[tokio::test]
async fn engine_order_is_preserved() {
    // Deliberately out of score order: the client must not re-sort.
    let rows = vec![hit("b", 0.5), hit("a", 0.9), hit("c", 0.7)];
    let connector = ScriptedConnector::new(Script {
        similar: rows.clone(),
        ..Script::default()
    });
    let mut client = SimilarityClient::new(connector);
    assert!(client.connect().await);

    let results = client.search(&SimilarityQuery::new(vec![0.1])).await;
    assert_eq!(results, rows);
}

#[tokio::test]
async fn hybrid_scores_are_surfaced_verbatim() {
    let rows = vec![
        HybridResult {
            document_id: "d1".into(),
            title: "Vector Database Tutorial".into(),
            combined_score: 0.123,
            text_score: 0.9,
            vector_score: 0.01,
            content: "guide".into(),
        },
        HybridResult {
            document_id: "d2".into(),
            title: "Other".into(),
            combined_score: 42.0,
            text_score: -1.0,
            vector_score: 7.5,
            content: String::new(),
        },
    ];
    let connector = ScriptedConnector::new(Script {
        hybrid: rows.clone(),
        ..Script::default()
    });
    let mut client = SimilarityClient::new(connector);
    assert!(client.connect().await);

    let query = HybridQuery::new("vector", vec![0.1]).with_weights(2.0, 5.0);
    let results = client.hybrid_search(&query).await;
    assert_eq!(results, rows);
}

#[tokio::test]
async fn limit_zero_is_empty_not_an_error() {
    let connector = ScriptedConnector::new(Script {
        similar: vec![hit("a", 1.0)],
        hybrid: Vec::new(),
        ..Script::default()
    });
    let mut client = SimilarityClient::new(connector.clone());
    assert!(client.connect().await);

    let results = client
        .try_search(&SimilarityQuery::new(vec![0.1]).with_limit(0))
        .await
        .unwrap();
    assert!(results.is_empty());
    let results = client
        .try_hybrid_search(&HybridQuery::new("x", vec![0.1]).with_limit(0))
        .await
        .unwrap();
    assert!(results.is_empty());
    let results = client.try_get_recommendations("p1", 0).await.unwrap();
    assert!(results.is_empty());
    assert!(connector.calls().is_empty());
}

#[tokio::test]
async fn empty_vector_is_a_validation_error() {
    let (mut client, _) = connected_memory().await;
    let err = client
        .try_hybrid_search(&HybridQuery::new("text", Vec::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, SimQueryError::Validation(_)));
}

#[tokio::test]
async fn stats_sections_are_absent_when_views_return_no_row() {
    let connector = ScriptedConnector::new(Script {
        document_stats: None,
        product_stats: Some(ProductStats {
            total: 3,
            unique_categories: 2,
            avg_price: 12.5,
            active_products: 3,
        }),
        ..Script::default()
    });
    let mut client = SimilarityClient::new(connector);
    assert!(client.connect().await);

    let stats = client.get_stats().await;
    assert!(client.last_error().is_none());
    assert!(stats.documents.is_none());
    assert_eq!(
        stats.to_value(),
        json!({"products": {"total": 3, "unique_categories": 2, "avg_price": 12.5, "active_products": 3}})
    );
}

// ---------------------------------------------------------------------------
// Round trips against the memory engine
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upsert_then_search_finds_the_document() {
    let (mut client, _) = connected_memory().await;

    let ok = client
        .upsert_document(&DocumentRecord::new("d1", "T", "body", vec![0.1, 0.2, 0.3]))
        .await;
    assert!(ok);

    let results = client
        .search(
            &SimilarityQuery::new(vec![0.1, 0.2, 0.3])
                .with_threshold(0.0)
                .with_limit(1),
        )
        .await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].document_id, "d1");
}

#[tokio::test]
async fn fresh_upsert_reads_back_exactly() {
    let (mut client, _) = connected_memory().await;
    let mut metadata = HashMap::new();
    metadata.insert("author".to_string(), Value::String("Lam".to_string()));
    metadata.insert("tags".to_string(), json!(["a", {"nested": true}]));
    let record = DocumentRecord::new("d1", "Vector Database Tutorial", "guide", vec![0.5, 0.5])
        .with_source("tutorial")
        .with_metadata(metadata);

    assert!(client.upsert_document(&record).await);
    let stored = client.get_document("d1").await.expect("document stored");
    assert_eq!(stored.record, record);
    assert_eq!(stored.created_at, stored.updated_at);
}

#[tokio::test]
async fn reupsert_changes_fields_and_refreshes_marker() {
    let (mut client, _) = connected_memory().await;
    let first = DocumentRecord::new("d1", "Old", "old body", vec![1.0, 0.0]).with_source("import");
    assert!(client.upsert_document(&first).await);
    let before = client.get_document("d1").await.unwrap();

    let second = DocumentRecord::new("d1", "New", "new body", vec![0.0, 1.0]).with_source("api");
    assert!(client.upsert_document(&second).await);
    let after = client.get_document("d1").await.unwrap();

    assert_eq!(after.record.title, "New");
    assert_eq!(after.record.content, "new body");
    assert_eq!(after.record.embedding, vec![0.0, 1.0]);
    // source is insert-only
    assert_eq!(after.record.source, "import");
    assert_eq!(after.created_at, before.created_at);
    assert!(after.updated_at > before.updated_at);
}

#[tokio::test]
async fn identical_upsert_is_idempotent() {
    let (mut client, connector) = connected_memory().await;
    let product = ProductRecord::new("p1", "AI Laptop", "Electronics", 1599.99, vec![0.3, 0.4])
        .with_description("fast")
        .with_features(HashMap::from([("ram".to_string(), json!("32GB"))]));

    assert!(client.upsert_product(&product).await);
    let once = client.get_product("p1").await.unwrap();
    assert!(client.upsert_product(&product).await);
    let twice = client.get_product("p1").await.unwrap();

    assert_eq!(connector.product_count().await, 1);
    assert_eq!(once.product_name, twice.product_name);
    assert_eq!(once.description, twice.description);
    assert_eq!(once.price, twice.price);
    assert_eq!(once.embedding, twice.embedding);
    assert_eq!(once.features, twice.features);
    assert_eq!(once.created_at, twice.created_at);
}

#[tokio::test]
async fn search_scores_are_non_increasing() {
    let (mut client, _) = connected_memory().await;
    let vectors = [
        vec![1.0, 0.0, 0.0],
        vec![0.9, 0.1, 0.0],
        vec![0.5, 0.5, 0.0],
        vec![0.0, 1.0, 0.0],
        vec![0.0, 0.0, 1.0],
    ];
    for (i, v) in vectors.iter().enumerate() {
        let doc = DocumentRecord::new(format!("d{i}"), format!("doc {i}"), "", v.clone());
        assert!(client.upsert_document(&doc).await);
    }

    let results = client
        .search(&SimilarityQuery::new(vec![1.0, 0.0, 0.0]).with_threshold(0.0))
        .await;
    assert_eq!(results.len(), vectors.len());
    assert!(results
        .windows(2)
        .all(|pair| pair[0].similarity >= pair[1].similarity));
    assert_eq!(results[0].document_id, "d0");
}

#[tokio::test]
async fn threshold_one_without_exact_match_is_empty() {
    let (mut client, _) = connected_memory().await;
    assert!(
        client
            .upsert_document(&DocumentRecord::new("d1", "T", "", vec![0.0, 1.0]))
            .await
    );
    let results = client
        .try_search(&SimilarityQuery::new(vec![1.0, 0.2]).with_threshold(1.0))
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn dimension_mismatch_fails_without_partial_write() {
    let connector = MemoryConnector::new().with_document_dimensions(3);
    let mut client = SimilarityClient::new(connector.clone());
    assert!(client.connect().await);

    let ok = client
        .upsert_document(&DocumentRecord::new("d1", "T", "", vec![0.1, 0.2]))
        .await;
    assert!(!ok);
    assert!(matches!(client.last_error(), Some(SimQueryError::Operation(_))));
    assert_eq!(connector.document_count().await, 0);
}

#[tokio::test]
async fn data_survives_reconnect() {
    let (mut client, _) = connected_memory().await;
    assert!(
        client
            .upsert_product(&ProductRecord::new("p1", "Mouse", "Electronics", 20.0, vec![1.0, 0.0]))
            .await
    );
    assert!(
        client
            .upsert_product(&ProductRecord::new("p2", "Keyboard", "Electronics", 40.0, vec![0.9, 0.1]))
            .await
    );
    client.close().await;
    assert!(client.connect().await);

    let recs = client.get_recommendations("p1", 5).await;
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].product_id, "p2");
    assert_eq!(recs[0].price, Some(40.0));

    let stats = client.get_stats().await;
    let products = stats.products.unwrap();
    assert_eq!(products.total, 2);
    assert_eq!(products.avg_price, 30.0);
}
