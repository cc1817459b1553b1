use std::collections::HashMap;

use serde_json::json;
use simquery::core::{DocumentRecord, HybridQuery, ProductRecord, SimilarityQuery};
use simquery::memory::MemoryConnector;
use simquery::pgvector::{PgConfig, PgConnector};
use simquery::SimilarityClient;

const DOCUMENT_DIMS: usize = 1536;
const PRODUCT_DIMS: usize = 384;

/// Build the client from the environment. This is the only place that
/// reads configuration from env vars.
///
/// `SIMQUERY_BACKEND=memory` runs the demo without a database.
fn client_from_env() -> SimilarityClient {
    if std::env::var("SIMQUERY_BACKEND").as_deref() == Ok("memory") {
        return SimilarityClient::new(
            MemoryConnector::new()
                .with_document_dimensions(DOCUMENT_DIMS)
                .with_product_dimensions(PRODUCT_DIMS),
        );
    }

    let mut config = PgConfig::new();
    if let Ok(host) = std::env::var("POSTGRES_HOST") {
        config = config.with_host(host);
    }
    if let Some(port) = std::env::var("POSTGRES_PORT").ok().and_then(|raw| parse_port(&raw)) {
        config = config.with_port(port);
    }
    if let Ok(database) = std::env::var("POSTGRES_DB") {
        config = config.with_database(database);
    }
    if let Ok(user) = std::env::var("POSTGRES_USER") {
        config = config.with_user(user);
    }
    if let Ok(password) = std::env::var("POSTGRES_PASSWORD") {
        config = config.with_password(password);
    }
    SimilarityClient::new(PgConnector::new(config))
}

/// Parse `POSTGRES_PORT`, warning when it is set but unusable so the
/// fallback to the default port is visible.
fn parse_port(raw: &str) -> Option<u16> {
    match raw.trim().parse() {
        Ok(port) => Some(port),
        Err(e) => {
            tracing::warn!(
                value = raw,
                default = PgConfig::DEFAULT_PORT,
                error = %e,
                "ignoring invalid POSTGRES_PORT"
            );
            None
        }
    }
}

/// Stand-in for a real embedding model: a deterministic unit vector
/// derived from `seed`.
fn fake_embedding(seed: &str, dims: usize) -> Vec<f32> {
    let mut state = seed
        .bytes()
        .fold(0x9e37_79b9_u32, |acc, b| acc.rotate_left(5) ^ u32::from(b));
    let mut vec: Vec<f32> = (0..dims)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state % 10_000) as f32 / 10_000.0
        })
        .collect();
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vec {
            *v /= norm;
        }
    }
    vec
}

async fn run(client: &mut SimilarityClient) {
    println!("\n=== Insert document embedding ===");
    let document = DocumentRecord::new(
        "demo_doc_001",
        "Vector Database Tutorial",
        "This is a comprehensive guide to using vector databases for AI applications.",
        fake_embedding("demo_doc_001", DOCUMENT_DIMS),
    )
    .with_source("tutorial")
    .with_metadata(HashMap::from([
        ("author".to_string(), json!("Lam Van Truyen")),
        ("category".to_string(), json!("technical")),
    ]));
    println!("upserted: {}", client.upsert_document(&document).await);

    println!("\n=== Search similar documents ===");
    let query = SimilarityQuery::new(fake_embedding("query", DOCUMENT_DIMS))
        .with_threshold(0.0)
        .with_limit(3);
    for hit in client.search(&query).await {
        println!("  {} (similarity: {:.3})", hit.title, hit.similarity);
    }
    if let Some(error) = client.last_error() {
        println!("  search failed: {error}");
    }

    println!("\n=== Hybrid search ===");
    let query = HybridQuery::new("vector databases", fake_embedding("query", DOCUMENT_DIMS))
        .with_limit(3);
    for hit in client.hybrid_search(&query).await {
        println!(
            "  {} (combined: {:.3}, text: {:.3}, vector: {:.3})",
            hit.title, hit.combined_score, hit.text_score, hit.vector_score
        );
    }

    println!("\n=== Insert product embedding ===");
    let product = ProductRecord::new(
        "demo_prod_001",
        "AI-Powered Laptop",
        "Electronics",
        1599.99,
        fake_embedding("demo_prod_001", PRODUCT_DIMS),
    )
    .with_description("High-performance laptop optimized for AI and machine learning workloads")
    .with_features(HashMap::from([
        ("ram".to_string(), json!("32GB")),
        ("gpu".to_string(), json!("RTX 4080")),
        ("cpu".to_string(), json!("Intel i9")),
    ]));
    println!("upserted: {}", client.upsert_product(&product).await);

    println!("\n=== Recommendations ===");
    for rec in client.get_recommendations("demo_prod_001", 5).await {
        println!("  {} [{}] (similarity: {:.3})", rec.product_name, rec.category, rec.similarity);
    }

    println!("\n=== Statistics ===");
    let stats = client.get_stats().await;
    println!(
        "  documents: {}",
        stats.documents.as_ref().map_or(0, |d| d.total)
    );
    println!(
        "  products: {}",
        stats.products.as_ref().map_or(0, |p| p.total)
    );
    println!("  raw: {}", stats.to_value());
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    println!("=== simquery vector database demo ===");
    let mut client = client_from_env();
    if !client.connect().await {
        if let Some(error) = client.last_error() {
            eprintln!("connection failed: {error}");
        }
        return;
    }

    run(&mut client).await;

    client.close().await;
    tracing::info!("demo finished");
}
