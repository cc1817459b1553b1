use async_trait::async_trait;
use pgvector::Vector;
use simquery_core::schema::{
    self, DOCUMENT_STATS, HYBRID_DOCUMENTS, PRODUCT_RECOMMENDATIONS, PRODUCT_STATS,
    SIMILAR_DOCUMENTS, STORED_DOCUMENT, STORED_PRODUCT,
};
use simquery_core::{
    Connector, DocumentRecord, DocumentStats, HybridQuery, HybridResult, ProductRecord,
    ProductStats, RecommendationResult, SimQueryError, SimilarityQuery, SimilarityResult,
    StoredDocument, StoredProduct, VectorEngine,
};
use sqlx::postgres::{PgConnection, PgQueryResult};
use sqlx::{Connection, Postgres, Transaction};

use crate::config::PgConfig;
use crate::decode::{
    check_row, check_rows, get, get_count, get_embedding, get_metadata, get_optional_score,
    get_optional_timestamp, get_score, get_text, get_timestamp,
};

// ---------------------------------------------------------------------------
// PgConnector
// ---------------------------------------------------------------------------

/// Opens [`PgEngine`] sessions with the settings of a [`PgConfig`].
#[derive(Debug, Clone)]
pub struct PgConnector {
    config: PgConfig,
}

impl PgConnector {
    pub fn new(config: PgConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PgConfig {
        &self.config
    }
}

#[async_trait]
impl Connector for PgConnector {
    async fn connect(&self) -> Result<Box<dyn VectorEngine>, SimQueryError> {
        self.config.validate()?;
        let conn = PgConnection::connect_with(&self.config.connect_options())
            .await
            .map_err(|e| {
                SimQueryError::Connection(format!(
                    "failed to connect to {}: {e}",
                    self.config.endpoint()
                ))
            })?;
        Ok(Box::new(PgEngine::new(conn, &self.config.schema)?))
    }

    fn endpoint(&self) -> String {
        self.config.endpoint()
    }
}

// ---------------------------------------------------------------------------
// SQL
// ---------------------------------------------------------------------------

/// Statement texts with the schema name interpolated once, after
/// validation.
#[derive(Debug, Clone)]
struct Statements {
    search: String,
    hybrid: String,
    recommendations: String,
    document_stats: String,
    product_stats: String,
    upsert_document: String,
    upsert_product: String,
    get_document: String,
    get_product: String,
}

impl Statements {
    fn new(schema_name: &str) -> Result<Self, SimQueryError> {
        schema::validate_identifier(schema_name)?;
        let s = schema_name;
        Ok(Self {
            search: format!("SELECT * FROM {s}.search_similar_documents($1::vector, $2, $3)"),
            hybrid: format!("SELECT * FROM {s}.hybrid_document_search($1, $2::vector, $3, $4, $5)"),
            recommendations: format!("SELECT * FROM {s}.get_product_recommendations($1, $2)"),
            document_stats: format!("SELECT * FROM {s}.document_stats"),
            product_stats: format!("SELECT * FROM {s}.product_stats"),
            upsert_document: format!(
                r#"INSERT INTO {s}.document_embeddings
                       (document_id, title, content, embedding, source, metadata)
                   VALUES ($1, $2, $3, $4::vector, $5, $6)
                   ON CONFLICT (document_id) DO UPDATE SET
                       title = EXCLUDED.title,
                       content = EXCLUDED.content,
                       embedding = EXCLUDED.embedding,
                       metadata = EXCLUDED.metadata,
                       updated_at = CURRENT_TIMESTAMP"#
            ),
            upsert_product: format!(
                r#"INSERT INTO {s}.product_embeddings
                       (product_id, product_name, description, category, price, embedding, features)
                   VALUES ($1, $2, $3, $4, $5, $6::vector, $7)
                   ON CONFLICT (product_id) DO UPDATE SET
                       product_name = EXCLUDED.product_name,
                       description = EXCLUDED.description,
                       category = EXCLUDED.category,
                       price = EXCLUDED.price,
                       embedding = EXCLUDED.embedding,
                       features = EXCLUDED.features,
                       updated_at = CURRENT_TIMESTAMP"#
            ),
            get_document: format!(
                r#"SELECT document_id, title, content, embedding, source, metadata,
                          created_at, updated_at
                   FROM {s}.document_embeddings
                   WHERE document_id = $1"#
            ),
            get_product: format!(
                r#"SELECT product_id, product_name, description, category,
                          price, embedding, features,
                          created_at, updated_at
                   FROM {s}.product_embeddings
                   WHERE product_id = $1"#
            ),
        })
    }
}

// ---------------------------------------------------------------------------
// PgEngine
// ---------------------------------------------------------------------------

/// One PostgreSQL session. Owns its connection exclusively; every call
/// runs to completion, including commit or rollback, before returning.
pub struct PgEngine {
    conn: Option<PgConnection>,
    sql: Statements,
}

impl PgEngine {
    /// Wrap an open connection. `schema_name` must be a plain identifier.
    pub fn new(conn: PgConnection, schema_name: &str) -> Result<Self, SimQueryError> {
        Ok(Self {
            conn: Some(conn),
            sql: Statements::new(schema_name)?,
        })
    }
}

fn conn(slot: &mut Option<PgConnection>) -> Result<&mut PgConnection, SimQueryError> {
    slot.as_mut().ok_or(SimQueryError::NotConnected)
}

fn to_int(name: &str, value: u32) -> Result<i32, SimQueryError> {
    i32::try_from(value)
        .map_err(|_| SimQueryError::Validation(format!("{name} {value} exceeds INTEGER range")))
}

fn operation(context: &'static str) -> impl Fn(sqlx::Error) -> SimQueryError {
    move |e| SimQueryError::Operation(format!("{context}: {e}"))
}

/// Commit on success, roll back everything on failure.
async fn finish(
    tx: Transaction<'_, Postgres>,
    result: Result<PgQueryResult, sqlx::Error>,
    context: &'static str,
) -> Result<(), SimQueryError> {
    match result {
        Ok(_) => tx.commit().await.map_err(operation(context)),
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(error = %rollback, "{context}: rollback failed");
            }
            Err(SimQueryError::Operation(format!("{context}: {e}")))
        }
    }
}

#[async_trait]
impl VectorEngine for PgEngine {
    async fn search_similar_documents(
        &mut self,
        query: &SimilarityQuery,
    ) -> Result<Vec<SimilarityResult>, SimQueryError> {
        let limit = to_int("limit", query.limit())?;
        let rows = sqlx::query(&self.sql.search)
            .bind(Vector::from(query.vector().to_vec()))
            .bind(query.threshold())
            .bind(limit)
            .fetch_all(conn(&mut self.conn)?)
            .await
            .map_err(operation("similarity search failed"))?;

        let s = &SIMILAR_DOCUMENTS;
        check_rows(s, &rows)?;
        rows.iter()
            .map(|row| -> Result<SimilarityResult, SimQueryError> {
                Ok(SimilarityResult {
                    document_id: get(row, s, "document_id")?,
                    title: get_text(row, s, "title")?,
                    similarity: get_score(row, s, "similarity")?,
                    content: get_text(row, s, "content")?,
                    metadata: get_metadata(row, s, "metadata")?,
                })
            })
            .collect()
    }

    async fn hybrid_document_search(
        &mut self,
        query: &HybridQuery,
    ) -> Result<Vec<HybridResult>, SimQueryError> {
        let limit = to_int("limit", query.limit())?;
        let rows = sqlx::query(&self.sql.hybrid)
            .bind(query.text())
            .bind(Vector::from(query.vector().to_vec()))
            .bind(query.text_weight())
            .bind(query.vector_weight())
            .bind(limit)
            .fetch_all(conn(&mut self.conn)?)
            .await
            .map_err(operation("hybrid search failed"))?;

        let s = &HYBRID_DOCUMENTS;
        check_rows(s, &rows)?;
        rows.iter()
            .map(|row| -> Result<HybridResult, SimQueryError> {
                Ok(HybridResult {
                    document_id: get(row, s, "document_id")?,
                    title: get_text(row, s, "title")?,
                    combined_score: get_score(row, s, "combined_score")?,
                    text_score: get_score(row, s, "text_score")?,
                    vector_score: get_score(row, s, "vector_score")?,
                    content: get_text(row, s, "content")?,
                })
            })
            .collect()
    }

    async fn product_recommendations(
        &mut self,
        product_id: &str,
        limit: u32,
    ) -> Result<Vec<RecommendationResult>, SimQueryError> {
        let limit = to_int("limit", limit)?;
        let rows = sqlx::query(&self.sql.recommendations)
            .bind(product_id)
            .bind(limit)
            .fetch_all(conn(&mut self.conn)?)
            .await
            .map_err(operation("recommendation failed"))?;

        let s = &PRODUCT_RECOMMENDATIONS;
        check_rows(s, &rows)?;
        rows.iter()
            .map(|row| -> Result<RecommendationResult, SimQueryError> {
                Ok(RecommendationResult {
                    product_id: get(row, s, "product_id")?,
                    product_name: get_text(row, s, "product_name")?,
                    similarity: get_score(row, s, "similarity")?,
                    category: get_text(row, s, "category")?,
                    price: get_optional_score(row, s, "price")?,
                })
            })
            .collect()
    }

    async fn upsert_document(&mut self, record: &DocumentRecord) -> Result<(), SimQueryError> {
        let metadata = serde_json::to_value(&record.metadata).map_err(|e| {
            SimQueryError::Validation(format!("failed to serialize metadata: {e}"))
        })?;
        let embedding = Vector::from(record.embedding.clone());

        let mut tx = conn(&mut self.conn)?
            .begin()
            .await
            .map_err(operation("failed to begin transaction"))?;
        let result = sqlx::query(&self.sql.upsert_document)
            .bind(&record.document_id)
            .bind(&record.title)
            .bind(&record.content)
            .bind(&embedding)
            .bind(&record.source)
            .bind(&metadata)
            .execute(&mut *tx)
            .await;
        finish(tx, result, "document upsert failed").await
    }

    async fn upsert_product(&mut self, record: &ProductRecord) -> Result<(), SimQueryError> {
        let features = serde_json::to_value(&record.features).map_err(|e| {
            SimQueryError::Validation(format!("failed to serialize features: {e}"))
        })?;
        let embedding = Vector::from(record.embedding.clone());

        let mut tx = conn(&mut self.conn)?
            .begin()
            .await
            .map_err(operation("failed to begin transaction"))?;
        let result = sqlx::query(&self.sql.upsert_product)
            .bind(&record.product_id)
            .bind(&record.product_name)
            .bind(&record.description)
            .bind(&record.category)
            .bind(record.price)
            .bind(&embedding)
            .bind(&features)
            .execute(&mut *tx)
            .await;
        finish(tx, result, "product upsert failed").await
    }

    async fn get_document(
        &mut self,
        document_id: &str,
    ) -> Result<Option<StoredDocument>, SimQueryError> {
        let row = sqlx::query(&self.sql.get_document)
            .bind(document_id)
            .fetch_optional(conn(&mut self.conn)?)
            .await
            .map_err(operation("document lookup failed"))?;
        let Some(row) = row else {
            return Ok(None);
        };

        let s = &STORED_DOCUMENT;
        check_row(s, &row)?;
        Ok(Some(StoredDocument {
            record: DocumentRecord {
                document_id: get(&row, s, "document_id")?,
                title: get_text(&row, s, "title")?,
                content: get_text(&row, s, "content")?,
                embedding: get_embedding(&row, s, "embedding")?,
                source: get_text(&row, s, "source")?,
                metadata: get_metadata(&row, s, "metadata")?,
            },
            created_at: get_timestamp(&row, s, "created_at")?,
            updated_at: get_timestamp(&row, s, "updated_at")?,
        }))
    }

    async fn get_product(
        &mut self,
        product_id: &str,
    ) -> Result<Option<StoredProduct>, SimQueryError> {
        let row = sqlx::query(&self.sql.get_product)
            .bind(product_id)
            .fetch_optional(conn(&mut self.conn)?)
            .await
            .map_err(operation("product lookup failed"))?;
        let Some(row) = row else {
            return Ok(None);
        };

        let s = &STORED_PRODUCT;
        check_row(s, &row)?;
        Ok(Some(StoredProduct {
            product_id: get(&row, s, "product_id")?,
            product_name: get_text(&row, s, "product_name")?,
            description: get_text(&row, s, "description")?,
            category: get_text(&row, s, "category")?,
            price: get_optional_score(&row, s, "price")?,
            embedding: get_embedding(&row, s, "embedding")?,
            features: get_metadata(&row, s, "features")?,
            created_at: get_timestamp(&row, s, "created_at")?,
            updated_at: get_timestamp(&row, s, "updated_at")?,
        }))
    }

    async fn document_stats(&mut self) -> Result<Option<DocumentStats>, SimQueryError> {
        let row = sqlx::query(&self.sql.document_stats)
            .fetch_optional(conn(&mut self.conn)?)
            .await
            .map_err(operation("document stats failed"))?;
        let Some(row) = row else {
            return Ok(None);
        };

        let s = &DOCUMENT_STATS;
        check_row(s, &row)?;
        Ok(Some(DocumentStats {
            total: get_count(&row, s, "total_documents")?,
            unique_sources: get_count(&row, s, "unique_sources")?,
            avg_embedding_dims: get_optional_score(&row, s, "avg_embedding_dims")?,
            first_document: get_optional_timestamp(&row, s, "first_document")?,
            latest_document: get_optional_timestamp(&row, s, "latest_document")?,
        }))
    }

    async fn product_stats(&mut self) -> Result<Option<ProductStats>, SimQueryError> {
        let row = sqlx::query(&self.sql.product_stats)
            .fetch_optional(conn(&mut self.conn)?)
            .await
            .map_err(operation("product stats failed"))?;
        let Some(row) = row else {
            return Ok(None);
        };

        let s = &PRODUCT_STATS;
        check_row(s, &row)?;
        Ok(Some(ProductStats {
            total: get_count(&row, s, "total_products")?,
            unique_categories: get_count(&row, s, "unique_categories")?,
            avg_price: get_optional_score(&row, s, "avg_price")?.unwrap_or(0.0),
            active_products: get_count(&row, s, "active_products")?,
        }))
    }

    async fn close(&mut self) -> Result<(), SimQueryError> {
        if let Some(conn) = self.conn.take() {
            conn.close()
                .await
                .map_err(operation("failed to close connection"))?;
        }
        Ok(())
    }
}
