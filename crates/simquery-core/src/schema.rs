//! Column contracts shared by the client and the engine.
//!
//! Rows are decoded by column name. Before decoding, an engine checks the
//! columns it actually received against the routine's [`RoutineSchema`] so
//! that a reordered, added, or dropped column fails loudly instead of
//! landing in the wrong field.

use crate::SimQueryError;

/// The ordered column list a routine or view is expected to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutineSchema {
    pub routine: &'static str,
    pub columns: &'static [&'static str],
}

impl RoutineSchema {
    pub const fn new(routine: &'static str, columns: &'static [&'static str]) -> Self {
        Self { routine, columns }
    }

    /// Verify that `found` matches this schema exactly: same count, same
    /// names, same order.
    pub fn check<S: AsRef<str>>(&self, found: &[S]) -> Result<(), SimQueryError> {
        let matches = found.len() == self.columns.len()
            && found
                .iter()
                .zip(self.columns)
                .all(|(actual, expected)| actual.as_ref() == *expected);
        if matches {
            return Ok(());
        }
        Err(SimQueryError::Schema {
            routine: self.routine,
            expected: self.columns.iter().map(|c| c.to_string()).collect(),
            found: found.iter().map(|c| c.as_ref().to_string()).collect(),
        })
    }

    /// Position of a named column.
    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| *c == column)
    }
}

pub const SIMILAR_DOCUMENTS: RoutineSchema = RoutineSchema::new(
    "search_similar_documents",
    &["document_id", "title", "similarity", "content", "metadata"],
);

pub const HYBRID_DOCUMENTS: RoutineSchema = RoutineSchema::new(
    "hybrid_document_search",
    &[
        "document_id",
        "title",
        "combined_score",
        "text_score",
        "vector_score",
        "content",
    ],
);

pub const PRODUCT_RECOMMENDATIONS: RoutineSchema = RoutineSchema::new(
    "get_product_recommendations",
    &["product_id", "product_name", "similarity", "category", "price"],
);

pub const DOCUMENT_STATS: RoutineSchema = RoutineSchema::new(
    "document_stats",
    &[
        "total_documents",
        "unique_sources",
        "avg_embedding_dims",
        "first_document",
        "latest_document",
    ],
);

pub const PRODUCT_STATS: RoutineSchema = RoutineSchema::new(
    "product_stats",
    &[
        "total_products",
        "unique_categories",
        "avg_price",
        "active_products",
    ],
);

pub const STORED_DOCUMENT: RoutineSchema = RoutineSchema::new(
    "document_embeddings",
    &[
        "document_id",
        "title",
        "content",
        "embedding",
        "source",
        "metadata",
        "created_at",
        "updated_at",
    ],
);

pub const STORED_PRODUCT: RoutineSchema = RoutineSchema::new(
    "product_embeddings",
    &[
        "product_id",
        "product_name",
        "description",
        "category",
        "price",
        "embedding",
        "features",
        "created_at",
        "updated_at",
    ],
);

/// Validate that a schema or table name is safe to interpolate into SQL.
///
/// Allows ASCII alphanumerics and underscores; must not start with a digit.
pub fn validate_identifier(name: &str) -> Result<(), SimQueryError> {
    if name.is_empty() {
        return Err(SimQueryError::Config(
            "identifier must not be empty".to_string(),
        ));
    }
    let valid_chars = name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    let starts_ok = !name.starts_with(|c: char| c.is_ascii_digit());
    if !valid_chars || !starts_ok {
        return Err(SimQueryError::Config(format!(
            "invalid identifier '{name}': only alphanumeric and underscore characters are allowed",
        )));
    }
    Ok(())
}
