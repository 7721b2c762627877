//! SQL text for the PostgreSQL provider
//!
//! Every statement the provider sends is built here. Identifiers are
//! checked against the collection/field name patterns and then quoted;
//! values always travel as bind parameters.

use vecstore_core::validator::{is_valid_collection_name, is_valid_field_name};
use vecstore_core::{
    CollectionConfig, DatabaseConfig, DistanceType, IndexType, Result, SearchOptions, VectorError,
};

/// Name of the table registering every collection of a schema
pub const METADATA_TABLE: &str = "vector_collections";

pub const CREATE_EXTENSION: &str = "CREATE EXTENSION IF NOT EXISTS vector";

pub const CHECK_EXTENSION: &str =
    "SELECT EXISTS (SELECT 1 FROM pg_extension WHERE extname = 'vector')";

/// ANN index build parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexTuning {
    pub ivfflat_lists: u32,
    pub hnsw_m: u32,
    pub hnsw_ef_construction: u32,
}

impl Default for IndexTuning {
    fn default() -> Self {
        Self::from(&DatabaseConfig::default())
    }
}

impl From<&DatabaseConfig> for IndexTuning {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            ivfflat_lists: config.ivfflat_lists,
            hnsw_m: config.hnsw_m,
            hnsw_ef_construction: config.hnsw_ef_construction,
        }
    }
}

// ============================================================================
// Identifiers and literals
// ============================================================================

/// Double-quote an identifier
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `"schema"."table"`
pub fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// Longest identifier PostgreSQL keeps without truncation
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Reject a schema or collection name that does not match the name pattern
/// or would be truncated by the server
pub fn check_identifier(name: &str) -> Result<()> {
    if is_valid_collection_name(name) && name.len() <= MAX_IDENTIFIER_LEN {
        Ok(())
    } else {
        Err(VectorError::invalid_config(format!(
            "invalid identifier: {name}"
        )))
    }
}

fn check_field(name: &str) -> Result<()> {
    if is_valid_field_name(name) {
        Ok(())
    } else {
        Err(VectorError::invalid_config(format!(
            "invalid field name format: {name}"
        )))
    }
}

/// `metadata -> 'field'`; the field name must already match the field pattern
fn metadata_path(field: &str) -> String {
    format!("metadata -> '{field}'")
}

/// pgvector text form, e.g. `[0.1,0.2,0.3]`
pub fn format_vector(vector: &[f32]) -> String {
    let parts: Vec<String> = vector.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(","))
}

/// Parse the pgvector text form back into components
pub fn parse_vector(s: &str) -> std::result::Result<Vec<f32>, String> {
    let s = s.trim();
    let inner = s
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| format!("invalid pgvector format: {s}"))?;

    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    inner
        .split(',')
        .map(|v| v.trim().parse::<f32>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| format!("failed to parse pgvector values: {e}"))
}

// ============================================================================
// Operators
// ============================================================================

/// pgvector operator class matching the distance metric
pub fn operator_class(distance: DistanceType) -> &'static str {
    match distance {
        DistanceType::Cosine => "vector_cosine_ops",
        DistanceType::Euclidean => "vector_l2_ops",
        DistanceType::DotProduct => "vector_ip_ops",
    }
}

/// pgvector distance operator matching the distance metric
pub fn distance_operator(distance: DistanceType) -> &'static str {
    match distance {
        DistanceType::Cosine => "<=>",
        DistanceType::Euclidean => "<->",
        DistanceType::DotProduct => "<#>",
    }
}

// ============================================================================
// Setup DDL
// ============================================================================

pub fn create_schema(schema: &str) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema))
}

pub fn create_metadata_table(schema: &str) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            name TEXT PRIMARY KEY,
            schema_name TEXT NOT NULL,
            dimension INTEGER NOT NULL,
            index_type TEXT NOT NULL,
            distance_type TEXT NOT NULL,
            custom_fields JSONB,
            created_at TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP
        )
        "#,
        qualified(schema, METADATA_TABLE)
    )
}

// ============================================================================
// Collection DDL
// ============================================================================

pub fn create_collection_table(schema: &str, config: &CollectionConfig) -> String {
    format!(
        r#"
        CREATE TABLE {} (
            id TEXT PRIMARY KEY,
            vector vector({}) NOT NULL,
            content TEXT NOT NULL DEFAULT '',
            metadata JSONB NOT NULL DEFAULT '{{}}',
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
        qualified(schema, &config.name),
        config.dimension
    )
}

/// Similarity index over the vector column; `None` for a flat collection
pub fn build_index_query(
    schema: &str,
    config: &CollectionConfig,
    tuning: &IndexTuning,
) -> Option<String> {
    let (method, params) = match config.index_type {
        IndexType::Flat => return None,
        IndexType::IvfFlat => ("ivfflat", format!("lists = {}", tuning.ivfflat_lists)),
        IndexType::Hnsw => (
            "hnsw",
            format!(
                "m = {}, ef_construction = {}",
                tuning.hnsw_m, tuning.hnsw_ef_construction
            ),
        ),
    };

    Some(format!(
        "CREATE INDEX ON {} USING {} (vector {}) WITH ({})",
        qualified(schema, &config.name),
        method,
        operator_class(config.distance_type),
        params
    ))
}

/// One btree expression index per field declared `indexed`
pub fn build_field_index_queries(schema: &str, config: &CollectionConfig) -> Vec<String> {
    config
        .custom_fields
        .iter()
        .filter(|(_, field)| field.indexed)
        .map(|(name, _)| {
            format!(
                "CREATE INDEX ON {} (({}))",
                qualified(schema, &config.name),
                metadata_path(name)
            )
        })
        .collect()
}

pub fn drop_collection_table(schema: &str, name: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", qualified(schema, name))
}

// ============================================================================
// Collection registry
// ============================================================================

pub fn insert_collection(schema: &str) -> String {
    format!(
        r#"
        INSERT INTO {} (name, schema_name, dimension, index_type, distance_type, custom_fields)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
        qualified(schema, METADATA_TABLE)
    )
}

pub fn select_collection(schema: &str) -> String {
    format!(
        r#"
        SELECT name, dimension, index_type, distance_type, custom_fields
        FROM {}
        WHERE name = $1
        "#,
        qualified(schema, METADATA_TABLE)
    )
}

pub fn list_collections(schema: &str) -> String {
    format!(
        "SELECT name FROM {} WHERE schema_name = $1 ORDER BY name",
        qualified(schema, METADATA_TABLE)
    )
}

pub fn delete_collection(schema: &str) -> String {
    format!(
        "DELETE FROM {} WHERE name = $1",
        qualified(schema, METADATA_TABLE)
    )
}

// ============================================================================
// Documents
// ============================================================================

/// Insert or replace by id, keeping the stored `created_at`
pub fn upsert_document(schema: &str, collection: &str) -> String {
    format!(
        r#"
        INSERT INTO {} (id, vector, content, metadata, created_at, updated_at)
        VALUES ($1, $2::vector, $3, $4, $5, $6)
        ON CONFLICT (id) DO UPDATE SET
            vector = EXCLUDED.vector,
            content = EXCLUDED.content,
            metadata = EXCLUDED.metadata,
            updated_at = EXCLUDED.updated_at
        RETURNING created_at
        "#,
        qualified(schema, collection)
    )
}

pub fn select_document(schema: &str, collection: &str) -> String {
    format!(
        r#"
        SELECT id, vector::text AS vector_text, content, metadata, created_at, updated_at
        FROM {}
        WHERE id = $1
        "#,
        qualified(schema, collection)
    )
}

pub fn delete_document(schema: &str, collection: &str) -> String {
    format!("DELETE FROM {} WHERE id = $1", qualified(schema, collection))
}

/// Ranked similarity query.
///
/// Parameters: `$1` is the query vector, then one JSON value per filter
/// entry in key order, then limit and offset.
pub fn build_search_query(
    schema: &str,
    collection: &str,
    distance: DistanceType,
    opts: &SearchOptions,
) -> Result<String> {
    let mut columns = vec!["id", "content", "metadata", "created_at", "updated_at"];
    if opts.include_vectors {
        columns.push("vector::text AS vector_text");
    }

    let mut clauses = Vec::with_capacity(opts.filter.len());
    for (i, field) in opts.filter.keys().enumerate() {
        check_field(field)?;
        clauses.push(format!("{} = ${}::jsonb", metadata_path(field), i + 2));
    }

    let mut query = format!(
        "SELECT {}, vector {} $1::vector AS distance FROM {}",
        columns.join(", "),
        distance_operator(distance),
        qualified(schema, collection)
    );
    if !clauses.is_empty() {
        query.push_str(" WHERE ");
        query.push_str(&clauses.join(" AND "));
    }

    let limit_param = opts.filter.len() + 2;
    query.push_str(&format!(
        " ORDER BY distance ASC LIMIT ${} OFFSET ${}",
        limit_param,
        limit_param + 1
    ));

    Ok(query)
}
