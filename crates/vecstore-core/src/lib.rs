//! vecstore Core - Domain models, validation and the storage provider contract
//!
//! This crate defines the abstractions shared by every vecstore backend:
//! - Document and collection schema models
//! - The error taxonomy with stable numeric codes
//! - Schema validation applied before any write
//! - The `StorageProvider` trait and the `VectorStorage` facade
//! - An in-memory provider for tests and small embedded data sets
//! - Configuration management

pub mod config;
pub mod memory;
pub mod provider;
pub mod storage;
pub mod validator;

pub use config::{AppConfig, ConfigError, DatabaseConfig, LoggingConfig};
pub use memory::MemoryProvider;
pub use provider::StorageProvider;
pub use storage::VectorStorage;
pub use validator::Validator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Boxed cause carried by backend-originated errors
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Stable numeric error codes.
///
/// The numbers borrow HTTP status values for familiarity only; they are
/// identifiers, not transport semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    DocumentNotFound,
    InvalidDimension,
    InvalidConfig,
    CollectionExists,
    CollectionNotFound,
    InvalidVector,
    ConnectionFailed,
    OperationFailed,
}

impl ErrorCode {
    /// Numeric value of the code
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::DocumentNotFound => 404,
            Self::InvalidDimension => 400,
            Self::InvalidConfig => 422,
            Self::CollectionExists => 409,
            Self::CollectionNotFound => 410,
            Self::InvalidVector => 415,
            Self::ConnectionFailed => 503,
            Self::OperationFailed => 500,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// Errors produced by validation and storage providers
#[derive(Error, Debug)]
pub enum VectorError {
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("invalid dimension: {0}")]
    InvalidDimension(String),

    #[error("invalid config: {message}")]
    InvalidConfig {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("collection already exists: {0}")]
    CollectionExists(String),

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("invalid vector: {message}")]
    InvalidVector {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("operation failed: {message}")]
    OperationFailed {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl VectorError {
    /// Stable code of this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::DocumentNotFound(_) => ErrorCode::DocumentNotFound,
            Self::InvalidDimension(_) => ErrorCode::InvalidDimension,
            Self::InvalidConfig { .. } => ErrorCode::InvalidConfig,
            Self::CollectionExists(_) => ErrorCode::CollectionExists,
            Self::CollectionNotFound(_) => ErrorCode::CollectionNotFound,
            Self::InvalidVector { .. } => ErrorCode::InvalidVector,
            Self::ConnectionFailed { .. } => ErrorCode::ConnectionFailed,
            Self::OperationFailed { .. } => ErrorCode::OperationFailed,
        }
    }

    /// Whether a collection or document lookup came up empty
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::DocumentNotFound(_) | Self::CollectionNotFound(_)
        )
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
            source: None,
        }
    }

    pub fn invalid_vector(message: impl Into<String>) -> Self {
        Self::InvalidVector {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap a backend error that prevented reaching the store
    pub fn connection_failed(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Wrap a backend error raised by a well-formed request
    pub fn operation_failed(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::OperationFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

pub type Result<T> = std::result::Result<T, VectorError>;

/// A metadata value whose variant does not match the declared field type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("expected {expected}, got {actual}")]
pub struct TypeMismatch {
    pub expected: FieldType,
    pub actual: &'static str,
}

// ============================================================================
// Metadata Values
// ============================================================================

/// A typed custom-field value.
///
/// Stored as plain JSON: datetimes become RFC 3339 strings, so reading a
/// value back without its schema yields `String`. Use
/// [`VectorDocument::coerce_metadata`] to restore schema types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "serde_json::Value")]
pub enum MetadataValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(DateTime<Utc>),
    Array(Vec<MetadataValue>),
}

impl MetadataValue {
    /// Name of the variant, used in type mismatch messages
    pub fn kind(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::DateTime(_) => "datetime",
            Self::Array(_) => "array",
        }
    }

    /// Check this value against a declared field type
    pub fn check_type(&self, expected: FieldType) -> std::result::Result<(), TypeMismatch> {
        let ok = matches!(
            (expected, self),
            (FieldType::String, Self::String(_))
                | (FieldType::Int, Self::Int(_))
                | (FieldType::Float, Self::Float(_))
                | (FieldType::Bool, Self::Bool(_))
                | (FieldType::DateTime, Self::DateTime(_))
                | (FieldType::Array, Self::Array(_))
        );

        if ok {
            Ok(())
        } else {
            Err(TypeMismatch {
                expected,
                actual: self.kind(),
            })
        }
    }

    /// Convert a JSON-decoded value towards a declared field type.
    ///
    /// Only lossless conversions are applied: integers to floats and
    /// RFC 3339 strings to datetimes. Anything else is returned unchanged
    /// and left for the validator to reject.
    pub fn coerce(self, target: FieldType) -> Self {
        match (target, self) {
            (FieldType::Float, Self::Int(i)) => Self::Float(i as f64),
            (FieldType::DateTime, Self::String(s)) => match DateTime::parse_from_rfc3339(&s) {
                Ok(dt) => Self::DateTime(dt.with_timezone(&Utc)),
                Err(_) => Self::String(s),
            },
            (_, value) => value,
        }
    }

    /// JSON representation used for storage and filtering
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::from(self.clone())
    }
}

impl From<MetadataValue> for serde_json::Value {
    fn from(value: MetadataValue) -> Self {
        match value {
            MetadataValue::String(s) => serde_json::Value::String(s),
            MetadataValue::Int(i) => serde_json::Value::from(i),
            MetadataValue::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            MetadataValue::Bool(b) => serde_json::Value::Bool(b),
            MetadataValue::DateTime(dt) => serde_json::Value::String(dt.to_rfc3339()),
            MetadataValue::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(serde_json::Value::from).collect())
            }
        }
    }
}

impl TryFrom<serde_json::Value> for MetadataValue {
    type Error = String;

    fn try_from(value: serde_json::Value) -> std::result::Result<Self, Self::Error> {
        match value {
            serde_json::Value::String(s) => Ok(Self::String(s)),
            serde_json::Value::Bool(b) => Ok(Self::Bool(b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Self::Int(i)),
                None => n
                    .as_f64()
                    .map(Self::Float)
                    .ok_or_else(|| format!("unsupported number: {n}")),
            },
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(Self::try_from)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Self::Array),
            serde_json::Value::Null => Err("null is not a metadata value".to_string()),
            serde_json::Value::Object(_) => {
                Err("nested objects are not metadata values".to_string())
            }
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i32> for MetadataValue {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<i64> for MetadataValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f32> for MetadataValue {
    fn from(f: f32) -> Self {
        Self::Float(f64::from(f))
    }
}

impl From<f64> for MetadataValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<DateTime<Utc>> for MetadataValue {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::DateTime(dt)
    }
}

impl<T: Into<MetadataValue>> From<Vec<T>> for MetadataValue {
    fn from(items: Vec<T>) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }
}

// ============================================================================
// Collection Schema
// ============================================================================

/// Similarity index built over the vector column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexType {
    /// Exact scan, no ANN index
    Flat,
    /// Inverted-file index
    #[default]
    IvfFlat,
    /// Graph index
    Hnsw,
}

impl IndexType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::IvfFlat => "ivf_flat",
            Self::Hnsw => "hnsw",
        }
    }

    /// Parse a stored value, falling back to `ivf_flat` when unrecognised
    pub fn parse_or_default(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl std::fmt::Display for IndexType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IndexType {
    type Err = VectorError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "flat" => Ok(Self::Flat),
            "ivf_flat" | "ivfflat" => Ok(Self::IvfFlat),
            "hnsw" => Ok(Self::Hnsw),
            _ => Err(VectorError::invalid_config(format!("invalid index type: {s}"))),
        }
    }
}

/// Distance metric used for similarity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceType {
    #[default]
    Cosine,
    Euclidean,
    DotProduct,
}

impl DistanceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
            Self::DotProduct => "dot_product",
        }
    }

    /// Parse a stored value, falling back to `cosine` when unrecognised
    pub fn parse_or_default(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl std::fmt::Display for DistanceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DistanceType {
    type Err = VectorError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "euclidean" | "l2" => Ok(Self::Euclidean),
            "dot_product" | "inner_product" => Ok(Self::DotProduct),
            _ => Err(VectorError::invalid_config(format!(
                "invalid distance type: {s}"
            ))),
        }
    }
}

/// Declared type of a custom field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Int,
    Float,
    Bool,
    DateTime,
    Array,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::Bool => write!(f, "bool"),
            Self::DateTime => write!(f, "datetime"),
            Self::Array => write!(f, "array"),
        }
    }
}

impl std::str::FromStr for FieldType {
    type Err = VectorError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "string" => Ok(Self::String),
            "int" => Ok(Self::Int),
            "float" => Ok(Self::Float),
            "bool" => Ok(Self::Bool),
            "datetime" => Ok(Self::DateTime),
            "array" => Ok(Self::Array),
            _ => Err(VectorError::invalid_config(format!("invalid field type: {s}"))),
        }
    }
}

/// Schema entry for one custom metadata field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConfig {
    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Documents must carry this field
    #[serde(default)]
    pub required: bool,

    /// Ask the backend for a secondary index on this field
    #[serde(default)]
    pub indexed: bool,
}

impl FieldConfig {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            indexed: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }
}

/// Schema of a named collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Collection name, also used as the physical table name
    pub name: String,

    /// Length of every vector in the collection; fixed at creation
    pub dimension: usize,

    #[serde(default)]
    pub index_type: IndexType,

    #[serde(default)]
    pub distance_type: DistanceType,

    /// Custom metadata schema, ordered by field name
    #[serde(default)]
    pub custom_fields: BTreeMap<String, FieldConfig>,
}

impl CollectionConfig {
    pub fn new(name: impl Into<String>, dimension: usize) -> Self {
        Self {
            name: name.into(),
            dimension,
            index_type: IndexType::default(),
            distance_type: DistanceType::default(),
            custom_fields: BTreeMap::new(),
        }
    }

    pub fn with_index(mut self, index_type: IndexType) -> Self {
        self.index_type = index_type;
        self
    }

    pub fn with_distance(mut self, distance_type: DistanceType) -> Self {
        self.distance_type = distance_type;
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, field: FieldConfig) -> Self {
        self.custom_fields.insert(name.into(), field);
        self
    }
}

// ============================================================================
// Documents
// ============================================================================

/// A stored unit: embedding, content and typed metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorDocument {
    /// Unique within its collection
    pub id: String,

    #[serde(default)]
    pub vector: Vec<f32>,

    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub metadata: HashMap<String, MetadataValue>,

    /// Set on first insert, preserved across updates
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    /// Refreshed on every write
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl VectorDocument {
    /// Create a document with no content, metadata or timestamps
    pub fn new(id: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            vector,
            content: String::new(),
            metadata: HashMap::new(),
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Restore schema types on metadata decoded from JSON
    pub fn coerce_metadata(&mut self, schema: &BTreeMap<String, FieldConfig>) {
        for (name, field) in schema {
            if let Some(value) = self.metadata.remove(name) {
                self.metadata
                    .insert(name.clone(), value.coerce(field.field_type));
            }
        }
    }
}

// ============================================================================
// Search Types
// ============================================================================

/// Query parameters for similarity search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Maximum number of results
    pub limit: usize,

    /// Number of ranked results to skip
    #[serde(default)]
    pub offset: usize,

    /// Metadata equality filter, AND-combined
    #[serde(default)]
    pub filter: BTreeMap<String, MetadataValue>,

    #[serde(default)]
    pub include_metadata: bool,

    #[serde(default)]
    pub include_vectors: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            offset: 0,
            filter: BTreeMap::new(),
            include_metadata: true,
            include_vectors: false,
        }
    }
}

impl SearchOptions {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_filter(mut self, field: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.filter.insert(field.into(), value.into());
        self
    }

    pub fn with_metadata(mut self, include: bool) -> Self {
        self.include_metadata = include;
        self
    }

    pub fn with_vectors(mut self, include: bool) -> Self {
        self.include_vectors = include;
        self
    }
}

/// One ranked hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub document: VectorDocument,

    /// Similarity, higher is better (`1 - distance`)
    pub score: f32,

    /// Raw metric value
    pub distance: f32,
}

impl SearchResult {
    pub fn new(document: VectorDocument, distance: f32) -> Self {
        Self {
            document,
            score: 1.0 - distance,
            distance,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(ErrorCode::DocumentNotFound.as_u16(), 404);
        assert_eq!(ErrorCode::InvalidDimension.as_u16(), 400);
        assert_eq!(ErrorCode::CollectionExists.as_u16(), 409);
        assert_eq!(ErrorCode::OperationFailed.as_u16(), 500);
        assert_eq!(
            VectorError::CollectionNotFound("docs".into()).code(),
            ErrorCode::CollectionNotFound
        );
        assert!(VectorError::DocumentNotFound("d1".into()).is_not_found());
        assert!(!VectorError::CollectionExists("docs".into()).is_not_found());
    }

    #[test]
    fn test_wrapped_cause_is_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "socket closed");
        let err = VectorError::operation_failed("failed to upsert document", io);

        assert_eq!(err.code(), ErrorCode::OperationFailed);
        assert_eq!(err.to_string(), "operation failed: failed to upsert document");
        assert_eq!(err.source().unwrap().to_string(), "socket closed");
    }

    #[test]
    fn test_metadata_json_roundtrip_keeps_numbers_apart() {
        let value: MetadataValue = serde_json::from_str("3").unwrap();
        assert_eq!(value, MetadataValue::Int(3));

        let value: MetadataValue = serde_json::from_str("3.5").unwrap();
        assert_eq!(value, MetadataValue::Float(3.5));

        let value: MetadataValue = serde_json::from_str(r#"["a", 1, true]"#).unwrap();
        assert_eq!(
            value,
            MetadataValue::Array(vec!["a".into(), MetadataValue::Int(1), true.into()])
        );

        assert!(serde_json::from_str::<MetadataValue>("null").is_err());
        assert!(serde_json::from_str::<MetadataValue>(r#"{"a": 1}"#).is_err());
    }

    #[test]
    fn test_coerce_restores_schema_types() {
        let stamp = "2024-03-01T12:00:00+00:00";
        let value = MetadataValue::String(stamp.to_string()).coerce(FieldType::DateTime);
        assert!(matches!(value, MetadataValue::DateTime(_)));

        let value = MetadataValue::Int(2).coerce(FieldType::Float);
        assert_eq!(value, MetadataValue::Float(2.0));

        // Lossy conversions are left to the validator
        let value = MetadataValue::Float(2.5).coerce(FieldType::Int);
        assert_eq!(value, MetadataValue::Float(2.5));
    }

    #[test]
    fn test_check_type_reports_mismatch() {
        let err = MetadataValue::Int(123).check_type(FieldType::String).unwrap_err();
        assert_eq!(err.to_string(), "expected string, got int");
        assert!(MetadataValue::from("tech").check_type(FieldType::String).is_ok());
    }

    #[test]
    fn test_index_and_distance_fallbacks() {
        assert_eq!(IndexType::parse_or_default("hnsw"), IndexType::Hnsw);
        assert_eq!(IndexType::parse_or_default(""), IndexType::IvfFlat);
        assert_eq!(DistanceType::parse_or_default("bogus"), DistanceType::Cosine);
        assert!("bogus".parse::<IndexType>().is_err());
    }

    #[test]
    fn test_collection_config_from_json() {
        let config: CollectionConfig = serde_json::from_str(
            r#"{
                "name": "docs",
                "dimension": 3,
                "index_type": "hnsw",
                "distance_type": "dot_product",
                "custom_fields": {"category": {"type": "string", "required": true}}
            }"#,
        )
        .unwrap();

        assert_eq!(config.index_type, IndexType::Hnsw);
        assert_eq!(config.distance_type, DistanceType::DotProduct);
        assert!(config.custom_fields["category"].required);
        assert!(!config.custom_fields["category"].indexed);

        let bad = serde_json::from_str::<CollectionConfig>(
            r#"{"name": "docs", "dimension": 3, "custom_fields": {"x": {"type": "uuid"}}}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_search_options_defaults() {
        let opts = SearchOptions::default();
        assert_eq!(opts.limit, 10);
        assert!(opts.include_metadata);
        assert!(!opts.include_vectors);
    }

    #[test]
    fn test_document_coerce_metadata() {
        let mut doc = VectorDocument::new("d1", vec![0.1])
            .with_metadata("published", "2024-03-01T12:00:00Z")
            .with_metadata("title", "2024-03-01T12:00:00Z");
        let schema = CollectionConfig::new("docs", 1)
            .with_field("published", FieldConfig::new(FieldType::DateTime))
            .custom_fields;

        doc.coerce_metadata(&schema);

        assert!(matches!(doc.metadata["published"], MetadataValue::DateTime(_)));
        assert!(matches!(doc.metadata["title"], MetadataValue::String(_)));
    }
}
