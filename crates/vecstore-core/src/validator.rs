//! Schema validation
//!
//! Checks collection configurations and documents before any write reaches
//! a storage backend. Every provider runs the same validator, so invalid
//! input produces the same error code regardless of backend.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};

use crate::{CollectionConfig, FieldConfig, MetadataValue, Result, VectorDocument, VectorError};

static COLLECTION_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_-]{2,63}$").expect("collection name pattern compiles")
});

static FIELD_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_]{2,63}$").expect("field name pattern compiles")
});

/// Whether `name` is a legal collection (and table) name
pub fn is_valid_collection_name(name: &str) -> bool {
    COLLECTION_NAME.is_match(name)
}

/// Whether `name` is a legal custom field name
pub fn is_valid_field_name(name: &str) -> bool {
    FIELD_NAME.is_match(name)
}

/// Stateless validator parameterized by the maximum vector dimension
#[derive(Debug, Clone, Copy)]
pub struct Validator {
    max_dimension: usize,
}

impl Validator {
    pub fn new(max_dimension: usize) -> Self {
        Self { max_dimension }
    }

    pub fn max_dimension(&self) -> usize {
        self.max_dimension
    }

    /// Validate a collection configuration.
    ///
    /// Checks run in a fixed order: name, dimension, then custom fields
    /// sorted by name.
    pub fn validate_collection(&self, config: &CollectionConfig) -> Result<()> {
        if !is_valid_collection_name(&config.name) {
            return Err(VectorError::invalid_config(format!(
                "invalid collection name format: {}",
                config.name
            )));
        }

        if config.dimension == 0 || config.dimension > self.max_dimension {
            return Err(VectorError::InvalidDimension(format!(
                "dimension must be between 1 and {}, got {}",
                self.max_dimension, config.dimension
            )));
        }

        for name in config.custom_fields.keys() {
            validate_field_name(name)?;
        }

        Ok(())
    }

    /// Validate a document against its collection schema.
    ///
    /// Unset timestamps are stamped with the current time.
    pub fn validate_document(
        &self,
        doc: &mut VectorDocument,
        config: &CollectionConfig,
    ) -> Result<()> {
        if doc.id.is_empty() {
            return Err(VectorError::invalid_config("document ID cannot be empty"));
        }

        self.validate_vector(&doc.vector, config.dimension)?;

        let now = Utc::now();
        if doc.created_at.is_none() {
            doc.created_at = Some(now);
        }
        if doc.updated_at.is_none() {
            doc.updated_at = Some(now);
        }

        validate_custom_fields(&doc.metadata, &config.custom_fields)
    }

    /// Validate a vector's length and components
    pub fn validate_vector(&self, vector: &[f32], dimension: usize) -> Result<()> {
        if vector.len() != dimension {
            return Err(VectorError::InvalidDimension(format!(
                "expected vector dimension {}, got {}",
                dimension,
                vector.len()
            )));
        }

        if let Some(pos) = vector.iter().position(|v| !v.is_finite()) {
            return Err(VectorError::invalid_vector(format!(
                "component {pos} is not a finite number"
            )));
        }

        Ok(())
    }
}

fn validate_field_name(name: &str) -> Result<()> {
    if is_valid_field_name(name) {
        Ok(())
    } else {
        Err(VectorError::invalid_config(format!(
            "invalid field name format: {name}"
        )))
    }
}

fn validate_custom_fields(
    metadata: &HashMap<String, MetadataValue>,
    schema: &BTreeMap<String, FieldConfig>,
) -> Result<()> {
    for (name, field) in schema {
        match metadata.get(name) {
            None if field.required => {
                return Err(VectorError::invalid_config(format!(
                    "required field missing: {name}"
                )));
            }
            None => {}
            Some(value) => {
                value
                    .check_type(field.field_type)
                    .map_err(|e| VectorError::InvalidConfig {
                        message: format!("invalid value for field {name}: {e}"),
                        source: Some(Box::new(e)),
                    })?;
            }
        }
    }

    let mut names: Vec<&String> = metadata.keys().collect();
    names.sort();
    for name in names {
        if !is_finite(&metadata[name]) {
            return Err(VectorError::invalid_config(format!(
                "field {name} holds a non-finite number"
            )));
        }
    }

    Ok(())
}

/// Floats must be finite at any depth; JSON has no NaN or infinity
fn is_finite(value: &MetadataValue) -> bool {
    match value {
        MetadataValue::Float(f) => f.is_finite(),
        MetadataValue::Array(items) => items.iter().all(is_finite),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorCode, FieldType, IndexType};

    fn validator() -> Validator {
        Validator::new(384)
    }

    fn schema() -> CollectionConfig {
        CollectionConfig::new("test_collection", 3)
            .with_field("category", FieldConfig::new(FieldType::String).required())
            .with_field("priority", FieldConfig::new(FieldType::Int))
            .with_field("rating", FieldConfig::new(FieldType::Float))
            .with_field("published", FieldConfig::new(FieldType::Bool))
            .with_field("released", FieldConfig::new(FieldType::DateTime))
            .with_field("tags", FieldConfig::new(FieldType::Array))
    }

    fn doc() -> VectorDocument {
        VectorDocument::new("test_doc", vec![0.1, 0.2, 0.3])
            .with_content("test content")
            .with_metadata("category", "tech")
    }

    #[test]
    fn test_valid_collection() {
        let config = CollectionConfig::new("test_collection", 384).with_index(IndexType::Hnsw);
        assert!(validator().validate_collection(&config).is_ok());
    }

    #[test]
    fn test_collection_name_rules() {
        let too_long = "a".repeat(65);
        for name in ["ab", "1abc", "has space", "semi;colon", too_long.as_str()] {
            let err = validator()
                .validate_collection(&CollectionConfig::new(name, 3))
                .unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidConfig, "name {name:?}");
        }

        let longest = "a".repeat(64);
        for name in ["abc", "my-docs", "Docs_2024", longest.as_str()] {
            assert!(validator()
                .validate_collection(&CollectionConfig::new(name, 3))
                .is_ok());
        }
    }

    #[test]
    fn test_dimension_bounds() {
        let err = validator()
            .validate_collection(&CollectionConfig::new("docs", 0))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidDimension);

        let err = validator()
            .validate_collection(&CollectionConfig::new("docs", 385))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidDimension);

        assert!(validator()
            .validate_collection(&CollectionConfig::new("docs", 384))
            .is_ok());
    }

    #[test]
    fn test_field_names_reject_hyphens() {
        let config =
            CollectionConfig::new("docs", 3).with_field("my-field", FieldConfig::new(FieldType::Int));
        let err = validator().validate_collection(&config).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidConfig);
    }

    #[test]
    fn test_valid_document_is_stamped() {
        let mut doc = doc();
        assert!(doc.created_at.is_none());

        validator().validate_document(&mut doc, &schema()).unwrap();

        assert!(doc.created_at.is_some());
        assert!(doc.updated_at.is_some());
    }

    #[test]
    fn test_existing_timestamps_are_kept() {
        let earlier = Utc::now() - chrono::Duration::days(3);
        let mut doc = doc();
        doc.created_at = Some(earlier);

        validator().validate_document(&mut doc, &schema()).unwrap();

        assert_eq!(doc.created_at, Some(earlier));
        assert!(doc.updated_at.unwrap() > earlier);
    }

    #[test]
    fn test_empty_id() {
        let mut doc = doc();
        doc.id.clear();
        let err = validator().validate_document(&mut doc, &schema()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidConfig);
    }

    #[test]
    fn test_wrong_dimension() {
        let mut doc = VectorDocument::new("d2", vec![0.1, 0.2]).with_metadata("category", "x");
        let err = validator().validate_document(&mut doc, &schema()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidDimension);
    }

    #[test]
    fn test_non_finite_component() {
        let mut doc = VectorDocument::new("d3", vec![0.1, f32::NAN, 0.3])
            .with_metadata("category", "x");
        let err = validator().validate_document(&mut doc, &schema()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidVector);
    }

    #[test]
    fn test_missing_required_field() {
        let mut doc = VectorDocument::new("d4", vec![0.1, 0.2, 0.3]).with_content("x");
        let err = validator().validate_document(&mut doc, &schema()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidConfig);
        assert!(err.to_string().contains("category"));
    }

    #[test]
    fn test_type_mismatch_wraps_cause() {
        use std::error::Error as _;

        let mut doc = VectorDocument::new("d5", vec![0.1, 0.2, 0.3]).with_metadata("category", 123);
        let err = validator().validate_document(&mut doc, &schema()).unwrap_err();

        assert_eq!(err.code(), ErrorCode::InvalidConfig);
        assert_eq!(err.source().unwrap().to_string(), "expected string, got int");
    }

    #[test]
    fn test_every_declared_type_accepts_its_variant() {
        let mut doc = doc()
            .with_metadata("priority", 3)
            .with_metadata("rating", 4.5)
            .with_metadata("published", true)
            .with_metadata("released", Utc::now())
            .with_metadata("tags", vec!["a", "b"]);

        assert!(validator().validate_document(&mut doc, &schema()).is_ok());
    }

    #[test]
    fn test_int_is_not_a_float() {
        let mut doc = doc().with_metadata("rating", 4);
        let err = validator().validate_document(&mut doc, &schema()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidConfig);
    }

    #[test]
    fn test_undeclared_metadata_is_allowed() {
        let mut doc = doc().with_metadata("free_form", vec![1, 2, 3]);
        assert!(validator().validate_document(&mut doc, &schema()).is_ok());
    }

    #[test]
    fn test_non_finite_metadata_is_rejected() {
        let values = [
            MetadataValue::Float(f64::NAN),
            MetadataValue::Float(f64::INFINITY),
            MetadataValue::Array(vec![MetadataValue::Float(1.0), f64::NEG_INFINITY.into()]),
        ];

        for value in values {
            let mut declared = doc().with_metadata("rating", value.clone());
            let err = validator()
                .validate_document(&mut declared, &schema())
                .unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidConfig, "{value:?}");

            let mut undeclared = doc().with_metadata("extra_score", value);
            let err = validator()
                .validate_document(&mut undeclared, &schema())
                .unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidConfig);
        }
    }

    #[test]
    fn test_identifier_helpers() {
        assert!(is_valid_collection_name("my-docs"));
        assert!(!is_valid_field_name("my-field"));
        assert!(!is_valid_collection_name("docs\"; DROP TABLE x; --"));
    }
}
