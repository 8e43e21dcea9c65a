use crate::config::Config;
use crate::error::{Result, TrilaneError, ValidationError};
use std::net::SocketAddr;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_collection(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_indexing(config, &mut errors);
        Self::validate_search(config, &mut errors);
        Self::validate_service(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(TrilaneError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.url.is_empty() {
            errors.push(ValidationError::new(
                "storage.url",
                "Storage URL cannot be empty",
            ));
        }

        if config.storage.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "storage.timeout_secs",
                "Timeout must be greater than 0",
            ));
        }
    }

    fn validate_collection(config: &Config, errors: &mut Vec<ValidationError>) {
        let collection = &config.collection;

        if collection.name.is_empty() {
            errors.push(ValidationError::new(
                "collection.name",
                "Collection name cannot be empty",
            ));
        }

        if collection.shard_number == 0 {
            errors.push(ValidationError::new(
                "collection.shard_number",
                "Shard number must be greater than 0",
            ));
        }

        if collection.replication_factor == 0 {
            errors.push(ValidationError::new(
                "collection.replication_factor",
                "Replication factor must be greater than 0",
            ));
        }

        if collection.dense.size == 0 {
            errors.push(ValidationError::new(
                "collection.dense.size",
                "Dense vector size must be greater than 0",
            ));
        }

        if collection.late_interaction.size == 0 {
            errors.push(ValidationError::new(
                "collection.late_interaction.size",
                "Late-interaction vector size must be greater than 0",
            ));
        }

        // Zero would leave the dense space deferred forever after finalize
        if collection.hnsw_m == 0 {
            errors.push(ValidationError::new(
                "collection.hnsw_m",
                "HNSW M must be greater than 0",
            ));
        }

        let names = [
            ("collection.dense.name", &collection.dense.name),
            ("collection.sparse.name", &collection.sparse.name),
            (
                "collection.late_interaction.name",
                &collection.late_interaction.name,
            ),
        ];
        for (path, name) in names {
            if name.is_empty() {
                errors.push(ValidationError::new(path, "Vector space name cannot be empty"));
            }
        }
        if collection.dense.name == collection.sparse.name
            || collection.dense.name == collection.late_interaction.name
            || collection.sparse.name == collection.late_interaction.name
        {
            errors.push(ValidationError::new(
                "collection",
                "Vector space names must be distinct",
            ));
        }

        if collection.tenant_field.is_empty() {
            errors.push(ValidationError::new(
                "collection.tenant_field",
                "Tenant field cannot be empty",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.dense_model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.dense_model",
                "Model name cannot be empty",
            ));
        }

        if config.embedding.sparse_model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.sparse_model",
                "Model name cannot be empty",
            ));
        }

        let late = &config.embedding.late_interaction;
        if late.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.late_interaction.model",
                "Model name cannot be empty",
            ));
        }

        if !late.endpoint.starts_with("http://") && !late.endpoint.starts_with("https://") {
            errors.push(ValidationError::new(
                "embedding.late_interaction.endpoint",
                format!("Endpoint must be an http(s) URL, got '{}'", late.endpoint),
            ));
        }
    }

    fn validate_indexing(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.indexing.batch_size == 0 {
            errors.push(ValidationError::new(
                "indexing.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.indexing.max_concurrent_batches == 0 {
            errors.push(ValidationError::new(
                "indexing.max_concurrent_batches",
                "At least one batch worker is required",
            ));
        }

        if config.indexing.num_tenants == 0 {
            errors.push(ValidationError::new(
                "indexing.num_tenants",
                "Tenant count must be greater than 0",
            ));
        }
    }

    fn validate_search(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.search.prefetch_limit == 0 {
            errors.push(ValidationError::new(
                "search.prefetch_limit",
                "Prefetch limit must be greater than 0",
            ));
        }

        if config.search.rerank_limit == 0 {
            errors.push(ValidationError::new(
                "search.rerank_limit",
                "Rerank limit must be greater than 0",
            ));
        }
    }

    fn validate_service(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.service.listen_addr.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "service.listen_addr",
                format!("Invalid listen address: {}", config.service.listen_addr),
            ));
        }
    }
}
