//! vecstore CLI - Command-line interface
//!
//! Usage:
//!   vecstore init
//!   vecstore collection create --file <config.json>
//!   vecstore collection list
//!   vecstore doc upsert <collection> --file <docs.json>
//!   vecstore search <collection> --vector '[0.1, 0.2, 0.3]' --filter category=tech
//!   vecstore search-id <collection> <id>

mod settings;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use vecstore_core::{
    CollectionConfig, LoggingConfig, MetadataValue, SearchOptions, VectorDocument, VectorStorage,
};
use vecstore_postgres::PostgresProvider;

#[derive(Parser)]
#[command(name = "vecstore")]
#[command(about = "Schema-aware vector document store on PostgreSQL + pgvector")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the extension, schema and collection registry
    Init,
    /// Manage collections
    Collection {
        #[command(subcommand)]
        action: CollectionAction,
    },
    /// Manage documents
    Doc {
        #[command(subcommand)]
        action: DocAction,
    },
    /// Search a collection by query vector
    Search {
        collection: String,
        /// Query vector as a JSON array
        #[arg(long)]
        vector: String,
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Search a collection using a stored document's vector
    SearchId {
        collection: String,
        id: String,
        #[command(flatten)]
        query: QueryArgs,
    },
}

#[derive(Subcommand)]
enum CollectionAction {
    /// Create a collection from a JSON definition
    Create {
        #[arg(long)]
        file: PathBuf,
    },
    /// Delete a collection and its documents
    Delete { name: String },
    /// List collection names
    List,
    /// Show a collection's schema
    Show { name: String },
}

#[derive(Subcommand)]
enum DocAction {
    /// Insert or replace documents from a JSON object or array
    Upsert {
        collection: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Fetch a document
    Get { collection: String, id: String },
    /// Delete a document
    Delete { collection: String, id: String },
}

#[derive(Args)]
struct QueryArgs {
    #[arg(long, default_value_t = 10)]
    limit: usize,

    #[arg(long, default_value_t = 0)]
    offset: usize,

    /// Metadata equality filter, repeatable
    #[arg(long = "filter", value_name = "KEY=VALUE", value_parser = parse_filter)]
    filters: Vec<(String, MetadataValue)>,

    /// Return stored vectors
    #[arg(long)]
    include_vectors: bool,

    /// Omit metadata from results
    #[arg(long)]
    no_metadata: bool,
}

impl QueryArgs {
    fn into_options(self, collection: &CollectionConfig) -> SearchOptions {
        let mut opts = SearchOptions::default()
            .with_limit(self.limit)
            .with_offset(self.offset)
            .with_metadata(!self.no_metadata)
            .with_vectors(self.include_vectors);

        for (field, value) in self.filters {
            let value = match collection.custom_fields.get(&field) {
                Some(schema) => value.coerce(schema.field_type),
                None => value,
            };
            opts = opts.with_filter(field, value);
        }
        opts
    }
}

/// `key=value`, where the value is read as JSON and falls back to a string
fn parse_filter(s: &str) -> Result<(String, MetadataValue), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {s}"))?;

    let value = serde_json::from_str::<MetadataValue>(raw)
        .unwrap_or_else(|_| MetadataValue::String(raw.to_string()));

    Ok((key.to_string(), value))
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "vecstore={0},vecstore_core={0},vecstore_postgres={0}",
            logging.level
        ))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(logging.include_location)
        .with_line_number(logging.include_location);

    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_json(path: &Path) -> anyhow::Result<serde_json::Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))
}

/// Parse one document or an array of documents
fn parse_documents(value: serde_json::Value) -> anyhow::Result<Vec<VectorDocument>> {
    let docs = match value {
        serde_json::Value::Array(_) => serde_json::from_value(value)?,
        serde_json::Value::Object(_) => vec![serde_json::from_value(value)?],
        other => bail!("expected a document object or array, got {other}"),
    };
    Ok(docs)
}

async fn run(storage: &VectorStorage, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Init => {
            print_json(&serde_json::json!({ "initialized": storage.provider().name() }))?;
        }
        Commands::Collection { action } => match action {
            CollectionAction::Create { file } => {
                let config: CollectionConfig = serde_json::from_value(read_json(&file)?)
                    .context("invalid collection definition")?;
                storage.create_collection(&config).await?;
                print_json(&config)?;
            }
            CollectionAction::Delete { name } => {
                storage.delete_collection(&name).await?;
                print_json(&serde_json::json!({ "deleted": name }))?;
            }
            CollectionAction::List => {
                print_json(&storage.list_collections().await?)?;
            }
            CollectionAction::Show { name } => {
                print_json(&storage.get_collection(&name).await?)?;
            }
        },
        Commands::Doc { action } => match action {
            DocAction::Upsert { collection, file } => {
                let config = storage.get_collection(&collection).await?;
                let mut docs = parse_documents(read_json(&file)?)?;
                for doc in &mut docs {
                    doc.coerce_metadata(&config.custom_fields);
                }

                storage.upsert_documents(&collection, &mut docs).await?;
                tracing::info!("Upserted {} documents into {}", docs.len(), collection);
                let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
                print_json(&serde_json::json!({ "upserted": ids }))?;
            }
            DocAction::Get { collection, id } => {
                print_json(&storage.get_document(&collection, &id).await?)?;
            }
            DocAction::Delete { collection, id } => {
                storage.delete_document(&collection, &id).await?;
                print_json(&serde_json::json!({ "deleted": id }))?;
            }
        },
        Commands::Search {
            collection,
            vector,
            query,
        } => {
            let vector: Vec<f32> =
                serde_json::from_str(&vector).context("--vector must be a JSON array of numbers")?;
            let config = storage.get_collection(&collection).await?;
            let opts = query.into_options(&config);

            let results = storage
                .search_by_vector(&collection, &vector, Some(&opts))
                .await?;
            print_json(&results)?;
        }
        Commands::SearchId {
            collection,
            id,
            query,
        } => {
            let config = storage.get_collection(&collection).await?;
            let opts = query.into_options(&config);

            let results = storage.search_by_id(&collection, &id, Some(&opts)).await?;
            print_json(&results)?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = settings::load(cli.config.as_deref())?;
    init_tracing(&config.logging);

    let provider = PostgresProvider::connect(&config.database).await?;
    let storage = VectorStorage::new(Arc::new(provider)).await?;

    let result = run(&storage, cli.command).await;
    storage.close().await?;

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use vecstore_core::{FieldConfig, FieldType};

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_filter_values() {
        assert_eq!(
            parse_filter("category=tech").unwrap(),
            ("category".to_string(), MetadataValue::from("tech"))
        );
        assert_eq!(
            parse_filter("views=7").unwrap(),
            ("views".to_string(), MetadataValue::Int(7))
        );
        assert_eq!(
            parse_filter("tags=[\"a\",\"b\"]").unwrap().1,
            MetadataValue::from(vec!["a", "b"])
        );
        assert!(parse_filter("category").is_err());
    }

    #[test]
    fn test_query_args_coerce_filters_to_schema() {
        let cli = Cli::parse_from([
            "vecstore", "search", "docs", "--vector", "[0.1]", "--filter", "score=3",
            "--filter", "kind=news", "--limit", "5", "--no-metadata",
        ]);
        let Commands::Search { query, .. } = cli.command else {
            panic!("expected search command");
        };

        let config = CollectionConfig::new("docs", 1)
            .with_field("score", FieldConfig::new(FieldType::Float));
        let opts = query.into_options(&config);

        assert_eq!(opts.limit, 5);
        assert!(!opts.include_metadata);
        assert_eq!(opts.filter["score"], MetadataValue::Float(3.0));
        assert_eq!(opts.filter["kind"], MetadataValue::from("news"));
    }

    #[test]
    fn test_parse_documents_accepts_object_or_array() {
        let one = parse_documents(serde_json::json!({"id": "d1", "vector": [0.1]})).unwrap();
        assert_eq!(one.len(), 1);

        let many = parse_documents(serde_json::json!([
            {"id": "d1", "vector": [0.1]},
            {"id": "d2", "vector": [0.2], "metadata": {"category": "tech"}}
        ]))
        .unwrap();
        assert_eq!(many[1].metadata["category"], MetadataValue::from("tech"));

        assert!(parse_documents(serde_json::json!("nope")).is_err());
    }
}
