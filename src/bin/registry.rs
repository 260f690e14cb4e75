//! Schema Registry CLI
//!
//! Registers schema deltas, inspects version histories and transforms
//! records between versions.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use adaptive_schemas::config::StoreBackend;
use adaptive_schemas::{Record, SchemaConfig, SchemaDelta, SchemaMetadata, SchemaRegistry};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-registry")]
#[command(about = "Versioned schema deltas and record transformation")]
struct Cli {
    /// Config file (defaults to schemas.toml and friends)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file using the file store
    Init {
        /// Where to write the config
        #[arg(short, long, default_value = "schemas.toml")]
        output: PathBuf,
        /// Store directory
        #[arg(long, default_value = "./schema-store")]
        store: PathBuf,
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Config,

    /// Register a new version from a delta JSON file
    Register {
        subject: String,
        version: String,
        /// Delta file ({"added": {...}, "removed": {...}, "transformations": {...}})
        #[arg(short, long)]
        delta: PathBuf,
        #[arg(long)]
        created_by: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// List subjects, or the versions of one subject
    List { subject: Option<String> },

    /// Show the delta and metadata of a version
    Show { subject: String, version: String },

    /// Check compatibility between two versions, or print the full matrix
    Compat {
        subject: String,
        #[arg(short, long, requires = "to")]
        from: Option<String>,
        #[arg(short, long, requires = "from")]
        to: Option<String>,
    },

    /// Transform a JSON record between versions
    Transform {
        subject: String,
        #[arg(short, long)]
        from: String,
        #[arg(short, long)]
        to: String,
        /// Input record file (reads stdin if omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Export the compatibility graph in DOT format
    Graph {
        subject: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = SchemaConfig::load_from(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Init { output, store, force } => {
            if output.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", output.display());
            }
            let mut config = config;
            config.store.backend = StoreBackend::File;
            config.store.path = store;
            let path = output.to_str().context("config path is not valid UTF-8")?;
            config.save(path)?;
            println!("✅ Wrote {}", output.display());
            println!("   Store: {}", config.store.path.display());
            Ok(())
        }

        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }

        Commands::Register {
            subject,
            version,
            delta,
            created_by,
            description,
            tags,
        } => {
            let registry = open(&config)?;
            let content = std::fs::read_to_string(&delta)
                .with_context(|| format!("reading {}", delta.display()))?;
            let parsed: SchemaDelta = serde_json::from_str(&content)
                .with_context(|| format!("parsing delta {}", delta.display()))?;

            let metadata = if created_by.is_some() || description.is_some() || !tags.is_empty() {
                let mut meta = SchemaMetadata::default_for(
                    &subject,
                    &version,
                    &config.registry.default_creator,
                );
                if let Some(created_by) = created_by {
                    meta.created_by = created_by;
                }
                if let Some(description) = description {
                    meta.description = description;
                }
                Some(tags.into_iter().fold(meta, |m, tag| m.with_tag(tag)))
            } else {
                None
            };

            let sequence = registry.register(&subject, &version, parsed, metadata)?;
            println!("✅ Registered {} {} (sequence {})", subject, version, sequence);
            Ok(())
        }

        Commands::List { subject } => {
            let registry = open(&config)?;
            match subject {
                None => {
                    let subjects = registry.subjects()?;
                    if subjects.is_empty() {
                        println!("No subjects registered");
                    }
                    for subject in subjects {
                        let versions = registry.get_versions(&subject)?;
                        println!("📦 {} ({} versions)", subject, versions.len());
                    }
                }
                Some(subject) => {
                    println!("📦 {}", subject);
                    for label in registry.get_versions(&subject)? {
                        let Some((version, meta)) = registry
                            .get_version(&subject, &label)?
                            .zip(registry.get_metadata(&subject, &label)?)
                        else {
                            continue;
                        };
                        println!(
                            "  {:>4}  {:<12} {}  {}",
                            version.sequence,
                            version.label,
                            meta.created_at.format("%Y-%m-%d %H:%M"),
                            meta.description
                        );
                    }
                }
            }
            Ok(())
        }

        Commands::Show { subject, version } => {
            let registry = open(&config)?;
            let Some((delta, metadata)) = registry.get_schema(&subject, &version)? else {
                bail!("{} {} is not registered", subject, version);
            };
            println!("📋 {} {}", subject, version);
            println!("   Created: {} by {}", metadata.created_at.to_rfc3339(), metadata.created_by);
            println!("   Checksum: {}", delta.checksum()?);
            if !delta.is_fully_reversible() {
                println!("   ⚠️  Irreversible fields: {:?}", delta.irreversible_fields());
            }
            println!("{}", serde_json::to_string_pretty(&*delta)?);
            Ok(())
        }

        Commands::Compat { subject, from, to } => {
            let registry = open(&config)?;
            if let (Some(from), Some(to)) = (from, to) {
                if registry.check_compatibility(&subject, &from, &to)? {
                    println!("✅ {} {} -> {} compatible", subject, from, to);
                } else {
                    println!("❌ {} {} -> {} incompatible", subject, from, to);
                    std::process::exit(1);
                }
            } else {
                println!("🔍 Compatibility matrix for {}", subject);
                for edge in registry.compatibility_matrix(&subject)? {
                    let mark = if edge.compatible { "✅" } else { "❌" };
                    println!("  {} {} -> {}", mark, edge.from, edge.to);
                }
            }
            Ok(())
        }

        Commands::Transform {
            subject,
            from,
            to,
            input,
        } => {
            let registry = open(&config)?;
            let content = match &input {
                Some(path) => std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?,
                None => std::io::read_to_string(std::io::stdin()).context("reading stdin")?,
            };
            let record: Record =
                serde_json::from_str(&content).context("input must be a JSON object")?;
            let output = registry.transform(&subject, &record, &from, &to)?;
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }

        Commands::Graph { subject, output } => {
            let registry = open(&config)?;
            let dot = registry.compatibility_graph(&subject)?.to_dot();
            match output {
                Some(path) => {
                    std::fs::write(&path, &dot)?;
                    println!("✅ DOT file written to: {}", path.display());
                    println!("   Render with: dot -Tsvg {} -o graph.svg", path.display());
                }
                None => print!("{}", dot),
            }
            Ok(())
        }
    }
}

fn open(config: &SchemaConfig) -> anyhow::Result<SchemaRegistry> {
    if config.store.backend == StoreBackend::Memory {
        warn!(
            "memory store selected; nothing persists between invocations \
             (run `schema-registry init`)"
        );
    }
    Ok(SchemaRegistry::from_config(config)?)
}
