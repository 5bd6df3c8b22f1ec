// Operator CLI for the module registry core

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use module_registry::storage::ObjectKind;
use module_registry::{
    telemetry, AppConfig, BlobStore, Digest, ModuleReference, ModuleResolver, SqliteMetadataStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "registry")]
#[command(about = "Module registry storage and dependency resolution", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve module references and print the pinned commits as JSON
    Resolve {
        /// References of the form remote/owner/repository[:reference]
        #[arg(required = true)]
        references: Vec<String>,

        /// Follow each module's own dependencies
        #[arg(short, long)]
        transitive: bool,

        /// Abandon resolution after this many seconds
        #[arg(long, default_value = "60")]
        timeout_secs: u64,
    },

    /// Print the build config stored with a commit
    BuildConfig {
        /// Commit ID
        commit_id: String,
    },

    /// Re-hash a stored object and compare it with its digest
    Verify {
        /// Digest of the form algorithm:hex
        digest: String,

        /// Look the digest up among manifests instead of blobs
        #[arg(short, long)]
        manifest: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let _log_guard = telemetry::init_tracing(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.registry.host,
        "Registry starting"
    );

    let blob_store = BlobStore::from_settings(&config.storage).await?;

    match cli.command {
        Commands::Resolve {
            references,
            transitive,
            timeout_secs,
        } => {
            let references = references
                .iter()
                .map(|r| ModuleReference::parse(r))
                .collect::<module_registry::Result<Vec<_>>>()
                .context("invalid module reference")?;

            let metadata = SqliteMetadataStore::new(
                &config.metadata.database_path,
                config.metadata.max_connections,
            )
            .await?;
            let resolver = ModuleResolver::new(
                config.registry.host.clone(),
                Arc::new(metadata.clone()),
                blob_store,
            );

            let resolution = tokio::time::timeout(
                Duration::from_secs(timeout_secs),
                resolver.resolve_from_references(&references, transitive),
            )
            .await
            .context("dependency resolution timed out")??;

            let pins = resolution.pins(resolver.host());
            println!("{}", serde_json::to_string_pretty(&pins)?);
            metadata.close().await;
        }
        Commands::BuildConfig { commit_id } => {
            let metadata = SqliteMetadataStore::new(
                &config.metadata.database_path,
                config.metadata.max_connections,
            )
            .await?;
            let resolver = ModuleResolver::new(
                config.registry.host.clone(),
                Arc::new(metadata.clone()),
                blob_store,
            );

            let build_config = resolver.build_config_for_commit(&commit_id).await?;
            println!("{}", serde_json::to_string_pretty(&build_config)?);
            metadata.close().await;
        }
        Commands::Verify { digest, manifest } => {
            let digest = Digest::parse(&digest).context("invalid digest")?;
            let kind = if manifest {
                ObjectKind::Manifest
            } else {
                ObjectKind::Blob
            };

            if !blob_store.verify(kind, &digest).await? {
                bail!("{} {} does not match its stored content", kind, digest);
            }
            println!("{} {} ok", kind, digest);
        }
    }

    Ok(())
}
