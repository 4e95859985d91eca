//! Command line interface: argument parsing and command dispatch
//!
//! Commands only wire configuration into `depot-registry`; publishing,
//! routing and persistence live there.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use depot_registry::builtin::{LocalFetcher, RouterUploader, TarballPackager};
use depot_registry::{
    Collaborators, PackageFormat, PublishRequest, Publisher, SqliteStorage, StorageKind,
    StorageRouter, VcsKind,
};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::info;

use crate::config::DepotConfig;

/// Publish source trees as versioned artifacts
#[derive(Debug, Parser)]
#[command(name = "depot", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch, package, upload and record one artifact version
    Publish {
        /// Package format tag (gomod, tgz)
        #[arg(long, default_value = "tgz")]
        format: PackageFormat,

        /// Storage kind tag to upload to (fs, mem, s3)
        #[arg(long, default_value = "fs")]
        storage: StorageKind,

        /// VCS kind tag to fetch from (local, github, gitlab)
        #[arg(long, default_value = "local")]
        vcs: VcsKind,

        /// Repository identifier; a directory for `local`
        #[arg(long = "repo")]
        repository: String,

        /// Commit, branch or tag
        #[arg(long = "ref", default_value = "main")]
        reference: String,

        /// Only publish this directory of the repository
        #[arg(long)]
        subdir: Option<String>,

        #[arg(long)]
        package: String,

        #[arg(long, default_value = "")]
        description: String,

        #[arg(long)]
        version: String,
    },

    /// Write the object stored at a URI to stdout
    Cat { uri: String },

    /// Print an artifact and its versions as JSON
    Show { name: String },

    /// List all artifacts
    List,
}

/// Run a parsed command, writing its output to `out`
pub async fn run(
    cli: Cli,
    config: &DepotConfig,
    out: &mut (dyn AsyncWrite + Unpin + Send),
) -> Result<()> {
    match cli.command {
        Command::Publish {
            format,
            storage,
            vcs,
            repository,
            reference,
            subdir,
            package,
            description,
            version,
        } => {
            let request = PublishRequest {
                format,
                storage,
                vcs,
                repository,
                reference,
                subdir,
                package,
                description,
                version,
            };
            info!(command = "publish", package = %request.package, version = %request.version);

            let router = open_router(config).await?;
            let store = Arc::new(open_store(config).await?);
            let publisher = Publisher::new(collaborators(config, router), store);

            let artifact = publisher
                .publish(&request)
                .await
                .with_context(|| format!("publishing {}@{}", request.package, request.version))?;
            write_json(out, &artifact).await
        }

        Command::Cat { uri } => {
            info!(command = "cat", %uri);
            let router = open_router(config).await?;
            router
                .read(&uri, out)
                .await
                .with_context(|| format!("reading {uri}"))?;
            Ok(())
        }

        Command::Show { name } => {
            info!(command = "show", %name);
            let artifact = open_store(config).await?.get_artifact(&name).await?;
            write_json(out, &artifact).await
        }

        Command::List => {
            info!(command = "list");
            for artifact in open_store(config).await?.list_artifacts().await? {
                let versions: Vec<&str> = artifact.versions.iter().map(|v| v.version.as_str()).collect();
                let line = format!(
                    "{}\t{}\t{}\n",
                    artifact.name,
                    artifact.format,
                    versions.join(",")
                );
                out.write_all(line.as_bytes()).await?;
            }
            out.flush().await?;
            Ok(())
        }
    }
}

async fn open_router(config: &DepotConfig) -> Result<Arc<StorageRouter>> {
    let router = Arc::new(StorageRouter::new());
    router
        .register_backends(&config.storage_roots)
        .await
        .context("registering storage backends")?;
    Ok(router)
}

async fn open_store(config: &DepotConfig) -> Result<SqliteStorage> {
    SqliteStorage::new(&config.database_url)
        .await
        .with_context(|| format!("opening database {}", config.database_url))
}

fn collaborators(config: &DepotConfig, router: Arc<StorageRouter>) -> Collaborators {
    let mut collaborators = Collaborators::new()
        .with_fetcher(LocalFetcher::new())
        .with_packager(TarballPackager::new());
    for (kind, root) in config.upload_roots() {
        collaborators = collaborators.with_uploader(RouterUploader::new(kind, root, router.clone()));
    }

    let (formats, fetchers, uploaders) = collaborators.describe();
    info!(?formats, ?fetchers, ?uploaders, "collaborators ready");
    collaborators
}

async fn write_json<T: serde::Serialize>(
    out: &mut (dyn AsyncWrite + Unpin + Send),
    value: &T,
) -> Result<()> {
    let mut json = serde_json::to_vec_pretty(value)?;
    json.push(b'\n');
    out.write_all(&json).await?;
    out.flush().await?;
    Ok(())
}
