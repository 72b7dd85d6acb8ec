//! plfm-vt Bundle Agent
//!
//! Operator entry point for the node-side bundle lifecycle and actions.
//!
//! ## Commands
//!
//! - **install / status / enable / disable / uninstall / list**: bundle
//!   versions under the configured install and enable roots
//! - **upload-blob**: run the integrity-checked upload action against the
//!   local blob store

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use plfm_bundle_agent::config::Config;
use plfm_bundle_agent::{
    Action, BundleDefinition, FileBundleCollection, LocalBlobStore, OsFileSystem, SystemClock,
    UploadBlobAction, UploadBlobSpec,
};

/// plfm-vt bundle agent - install bundles and run node actions.
#[derive(Debug, Parser)]
#[command(name = "bundle-agent")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Install a bundle version from a staged directory.
    Install {
        #[command(flatten)]
        bundle: BundleArgs,

        /// Staged bundle content; consumed by the install.
        #[arg(long)]
        source: PathBuf,
    },

    /// Show whether a bundle version is installed and enabled.
    Status(BundleArgs),

    /// Make a bundle version the active one.
    Enable(BundleArgs),

    /// Remove the active link if it points at this version.
    Disable(BundleArgs),

    /// Remove an installed bundle version that is not enabled.
    Uninstall(BundleArgs),

    /// List installed bundle versions.
    List,

    /// Verify a base64 payload against its checksum and store it as a blob.
    UploadBlob {
        #[arg(long)]
        blob_id: String,

        /// Hex digest; prefix with `sha256:` or `sha512:` for those algorithms.
        #[arg(long)]
        checksum: String,

        /// File holding the base64 encoded payload.
        #[arg(long)]
        payload_file: PathBuf,
    },
}

#[derive(Debug, Args)]
struct BundleArgs {
    /// Bundle name.
    #[arg(long)]
    name: String,

    /// Bundle version.
    #[arg(long)]
    version: String,
}

impl BundleArgs {
    fn definition(&self) -> BundleDefinition {
        BundleDefinition::new(&self.name, &self.version)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    // Logs go to stderr; stdout carries command output.
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    info!(
        install_dir = %config.bundle_install_dir.display(),
        enable_dir = %config.bundle_enable_dir.display(),
        blobs_dir = %config.blobs_dir.display(),
        "Configuration loaded"
    );

    let bundles = FileBundleCollection::new(
        &config.bundle_install_dir,
        &config.bundle_enable_dir,
        config.bundle_mode,
        Some(config.bundle_owner.clone()),
        Arc::new(OsFileSystem::new()),
        Arc::new(SystemClock),
    );

    match cli.command {
        Commands::Install { bundle, source } => {
            let path = bundles.get(&bundle.definition())?.install(&source)?;
            println!("{}", path.display());
        }
        Commands::Status(bundle) => {
            let bundle = bundles.get(&bundle.definition())?;
            let installed = if bundle.is_installed()? {
                "installed"
            } else {
                "not installed"
            };
            let enabled = if bundle.is_enabled()? { ", enabled" } else { "" };
            println!("{installed}{enabled}");
        }
        Commands::Enable(bundle) => {
            let path = bundles.get(&bundle.definition())?.enable()?;
            println!("{}", path.display());
        }
        Commands::Disable(bundle) => bundles.get(&bundle.definition())?.disable()?,
        Commands::Uninstall(bundle) => bundles.get(&bundle.definition())?.uninstall()?,
        Commands::List => {
            for definition in bundles.list()? {
                println!("{definition}");
            }
        }
        Commands::UploadBlob {
            blob_id,
            checksum,
            payload_file,
        } => {
            let payload = tokio::fs::read_to_string(&payload_file)
                .await
                .with_context(|| format!("reading {}", payload_file.display()))?;

            let action = UploadBlobAction::new(Arc::new(LocalBlobStore::new(&config.blobs_dir)));
            let result = action
                .run(UploadBlobSpec {
                    payload: payload.trim().to_string(),
                    checksum,
                    blob_id,
                })
                .await?;
            println!("{result}");
        }
    }

    Ok(())
}
