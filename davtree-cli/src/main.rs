use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use davtree_core::{
    MountedView, Node, NodeTree, RequestContext, TreeConfig, TreeError, TreeSnapshot,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "davtree")]
#[command(about = "Resolve, move and copy nodes across the mounts of a namespace snapshot")]
#[command(version)]
struct Cli {
    /// Snapshot file holding the mount table and storage contents
    #[arg(short, long, global = true, default_value = "davtree.json")]
    state: PathBuf,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Resolve chunked-upload names to their logical file
    #[arg(long, global = true)]
    chunked: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the mount table
    Mounts,

    /// Show the node at a path
    Stat {
        path: String,
    },

    /// List a directory
    Ls {
        #[arg(default_value = "")]
        path: String,
    },

    /// Move or rename a node
    Mv {
        source: String,
        destination: String,
    },

    /// Copy a node, replacing the destination
    Cp {
        source: String,
        destination: String,
    },
}

/// Prefixes a tree failure with its protocol status.
fn with_status(err: TreeError) -> anyhow::Error {
    anyhow!("{} {}", err.status_code(), err)
}

fn load_config(path: Option<&PathBuf>) -> Result<TreeConfig> {
    match path {
        Some(path) => Ok(TreeConfig::load_validated(path)?),
        None => Ok(TreeConfig::default()),
    }
}

fn describe(node: &Node) -> String {
    let metadata = node.metadata();
    let etag: String = metadata.etag.chars().take(12).collect();
    format!(
        "{:<4} {:>10} {} {:<12} {}",
        node.kind().to_string(),
        metadata.size,
        metadata.permissions,
        etag,
        node.path()
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("davtree={}", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let snapshot = TreeSnapshot::load(&cli.state)
        .with_context(|| format!("loading state from {}", cli.state.display()))?;
    let loaded = snapshot.build().await?;

    let view = Arc::new(MountedView::from_config(&config, loaded.registry.clone()));
    let context = RequestContext::new().chunked(cli.chunked);
    info!(request = %context.request_id, view_root = %config.view_root, "starting request");

    let mut tree = NodeTree::new(context).with_config(&config);
    let root = NodeTree::load_root(view.as_ref()).await.map_err(with_status)?;
    tree.init(root, view);

    let mutated = match cli.command {
        Commands::Mounts => {
            for mount in loaded.registry.list_mounts().await {
                let mut flags = Vec::new();
                if mount.is_movable() {
                    flags.push("movable");
                }
                if mount.is_read_only() {
                    flags.push("read-only");
                }
                println!(
                    "{:<32} {:<16} {}",
                    mount.mount_point().to_string(),
                    mount.storage().id(),
                    flags.join(",")
                );
            }
            false
        }
        Commands::Stat { path } => {
            let node = tree.resolve(path.as_str()).await.map_err(with_status)?;
            println!("{}", describe(&node));
            println!("storage  {}", node.info().storage.id());
            println!("mount    {}", node.info().mount_point);
            println!("internal /{}", node.info().internal_path);
            false
        }
        Commands::Ls { path } => {
            for child in tree.children(path.as_str()).await.map_err(with_status)? {
                println!("{}", describe(&child));
            }
            false
        }
        Commands::Mv {
            source,
            destination,
        } => {
            tree.move_node(source.as_str(), destination.as_str())
                .await
                .map_err(with_status)?;
            true
        }
        Commands::Cp {
            source,
            destination,
        } => {
            tree.copy_node(source.as_str(), destination.as_str())
                .await
                .map_err(with_status)?;
            true
        }
    };

    if mutated {
        TreeSnapshot::capture(&loaded)
            .await
            .save(&cli.state)
            .with_context(|| format!("saving state to {}", cli.state.display()))?;
        info!(state = %cli.state.display(), "state saved");
    }

    Ok(())
}
