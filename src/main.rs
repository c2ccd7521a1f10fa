use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use modvault::config::{self, Config, Listen};
use modvault::store::AppState;
use modvault::{auth, pack, registry};

#[derive(Debug, Parser)]
#[command(name = "modvault", about = "Filesystem-backed module registry")]
struct Cli {
    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log debug output.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve modules over HTTP.
    Serve(ServeArgs),

    /// Print an argon2 hash for each password. Join `user:hash` pairs with
    /// `;` or whitespace for MODVAULT_AUTH_USERS.
    Pwhash {
        #[arg(required = true)]
        passwords: Vec<String>,
    },

    /// Build an uploadable archive from a module source directory.
    Pack {
        /// Release version, e.g. v1.2.3.
        #[arg(long)]
        version: String,

        /// Output file (default: <basename>@<version>.zip).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Module directory containing go.mod.
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
}

/// Flags override the corresponding `MODVAULT_*` environment variables.
#[derive(Debug, clap::Args)]
struct ServeArgs {
    /// TCP address to listen on.
    #[arg(long, conflicts_with = "socket")]
    listen: Option<String>,

    /// Unix domain socket path to listen on.
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Storage root directory.
    #[arg(long)]
    root: Option<PathBuf>,

    /// URL prefix for read endpoints.
    #[arg(long)]
    read_prefix: Option<String>,

    /// URL prefix for uploads.
    #[arg(long)]
    upload_prefix: Option<String>,

    /// Disable the upload endpoint.
    #[arg(long)]
    no_uploads: bool,
}

impl ServeArgs {
    fn apply(self, cfg: &mut Config) {
        if let Some(addr) = self.listen {
            cfg.listen = Listen::Tcp(addr);
        }
        if let Some(path) = self.socket {
            cfg.listen = Listen::Unix(path);
        }
        if let Some(root) = self.root {
            cfg.root = root;
        }
        if let Some(prefix) = self.read_prefix {
            cfg.read_prefix = config::normalize_prefix(&prefix);
        }
        if let Some(prefix) = self.upload_prefix {
            cfg.upload_prefix = config::normalize_prefix(&prefix);
        }
        if self.no_uploads {
            cfg.uploads_enabled = false;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.quiet {
        "warn"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("MODVAULT_LOG").unwrap_or_else(|_| default_level.into()))
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Pwhash { passwords } => {
            for pw in passwords {
                println!("{}", auth::password::hash_password(&pw)?);
            }
            Ok(())
        }
        Command::Pack {
            version,
            output,
            dir,
        } => {
            let path = pack::pack(&dir, &version, output.as_deref())?;
            println!("{}", path.display());
            Ok(())
        }
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut cfg = Config::load()?;
    args.apply(&mut cfg);
    cfg.validate()?;

    let state = AppState::new(cfg.clone())?;
    state.artifacts.ensure_layout().await?;
    tracing::info!(
        root = %cfg.root.display(),
        read_prefix = %cfg.read_prefix,
        upload_prefix = cfg.uploads_enabled.then_some(cfg.upload_prefix.as_str()),
        auth_users = cfg.auth_users.len(),
        "registry configured"
    );
    let app = registry::app(state);

    match &cfg.listen {
        Listen::Tcp(addr) => {
            let addr: SocketAddr = addr
                .parse()
                .with_context(|| format!("invalid listen address {addr}"))?;
            tracing::info!(%addr, "starting modvault");
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to start http listener on {addr}"))?;
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        Listen::Unix(path) => serve_unix(path, cfg.socket_mode, app).await?,
    }

    tracing::info!("modvault stopped");
    Ok(())
}

#[cfg(unix)]
async fn serve_unix(path: &Path, mode: u32, app: axum::Router) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    // A socket file left by an unclean exit blocks bind.
    match std::fs::remove_file(path) {
        Ok(()) => tracing::warn!(path = %path.display(), "removed stale socket"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).context("failed to remove stale socket"),
    }

    let listener = tokio::net::UnixListener::bind(path)
        .with_context(|| format!("failed to start unix socket listener at {}", path.display()))?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .with_context(|| format!("failed to set socket mode {mode:o}"))?;
    tracing::info!(path = %path.display(), mode = %format!("{mode:o}"), "starting modvault");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    let _ = std::fs::remove_file(path);
    result.map_err(Into::into)
}

#[cfg(not(unix))]
async fn serve_unix(path: &Path, _mode: u32, _app: axum::Router) -> anyhow::Result<()> {
    anyhow::bail!("unix sockets are not supported here: {}", path.display())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received, draining requests");
}
