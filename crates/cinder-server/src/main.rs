use clap::Parser;
use tracing::error;

use cinder_server::config::ServerConfig;
use cinder_server::dispatch::Server;
use cinder_server::server;

/// In-memory key-value server with AOF persistence, transactions, and
/// pub/sub.
#[derive(Parser, Debug)]
#[command(name = "cinder-server", version, about)]
struct Args {
    /// Listen address.
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Listen port.
    #[arg(long, default_value_t = 6399)]
    port: u16,

    /// Number of logical databases.
    #[arg(long, default_value_t = 16)]
    databases: usize,

    /// Require AUTH with this password.
    #[arg(long, default_value = "")]
    password: String,

    /// Enable the append-only file.
    #[arg(long)]
    appendonly: bool,

    /// AOF path.
    #[arg(long, default_value = "dump.aof")]
    aof_filename: String,

    /// AOF fsync policy: always, everysec, or no.
    #[arg(long, default_value = "everysec")]
    aof_fsync: String,

    /// Enable the periodic auto-rewrite check.
    #[arg(long)]
    auto_aof_rewrite: bool,

    /// Rewrite when the AOF grows past this percentage of its
    /// post-rewrite size.
    #[arg(long, default_value_t = 100)]
    auto_aof_rewrite_percentage: u64,

    /// Minimum AOF size (MiB) before auto-rewrite acts.
    #[arg(long, default_value_t = 16)]
    auto_aof_rewrite_min_size: u64,

    /// Roll back transactions on the first failing command.
    #[arg(long)]
    open_atomic_tx: bool,

    /// Idle seconds before a client connection is closed.
    #[arg(long, default_value_t = 300)]
    keepalive: u64,

    /// Cluster peer addresses (accepted, currently unused).
    #[arg(long)]
    peers: Vec<String>,

    /// This node's advertised address (accepted, currently unused).
    #[arg(long, default_value = "")]
    self_addr: String,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            bind: args.bind,
            port: args.port,
            databases: args.databases,
            password: args.password,
            append_only: args.appendonly,
            aof_filename: args.aof_filename,
            aof_fsync: args.aof_fsync,
            auto_aof_rewrite: args.auto_aof_rewrite,
            auto_aof_rewrite_percentage: args.auto_aof_rewrite_percentage,
            auto_aof_rewrite_min_size: args.auto_aof_rewrite_min_size,
            open_atomic_tx: args.open_atomic_tx,
            keepalive: args.keepalive,
            peers: args.peers,
            self_addr: args.self_addr,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cinder=info".into()),
        )
        .init();

    let config: ServerConfig = Args::parse().into();

    let instance = match Server::new(config) {
        Ok(server) => server,
        Err(e) => {
            error!("startup failed: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = server::run(instance).await {
        error!("server error: {e}");
        std::process::exit(1);
    }
}
