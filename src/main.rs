use clap::{Parser, Subcommand};
use color_eyre::Result;
use tokio_util::sync::CancellationToken;

use tunnel_client::TunnelClient;
use tunnel_core::config::{ClientSettings, ServerSettings};

/// CLI wrapper around the reverse tunnel core. Thin by design — the
/// control-channel protocol, registry, and client state machine do the
/// actual work; this binary only parses flags and wires them into
/// `ServerSettings`/`ClientSettings`.
#[derive(Parser)]
#[command(name = "reverse-tunnel", version, about = "Reverse tunneling service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the edge server.
    Server {
        /// Port to listen on.
        #[arg(long, default_value_t = 3456)]
        port: u16,
        /// Host/interface to bind.
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Base domain that tunnels are served under (`<sub>.<base>`).
        #[arg(long, default_value = "localhost")]
        base_domain: String,
    },
    /// Start a tunnel client, forwarding a public subdomain to a local port.
    Start {
        /// Local port to forward to.
        #[arg(long)]
        port: u16,
        /// Requested subdomain (server assigns one if omitted).
        #[arg(long)]
        subdomain: Option<String>,
        /// Edge server host to connect to.
        #[arg(long, default_value = "localhost")]
        server: String,
        /// Edge server port.
        #[arg(long, default_value_t = 3456)]
        server_port: u16,
        /// Use a TLS (`wss://`) connection to the edge server.
        #[arg(long)]
        secure: bool,
    },
    /// Query an edge server's `/status` endpoint.
    Status {
        /// Edge server host to query.
        #[arg(long, default_value = "localhost")]
        server: String,
        /// Edge server port.
        #[arg(long, default_value_t = 3456)]
        server_port: u16,
    },
}

async fn run_server(port: u16, host: String, base_domain: String) -> Result<()> {
    tunnel_server::init_tracing();
    let settings = ServerSettings {
        host,
        port,
        base_domain,
        ..ServerSettings::default()
    };
    let shutdown = CancellationToken::new();
    tunnel_server::spawn_signal_handler(shutdown.clone());
    tunnel_server::serve(settings, shutdown).await
}

async fn run_start(
    port: u16,
    subdomain: Option<String>,
    server: String,
    server_port: u16,
    secure: bool,
) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tunnel_client=info".into()),
        )
        .init();

    let settings = ClientSettings {
        edge_host: server,
        edge_port: server_port,
        secure,
        local_host: "127.0.0.1".to_string(),
        local_port: port,
        subdomain,
        ..ClientSettings::default()
    };

    let client = TunnelClient::new(settings);
    let mut events = client.events().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            tracing::info!(?event, "tunnel event");
        }
    });

    let shutdown_client = client.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown_client.disconnect();
    });

    client.run().await
}

async fn run_status(server: String, server_port: u16) -> Result<()> {
    let url = format!("http://{server}:{server_port}/status");
    let body = reqwest::get(&url).await?.text().await?;
    println!("{body}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Server { port, host, base_domain } => run_server(port, host, base_domain).await,
        Commands::Start { port, subdomain, server, server_port, secure } => {
            run_start(port, subdomain, server, server_port, secure).await
        }
        Commands::Status { server, server_port } => run_status(server, server_port).await,
    }
}
