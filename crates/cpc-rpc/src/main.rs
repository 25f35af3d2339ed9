//! CPC RPC Bridge - JSON-RPC backend for hosts that embed the panel out of process.
//!
//! The host shell owns the panel frame. This binary drives it over
//! stdin/stdout JSON lines (see [`stdio`]) and exposes the panel commands as
//! JSON-RPC 2.0 methods on a local HTTP port.

mod handler;
mod params;
mod server;
mod stdio;

use anyhow::Result;
use clap::Parser;
use cpc_core::{CommunicationPanel, LoadConfig};
use std::sync::Arc;
use stdio::{BridgeLine, LineWriter, StdioMount};
use tokio::io::BufReader;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "cpc-rpc")]
#[command(about = "JSON-RPC bridge for the Communication Panel")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Enable debug logging, including the panel's own debug mode
    #[arg(short, long)]
    debug: bool,

    /// Tenant base URL, e.g. https://tenant.example.com
    #[arg(long, env = "CPC_TENANT_BASE_URL")]
    tenant_base_url: String,

    /// OAuth token for inline login
    #[arg(long, env = "CPC_OAUTH_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// User name for inline basic login
    #[arg(long, env = "CPC_USER_NAME")]
    user_name: Option<String>,

    /// Password for inline basic login
    #[arg(long, env = "CPC_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Hide the panel's popout button
    #[arg(long)]
    deny_popout: bool,

    /// Responsive panel layout
    #[arg(long)]
    responsive: bool,

    #[arg(long)]
    min_width: Option<u32>,

    #[arg(long)]
    min_height: Option<u32>,

    /// Forward channel_status state events
    #[arg(long)]
    channel_status: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    cpc_core::logging::init(args.debug);
    info!("Starting CPC RPC Bridge");

    let (writer, writer_task) = LineWriter::spawn(tokio::io::stdout());

    let mut builder = LoadConfig::builder(
        args.tenant_base_url.as_str(),
        stdio::event_forwarder(writer.clone()),
        Arc::new(StdioMount::new(writer.clone())),
    )
    .enable_debug_log(args.debug)
    .deny_popout(args.deny_popout)
    .responsive(args.responsive)
    .enable_channel_status_updates(args.channel_status);
    if let Some(width) = args.min_width {
        builder = builder.min_width(width);
    }
    if let Some(height) = args.min_height {
        builder = builder.min_height(height);
    }
    builder = match (args.token, args.user_name, args.password) {
        (Some(token), _, _) => builder.oauth_token(token),
        (None, Some(user), Some(password)) => builder.basic_credentials(user, password),
        (None, Some(_), None) | (None, None, Some(_)) => {
            warn!("Basic login needs both --user-name and --password, skipping inline login");
            builder
        }
        (None, None, None) => builder,
    };

    let panel = Arc::new(CommunicationPanel::load(builder.build()?).await?);

    let addr = server::start_server(panel.clone(), &args.host, args.port).await?;
    // The shell reads the port from this line.
    writer.write(BridgeLine::RpcPort { port: addr.port() });
    info!("RPC server running on {}", addr);

    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = stdio::run_reader(stdin, panel.clone(), writer.clone()) => {
            result?;
            info!("Shell disconnected, exiting");
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutdown signal received, exiting");
        }
    }

    drop(writer);
    drop(panel);
    writer_task.abort();
    Ok(())
}
