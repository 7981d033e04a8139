use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use ogn_client::client_config::{ClientConfigFile, client_config_path};
use ogn_client::log_format::init_logging;
use ogn_client::{AprsClient, AprsClientConfig, ReceiveOptions, Received, TcpTransport};

#[derive(Parser, Debug)]
#[command(
    name = "ogn-client",
    version,
    about = "Stream Open Glider Network APRS traffic and print each message as a JSON line."
)]
struct Args {
    /// Config file (default: $OGN_CLIENT_CONFIG or ./ogn-client.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// APRS server hostname
    #[arg(long)]
    server: Option<String>,
    /// APRS server port (default: 10152, or 14580 with a filter)
    #[arg(long)]
    port: Option<u16>,
    /// Callsign used to log in
    #[arg(long)]
    callsign: Option<String>,
    /// APRS-IS passcode; -1 logs in as a guest
    #[arg(long, allow_hyphen_values = true)]
    passcode: Option<String>,
    /// Server-side filter expression, e.g. r/49.0/14.5/200
    #[arg(long)]
    filter: Option<String>,
    /// Print raw lines instead of decoded JSON
    #[arg(long, default_value_t = false)]
    raw: bool,
    /// Exit instead of reconnecting when the connection drops
    #[arg(long, default_value_t = false)]
    no_reconnect: bool,
    /// Reconnect attempts before giving up
    #[arg(long)]
    max_retries: Option<u32>,
}

impl Args {
    /// Config file values, overridden by any flags given on the command line
    fn client_config(&self) -> Result<AprsClientConfig> {
        let path = self.config.clone().unwrap_or_else(client_config_path);
        let mut config = match ClientConfigFile::load_optional(&path)? {
            Some(file) => {
                info!("Loaded client config from {:?}", path);
                AprsClientConfig::from(file)
            }
            None if self.config.is_some() => {
                anyhow::bail!("Config file {:?} does not exist", path);
            }
            None => AprsClientConfig::default(),
        };

        if let Some(server) = &self.server {
            config.server = server.clone();
        }
        if self.port.is_some() {
            config.port = self.port;
        }
        if let Some(callsign) = &self.callsign {
            config.callsign = callsign.clone();
        }
        if let Some(passcode) = &self.passcode {
            config.passcode = passcode.clone();
        }
        if self.filter.is_some() {
            config.filter = self.filter.clone();
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        Ok(config)
    }
}

fn print_message(received: Received) {
    let line = match received {
        Received::Raw(line) => line,
        Received::Decoded(message) => match serde_json::to_string(&message) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize message from {}: {}", message.origin, e);
                return;
            }
        },
    };

    let mut stdout = std::io::stdout().lock();
    if let Err(e) = writeln!(stdout, "{}", line) {
        error!("Failed to write to stdout: {}", e);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(std::io::IsTerminal::is_terminal(&std::io::stderr()));

    let args = Args::parse();
    let config = args.client_config()?;
    let options = ReceiveOptions {
        reconnect: !args.no_reconnect,
        raw: args.raw,
    };

    let mut client = AprsClient::new(config, TcpTransport::new());
    let shutdown = client.shutdown_handle();

    client
        .connect()
        .await
        .context("Failed to connect to APRS server")?;

    let result = tokio::select! {
        result = client.receive(print_message, options) => result,
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Received SIGINT (Ctrl+C), shutting down..."),
                Err(err) => error!("Failed to listen for SIGINT signal: {}", err),
            }
            shutdown.shutdown();
            Ok(())
        }
    };

    client.disconnect().await;
    result.context("APRS session failed")?;
    info!("OGN client stopped");
    Ok(())
}
