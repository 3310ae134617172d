// MIT License - Copyright (c) 2026 Peter Wright
// Interactive panel console

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use evl_bridge::commands::{self, CodeSupplier};
use evl_bridge::{
    Command, ConnectionConfig, ConnectionState, DscPanel, EvlConnection, EvlError, PanicType,
};

const PASSWORD_ENV: &str = "EVL_PASSWORD";
const CODE_ENV: &str = "EVL_CODE";

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "evl-console")]
#[command(about = "Interactive console for a DSC panel behind an Envisalink TPI")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<String>,

    /// Interface module host, overrides the config file
    #[arg(long)]
    host: Option<String>,

    /// TPI port, overrides the config file
    #[arg(long)]
    port: Option<u16>,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct Config {
    #[serde(default)]
    panel: PanelToml,
}

#[derive(Debug, Deserialize)]
struct PanelToml {
    #[serde(default)]
    host: Option<String>,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_connect_timeout")]
    connect_timeout_secs: u64,
    #[serde(default = "default_login_timeout")]
    login_timeout_secs: u64,
    #[serde(default = "default_ack_timeout")]
    ack_timeout_ms: u64,
    #[serde(default = "default_event_log_capacity")]
    event_log_capacity: usize,
    #[serde(default = "default_notification_capacity")]
    notification_capacity: usize,
    #[serde(default = "default_flow_timeout")]
    flow_timeout_secs: u64,
    #[serde(default = "default_connect_retries")]
    max_connect_retries: u32,
    #[serde(default = "default_reconnect_delay")]
    reconnect_delay_ms: u64,
}

impl Default for PanelToml {
    fn default() -> Self {
        Self {
            host: None,
            port: default_port(),
            connect_timeout_secs: default_connect_timeout(),
            login_timeout_secs: default_login_timeout(),
            ack_timeout_ms: default_ack_timeout(),
            event_log_capacity: default_event_log_capacity(),
            notification_capacity: default_notification_capacity(),
            flow_timeout_secs: default_flow_timeout(),
            max_connect_retries: default_connect_retries(),
            reconnect_delay_ms: default_reconnect_delay(),
        }
    }
}

fn default_port() -> u16 {
    evl_bridge::constants::DEFAULT_PORT
}
fn default_connect_timeout() -> u64 {
    60
}
fn default_login_timeout() -> u64 {
    30
}
fn default_ack_timeout() -> u64 {
    100
}
fn default_event_log_capacity() -> usize {
    100
}
fn default_notification_capacity() -> usize {
    evl_bridge::constants::NOTIFICATION_CAPACITY
}
fn default_flow_timeout() -> u64 {
    evl_bridge::constants::FLOW_TIMEOUT.as_secs()
}
fn default_connect_retries() -> u32 {
    3
}
fn default_reconnect_delay() -> u64 {
    2000
}

fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&text).context("Failed to parse config file")
        }
        None => Ok(Config::default()),
    }
}

fn build_connection_config(panel: &PanelToml, cli: &Cli) -> Result<ConnectionConfig> {
    let host = cli
        .host
        .clone()
        .or_else(|| panel.host.clone())
        .context("No panel host given (use --host or [panel] host in the config file)")?;
    Ok(ConnectionConfig::builder()
        .host(host)
        .port(cli.port.unwrap_or(panel.port))
        .connect_timeout(Duration::from_secs(panel.connect_timeout_secs))
        .login_timeout(Duration::from_secs(panel.login_timeout_secs))
        .ack_timeout(Duration::from_millis(panel.ack_timeout_ms))
        .event_log_capacity(panel.event_log_capacity)
        .notification_capacity(panel.notification_capacity)
        .flow_timeout(Duration::from_secs(panel.flow_timeout_secs))
        .build())
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Open the session, retrying transient failures with exponential backoff.
async fn connect(
    config: &ConnectionConfig,
    password: &str,
    panel: &DscPanel,
    max_retries: u32,
    base_delay_ms: u64,
) -> Result<EvlConnection, EvlError> {
    let mut attempt = 0;
    loop {
        let password = password.to_string();
        match EvlConnection::open(config, move || password, panel.clone()).await {
            Ok(conn) => return Ok(conn),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                attempt += 1;
                let delay_ms = base_delay_ms * (1 << (attempt - 1).min(4));
                warn!(
                    "Connection attempt {} failed ({}), retrying in {:.1}s...",
                    attempt,
                    e,
                    delay_ms as f64 / 1000.0
                );
                sleep(Duration::from_millis(delay_ms)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

fn arm_code() -> CodeSupplier {
    Arc::new(|| std::env::var(CODE_ENV).unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

const HELP: &str = "\
commands:
  status | poll                  request a status report / poll the panel
  leds | alarms | troubles       show keypad LEDs, active alarms, active troubles
  zones | open | problems        show all zones, open zones, zones with problems
  zone <id> | partition <id>     show one zone or partition
  partitions                     show all partitions
  arm <p> | stay <p>             away/stay arm (code from EVL_CODE)
  disarm <p> <code>              disarm a partition
  panic fire|ambulance|police    trigger a panic alarm
  keys <p> <keys>                send keystrokes to a partition
  exit";

fn arg<T: std::str::FromStr>(args: &[&str], index: usize, name: &str) -> Result<T> {
    let raw = args
        .get(index)
        .with_context(|| format!("missing <{}>", name))?;
    raw.parse()
        .map_err(|_| anyhow::anyhow!("invalid <{}>: {}", name, raw))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

/// Run one console command. Returns false when the console should exit.
async fn run_command(line: &str, conn: &EvlConnection, panel: &DscPanel) -> Result<bool> {
    let args: Vec<&str> = line.split_whitespace().collect();
    let Some(command) = args.first() else {
        return Ok(true);
    };

    match command.to_ascii_lowercase().as_str() {
        "exit" | "quit" => return Ok(false),
        "help" => println!("{}", HELP),
        "status" => conn.send(&Command::StatusReport.to_packet()?).await?,
        "poll" => conn.send(&Command::Poll.to_packet()?).await?,
        "leds" => println!("{}", panel.keypad_leds().await.to_json()),
        "alarms" => print_json(&panel.active_alarms().await)?,
        "troubles" => print_json(&panel.active_troubles().await)?,
        "open" => print_json(&panel.open_zones().await)?,
        "problems" => print_json(&panel.problem_zones().await)?,
        "zones" => {
            for zone in panel.zones().await {
                println!("{}", zone.to_json());
            }
        }
        "zone" => {
            let id: u16 = arg(&args, 1, "id")?;
            match panel.zone(id).await {
                Some(zone) => println!("{}", zone.to_json()),
                None => println!("zone {} not seen yet", id),
            }
        }
        "partitions" => {
            for partition in panel.partitions().await {
                println!("{}", partition.to_json());
            }
        }
        "partition" => {
            let id: u8 = arg(&args, 1, "id")?;
            match panel.partition(id).await {
                Some(partition) => {
                    println!("{}", partition.to_json());
                    for event in &partition.events {
                        print_json(event)?;
                    }
                }
                None => println!("partition {} not seen yet", id),
            }
        }
        "arm" => {
            let partition: u8 = arg(&args, 1, "p")?;
            conn.send_flow(commands::away_arm(partition, arm_code())?).await?;
        }
        "stay" => {
            let partition: u8 = arg(&args, 1, "p")?;
            conn.send_flow(commands::stay_arm(partition, arm_code())?).await?;
        }
        "disarm" => {
            let partition: u8 = arg(&args, 1, "p")?;
            let code: String = arg(&args, 2, "code")?;
            conn.send(&Command::Disarm { partition, code }.to_packet()?).await?;
        }
        "panic" => {
            let kind: PanicType = arg(&args, 1, "fire|ambulance|police")?;
            conn.send(&Command::Panic(kind).to_packet()?).await?;
        }
        "keys" => {
            let partition: u8 = arg(&args, 1, "p")?;
            let keys: String = arg(&args, 2, "keys")?;
            conn.send(&Command::SendKeys { partition, keys }.to_packet()?).await?;
        }
        other => bail!("unknown command '{}', try 'help'", other),
    }
    Ok(true)
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=evl_bridge=debug). Default: info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // Logs go to stderr so stdout stays a clean stream of JSON lines
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt()
            .without_time()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let conn_config = build_connection_config(&config.panel, &cli)?;
    let password = std::env::var(PASSWORD_ENV)
        .with_context(|| format!("{} is not set", PASSWORD_ENV))?;

    let panel = DscPanel::from_config(&conn_config);
    let mut notifications = panel.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(n) => println!("{}", n.to_json()),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Dropped {} notifications", missed);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let conn = connect(
        &conn_config,
        &password,
        &panel,
        config.panel.max_connect_retries,
        config.panel.reconnect_delay_ms,
    )
    .await
    .context("Failed to connect to panel")?;
    info!("Connected to {}", conn_config.address());

    if let Err(e) = conn.send(&Command::StatusReport.to_packet()?).await {
        warn!("Status report request failed: {}", e);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut state = conn.watch_state();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down...");
                break;
            }
            changed = state.changed() => {
                if changed.is_err() || *state.borrow() != ConnectionState::Ready {
                    error!("Connection to panel lost");
                    break;
                }
            }
            line = lines.next_line() => match line? {
                Some(line) => match run_command(&line, &conn, &panel).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => eprintln!("error: {:#}", e),
                },
                None => break,
            },
        }
    }

    conn.close().await;
    panel.close().await;
    printer.abort();
    info!("Shutdown complete");
    Ok(())
}
