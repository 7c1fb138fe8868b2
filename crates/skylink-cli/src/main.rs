use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use skylink_core::{doctor, DispatchOutcome, Link, LinkConfig};
use skylink_proto::Mode;

mod console;
mod operator;

use console::ConsoleObserver;
use operator::OperatorCmd;

#[derive(Debug, Parser)]
#[command(name = "skylink", version, about = "SkyLink - LoRa ground link for drone telemetry and mode commands")]
struct Cli {
    /// TOML config; built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override serial.dev
    #[arg(long)]
    dev: Option<String>,

    /// Override serial.baud
    #[arg(long)]
    baud: Option<u32>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the configuration.
    Doctor,
    /// Open the radio, start a session and stream notifications as JSON lines.
    /// Operator commands are read from stdin (`help` lists them).
    Run {
        /// JSON array of {lat, lon, alt?} uploaded right after start.
        #[arg(long)]
        waypoints: Option<PathBuf>,
    },
    /// Request one flight mode and wait for the drone to acknowledge it.
    Mode {
        /// offboard | land
        mode: Mode,
    },
    /// Upload a waypoint file (JSON array of {lat, lon, alt?}) and stop.
    Waypoints { file: PathBuf },
}

#[derive(Debug, Default, serde::Deserialize)]
struct Config {
    #[serde(flatten)]
    link: LinkConfig,
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        info!("config: none given, using defaults");
        return Ok(Config::default());
    };
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    toml::from_str(&s).with_context(|| format!("parse config toml {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut cfg = load_config(cli.config.as_deref())?;
    if let Some(dev) = cli.dev {
        cfg.link.serial.dev = dev;
    }
    if let Some(baud) = cli.baud {
        cfg.link.serial.baud = baud;
    }

    match cli.cmd {
        Command::Doctor => doctor_cmd(&cfg)?,
        Command::Run { waypoints } => run(&cfg, waypoints.as_deref()).await?,
        Command::Mode { mode } => mode_once(&cfg, mode).await?,
        Command::Waypoints { file } => waypoints_once(&cfg, &file).await?,
    }
    Ok(())
}

fn doctor_cmd(cfg: &Config) -> Result<()> {
    info!("doctor: starting");
    doctor::check_link(&cfg.link)?;

    let dev = Path::new(&cfg.link.serial.dev);
    if !dev.exists() {
        warn!("doctor: {} does not exist (radio unplugged?)", dev.display());
    }

    info!("doctor: OK");
    Ok(())
}

fn read_waypoint_file(path: &Path) -> Result<Vec<serde_json::Value>> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read waypoints {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parse waypoints {} (expected a JSON array)", path.display()))
}

async fn upload_waypoints(link: &Link, path: &Path) -> Result<()> {
    let entries = read_waypoint_file(path)?;
    let n = link.submit_waypoints(&entries);
    info!("waypoints: {} of {} accepted from {}", n, entries.len(), path.display());
    let sent = link.send_waypoints().await.context("send waypoints")?;
    info!("waypoints: {} sent", sent);
    Ok(())
}

async fn run(cfg: &Config, waypoints: Option<&Path>) -> Result<()> {
    info!("run: starting");
    let link = connect(cfg).await?;

    if let Some(path) = waypoints {
        if let Err(e) = upload_waypoints(&link, path).await {
            warn!("run: waypoint upload failed: {:#}", e);
        }
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    warn!("run: ctrl-c handler failed: {}", e);
                }
                info!("run: interrupted");
                break;
            }
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match line.parse::<OperatorCmd>() {
                        Ok(OperatorCmd::Stop) => break,
                        Ok(cmd) => operator(&link, cmd).await,
                        Err(e) => warn!("operator: {}", e),
                    }
                }
                Ok(None) => {
                    info!("run: stdin closed, Ctrl-C to stop");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!("run: stdin read failed: {}", e);
                    stdin_open = false;
                }
            },
        }
    }

    link.stop_session().await;
    link.abort_dispatches();
    info!("run: stopped");
    Ok(())
}

async fn connect(cfg: &Config) -> Result<Link> {
    doctor::check_link(&cfg.link).context("config check")?;
    let link = Link::new(cfg.link.clone(), Arc::new(ConsoleObserver));
    link.start_session().await.context("start LoRa session")?;
    Ok(link)
}

async fn mode_once(cfg: &Config, mode: Mode) -> Result<()> {
    let link = connect(cfg).await?;
    let outcome = match link.request_mode(mode).await {
        Ok(handle) => handle.outcome().await,
        Err(e) => {
            link.stop_session().await;
            return Err(e).context("request mode");
        }
    };
    link.stop_session().await;

    match outcome {
        Some(DispatchOutcome::Acked { attempt }) => {
            info!("mode: {} acknowledged on attempt {}", mode.ack_token(), attempt);
            Ok(())
        }
        Some(DispatchOutcome::TimedOut) => anyhow::bail!("mode: {} not acknowledged", mode.ack_token()),
        Some(DispatchOutcome::ChannelClosed) | None => anyhow::bail!("mode: channel closed before {} resolved", mode.ack_token()),
    }
}

async fn waypoints_once(cfg: &Config, path: &Path) -> Result<()> {
    let link = connect(cfg).await?;
    let res = upload_waypoints(&link, path).await;
    link.stop_session().await;
    res
}

async fn operator(link: &Link, cmd: OperatorCmd) {
    match cmd {
        OperatorCmd::Mode(mode) => request_mode(link, mode).await,
        OperatorCmd::Load(path) => {
            match read_waypoint_file(&path) {
                Ok(entries) => {
                    let n = link.submit_waypoints(&entries);
                    println!("waypoints: {} active", n);
                }
                Err(e) => warn!("operator: {:#}", e),
            }
        }
        OperatorCmd::Send => {
            if let Err(e) = link.send_waypoints().await {
                warn!("operator: send waypoints: {}", e);
            }
        }
        OperatorCmd::Remove(index) => match link.remove_waypoint(index) {
            Ok(wp) => println!("removed WP{}: lat={:.6} lon={:.6} alt={:.2}", index, wp.lat, wp.lon, wp.alt),
            Err(e) => warn!("operator: {}", e),
        },
        OperatorCmd::List => {
            for (i, wp) in link.waypoints().iter().enumerate() {
                println!("WP{}: lat={:.6} lon={:.6} alt={:.2}", i + 1, wp.lat, wp.lon, wp.alt);
            }
        }
        OperatorCmd::Status => {
            let st = link.link_state();
            let serial = &link.config().serial;
            println!("dev={} baud={}", serial.dev, serial.baud);
            println!("open={} up={} misses={}", link.is_open().await, st.is_up, st.consecutive_misses);
            println!("last_seen_age={:?}", st.last_seen().map(|t| t.elapsed()));
            if let Some(ack) = link.last_ack() {
                println!("last_ack={} ok={} age={:?} msg={:?}", ack.mode, ack.ok, ack.received_at.elapsed(), ack.message);
            }
        }
        OperatorCmd::Help => println!("{}", operator::HELP),
        OperatorCmd::Stop => {}
    }
}

async fn request_mode(link: &Link, mode: Mode) {
    match link.request_mode(mode).await {
        // the outcome also reaches the console as a mode_ack record
        Ok(handle) => info!("operator: {} requested", handle.mode()),
        Err(e) => warn!("operator: {} not requested: {}", mode.ack_token(), e),
    }
}
