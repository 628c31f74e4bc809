//! `teleop` – operator console for the teleop pipeline.
//!
//! 1. Loads `~/.teleop/config.toml`, writing the defaults on first run.
//! 2. Connects to the robot's rosbridge server, or to the in-memory simulator
//!    with `--sim` (every frame is echoed to the terminal).
//! 3. Mounts the configured control surface and drops into the REPL.
//! 4. On `/quit`, Ctrl-C, Ctrl-D or SIGTERM the surface is unmounted, which
//!    publishes a final stop before the topic is unadvertised.

mod config;
mod repl;

use std::io::Write;
use std::sync::Arc;

use colored::Colorize;
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

use config::{Config, TransportKind};
use teleop_middleware::{RosbridgeTransport, SimFrame, SimTransport, Transport};
use teleop_runtime::SurfaceKind;
use teleop_runtime::telemetry::init_tracing;

#[derive(Debug, Default, PartialEq)]
struct Args {
    sim: bool,
    surface: Option<SurfaceKind>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args, String> {
    let mut parsed = Args::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--sim" => parsed.sim = true,
            "--surface" => {
                let kind = args.next().ok_or("--surface needs a value")?;
                parsed.surface = Some(kind.parse().map_err(|e| format!("{e}"))?);
            }
            other => return Err(format!("unexpected argument '{other}'")),
        }
    }
    Ok(parsed)
}

fn main() {
    let _telemetry = init_tracing("teleop");

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{} {}", "Error:".red(), e);
            eprintln!("usage: teleop [--sim] [--surface <kind>]");
            std::process::exit(2);
        }
    };

    print_banner();

    let mut cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", config::config_path().display().to_string().bold());
            cfg
        }
        Ok(None) => {
            let cfg = Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  Wrote default config to {}",
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Could not save config".yellow(), e),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            Config::default()
        }
    };
    if args.sim {
        cfg.transport = TransportKind::Sim;
    }
    if let Some(kind) = args.surface {
        cfg.surface.kind = kind;
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start runtime".red(), e);
            std::process::exit(1);
        }
    };
    runtime.block_on(run(cfg));
}

async fn run(cfg: Config) {
    let transport: Arc<dyn Transport> = match cfg.transport {
        TransportKind::Sim => {
            let sim = Arc::new(SimTransport::default());
            echo_frames(sim.subscribe());
            println!("  Transport: {}", "simulator".yellow());
            sim
        }
        TransportKind::Rosbridge => {
            print!("  Connecting to {} … ", cfg.rosbridge_url.dimmed());
            let _ = std::io::stdout().flush();
            match RosbridgeTransport::connect(cfg.rosbridge_url.as_str()).await {
                Ok(ws) => {
                    println!("{}", "connected".green());
                    Arc::new(ws)
                }
                Err(e) => {
                    println!("{}", "failed".red());
                    println!("  {e}");
                    println!("  Run with {} to drive the simulator instead.", "--sim".bold());
                    return;
                }
            }
        }
    };

    let host = match repl::Host::mount(transport, cfg.surface.clone()) {
        Ok(host) => host,
        Err(e) => {
            println!("{}: {}", "Cannot mount surface".red(), e);
            return;
        }
    };
    println!("  Surface: {}", cfg.surface.kind.to_string().bold());
    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // Ctrl-C at the prompt reaches the line editor; this covers signals.
    let (signal_tx, signal_rx) = mpsc::unbounded_channel();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = signal_tx.send(());
    }) {
        warn!(error = %e, "failed to install signal handler; SIGTERM will not stop the robot");
    }

    repl::run(host, signal_rx).await;
}

/// Print simulator traffic as it happens.
fn echo_frames(mut frames: broadcast::Receiver<teleop_middleware::SentFrame>) {
    tokio::spawn(async move {
        loop {
            match frames.recv().await {
                Ok(sent) => match sent.frame {
                    SimFrame::Advertise { topic, message_type } => {
                        println!("  {} {} [{}]", "advertise".cyan(), topic.bold(), message_type.dimmed())
                    }
                    SimFrame::Unadvertise { topic } => println!("  {} {}", "unadvertise".cyan(), topic.bold()),
                    SimFrame::Publish { topic, message } => {
                        println!("  {} {} {}", "publish".green(), topic.bold(), message)
                    }
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "simulator echo fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn print_banner() {
    println!();
    println!("{}", "  ████████╗███████╗██╗     ███████╗ ██████╗ ██████╗ ".bold().cyan());
    println!("{}", "  ╚══██╔══╝██╔════╝██║     ██╔════╝██╔═══██╗██╔══██╗".bold().cyan());
    println!("{}", "     ██║   █████╗  ██║     █████╗  ██║   ██║██████╔╝".bold().cyan());
    println!("{}", "     ██║   ██╔══╝  ██║     ██╔══╝  ██║   ██║██╔═══╝ ".bold().cyan());
    println!("{}", "     ██║   ███████╗███████╗███████╗╚██████╔╝██║     ".bold().cyan());
    println!("{}", "     ╚═╝   ╚══════╝╚══════╝╚══════╝ ╚═════╝ ╚═╝     ".bold().cyan());
    println!();
    println!("  {}", "Robot teleoperation console".dimmed());
    println!();
}
