//! REPL – the operator's interactive shell.
//!
//! Supported slash-commands:
//!   /move <control> <x> <y> [size] – pointer sample on a stick
//!   /press <control>               – button down (held until released)
//!   /release <control>             – button or stick up
//!   /leave <control>               – pointer left the control
//!   /say <phrase…>                 – voice input
//!   /speed [slow|normal|fast]      – set (or cycle) the speed mode
//!   /frame <world|tool>            – jog reference frame
//!   /surface <kind>                – switch surface (unmount + mount)
//!   /state                         – show the live command state
//!   /help                          – show this list
//!   /quit | /exit                  – stop the robot and exit
//!
//! Lines are read by `rustyline` on a dedicated thread so the surface actor
//! keeps running (held controls keep resending) while the prompt waits.

use std::sync::Arc;
use std::sync::mpsc as std_mpsc;

use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;
use tracing::{info, warn};

use teleop_kernel::LifecyclePhase;
use teleop_middleware::Transport;
use teleop_runtime::{SurfaceEvent, SurfaceHandle, SurfaceKind, SurfaceSettings, SurfaceSnapshot};
use teleop_types::{PointerSample, ReferenceFrame, SpeedMode};

// ─────────────────────────────────────────────────────────────────────────────
// Command parsing
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Move { control: String, sample: PointerSample },
    Press(String),
    Release(String),
    Leave(String),
    Say(String),
    /// `None` cycles to the next mode.
    Speed(Option<SpeedMode>),
    Frame(ReferenceFrame),
    Surface(SurfaceKind),
    State,
    Help,
    Quit,
}

/// Parse one input line.  Blank lines yield `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<ReplCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let one = |usage: &str| -> Result<String, String> {
        match args.as_slice() {
            [control] => Ok((*control).to_string()),
            _ => Err(format!("usage: {usage}")),
        }
    };
    let number = |raw: &str| -> Result<f64, String> {
        raw.parse::<f64>().map_err(|_| format!("'{raw}' is not a number"))
    };

    let cmd = match head {
        "/move" => match args.as_slice() {
            [control, x, y] => ReplCommand::Move {
                control: (*control).to_string(),
                sample: PointerSample::normalized(number(x)?, number(y)?),
            },
            [control, x, y, size] => ReplCommand::Move {
                control: (*control).to_string(),
                sample: PointerSample::new(number(x)?, number(y)?, number(size)?),
            },
            _ => return Err("usage: /move <control> <x> <y> [size]".to_string()),
        },
        "/press" => ReplCommand::Press(one("/press <control>")?),
        "/release" => ReplCommand::Release(one("/release <control>")?),
        "/leave" => ReplCommand::Leave(one("/leave <control>")?),
        "/say" if !args.is_empty() => ReplCommand::Say(args.join(" ")),
        "/say" => return Err("usage: /say <phrase>".to_string()),
        "/speed" => match args.as_slice() {
            [] => ReplCommand::Speed(None),
            [mode] => ReplCommand::Speed(Some(mode.parse().map_err(|e| format!("{e}"))?)),
            _ => return Err("usage: /speed [slow|normal|fast]".to_string()),
        },
        "/frame" => ReplCommand::Frame(one("/frame <world|tool>")?.parse().map_err(|e| format!("{e}"))?),
        "/surface" => ReplCommand::Surface(one("/surface <kind>")?.parse().map_err(|e| format!("{e}"))?),
        "/state" => ReplCommand::State,
        "/help" => ReplCommand::Help,
        "/quit" | "/exit" => ReplCommand::Quit,
        other => return Err(format!("unknown command '{other}'")),
    };
    Ok(Some(cmd))
}

// ─────────────────────────────────────────────────────────────────────────────
// Host
// ─────────────────────────────────────────────────────────────────────────────

/// Owns the single mounted surface.
pub struct Host {
    transport: Arc<dyn Transport>,
    settings: SurfaceSettings,
    surface: Option<SurfaceHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

impl Host {
    pub fn mount(transport: Arc<dyn Transport>, settings: SurfaceSettings) -> Result<Self, teleop_types::TeleopError> {
        let surface = SurfaceHandle::spawn(&settings, Arc::clone(&transport))?;
        info!(surface = %settings.kind, "surface mounted");
        Ok(Self {
            transport,
            settings,
            surface: Some(surface),
        })
    }

    pub fn snapshot(&self) -> Option<SurfaceSnapshot> {
        self.surface.as_ref().map(SurfaceHandle::snapshot)
    }

    fn send(&self, event: SurfaceEvent) {
        let Some(surface) = &self.surface else {
            println!("{}", "No surface mounted. Use /surface <kind>.".yellow());
            return;
        };
        if let Err(e) = surface.send(event) {
            println!("{}: {}", "Surface unavailable".red(), e);
        }
    }

    /// Unmount the current surface, waiting for its final stop.
    pub async fn unmount(&mut self) {
        let Some(surface) = self.surface.take() else {
            return;
        };
        match surface.unmount().await {
            Ok(Some(report)) if report.flushed => {
                println!("  {} stop command sent", "✓".green());
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "unmount failed"),
        }
    }

    async fn switch(&mut self, kind: SurfaceKind) {
        self.unmount().await;
        let settings = SurfaceSettings {
            kind,
            ..self.settings.clone()
        };
        match SurfaceHandle::spawn(&settings, Arc::clone(&self.transport)) {
            Ok(surface) => {
                self.surface = Some(surface);
                self.settings = settings;
                println!("  Mounted {}", kind.to_string().bold());
            }
            Err(e) => println!("{}: {}", "Cannot mount surface".red(), e),
        }
    }

    pub async fn execute(&mut self, cmd: ReplCommand) -> Flow {
        match cmd {
            ReplCommand::Move { control, sample } => self.send(SurfaceEvent::Move { control, sample }),
            ReplCommand::Press(control) => self.send(SurfaceEvent::Press { control }),
            ReplCommand::Release(control) => self.send(SurfaceEvent::Release { control }),
            ReplCommand::Leave(control) => self.send(SurfaceEvent::Leave { control }),
            ReplCommand::Say(phrase) => self.send(SurfaceEvent::Phrase(phrase)),
            ReplCommand::Speed(Some(mode)) => self.send(SurfaceEvent::SetSpeedMode(mode)),
            ReplCommand::Speed(None) => self.send(SurfaceEvent::CycleSpeedMode),
            ReplCommand::Frame(frame) => self.send(SurfaceEvent::SetReferenceFrame(frame)),
            ReplCommand::Surface(kind) => self.switch(kind).await,
            ReplCommand::State => {
                // Let the actor drain queued events first.
                tokio::task::yield_now().await;
                match self.snapshot() {
                    Some(snapshot) => print_snapshot(&snapshot),
                    None => println!("{}", "No surface mounted.".yellow()),
                }
            }
            ReplCommand::Help => print_help(),
            ReplCommand::Quit => {
                self.unmount().await;
                println!("{}", "Goodbye.".green());
                return Flow::Quit;
            }
        }
        Flow::Continue
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Loop
// ─────────────────────────────────────────────────────────────────────────────

enum InputLine {
    Line(String),
    Interrupted,
    Eof,
}

/// Blocking reader.  Waits for an ack after each line so command output is
/// printed before the next prompt.
fn spawn_reader(lines: mpsc::UnboundedSender<InputLine>, acks: std_mpsc::Receiver<()>) {
    std::thread::spawn(move || {
        let mut editor = match DefaultEditor::new() {
            Ok(editor) => editor,
            Err(e) => {
                eprintln!("{}: {}", "Terminal error".red(), e);
                let _ = lines.send(InputLine::Eof);
                return;
            }
        };
        let prompt = format!("{} ", "teleop>".bold().cyan());
        loop {
            let input = match editor.readline(&prompt) {
                Ok(line) => {
                    let _ = editor.add_history_entry(line.as_str());
                    InputLine::Line(line)
                }
                Err(ReadlineError::Interrupted) => InputLine::Interrupted,
                Err(ReadlineError::Eof) => InputLine::Eof,
                Err(e) => {
                    eprintln!("{}: {}", "Read error".red(), e);
                    InputLine::Eof
                }
            };
            let last = !matches!(input, InputLine::Line(_));
            if lines.send(input).is_err() || last || acks.recv().is_err() {
                break;
            }
        }
    });
}

/// Run the REPL until `/quit`, Ctrl-C, Ctrl-D or a termination signal.
/// The surface is always unmounted (stop flushed) before returning.
pub async fn run(mut host: Host, mut signals: mpsc::UnboundedReceiver<()>) {
    let (line_tx, mut line_rx) = mpsc::unbounded_channel();
    let (ack_tx, ack_rx) = std_mpsc::channel();
    spawn_reader(line_tx, ack_rx);

    loop {
        let input = tokio::select! {
            input = line_rx.recv() => input.unwrap_or(InputLine::Eof),
            _ = signals.recv() => {
                println!();
                println!("{}", "⚠  Termination signal – stopping the robot …".yellow().bold());
                host.unmount().await;
                return;
            }
        };

        let line = match input {
            InputLine::Line(line) => line,
            InputLine::Interrupted | InputLine::Eof => {
                println!("{}", "⚠  Interrupted – stopping the robot …".yellow().bold());
                host.unmount().await;
                return;
            }
        };

        let flow = match parse(&line) {
            Ok(Some(cmd)) => host.execute(cmd).await,
            Ok(None) => Flow::Continue,
            Err(e) => {
                println!("{} {}. Type {} for available commands.", "Error:".red(), e, "/help".bold());
                Flow::Continue
            }
        };
        if flow == Flow::Quit || ack_tx.send(()).is_err() {
            return;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_help() {
    println!();
    println!("{}", "Teleop Commands".bold().underline());
    println!("  {}  – pointer sample on a stick", "/move <control> <x> <y> [size]".bold().cyan());
    println!("  {}               – hold a button", "/press <control>".bold().cyan());
    println!("  {}             – release a button or stick", "/release <control>".bold().cyan());
    println!("  {}               – pointer left the control", "/leave <control>".bold().cyan());
    println!("  {}                  – voice input (stop releases all)", "/say <phrase>".bold().cyan());
    println!("  {}      – set or cycle the speed mode", "/speed [slow|normal|fast]".bold().cyan());
    println!("  {}             – jog reference frame", "/frame <world|tool>".bold().cyan());
    println!("  {}                – switch control surface", "/surface <kind>".bold().cyan());
    println!("  {}                         – live command state", "/state".bold().cyan());
    println!("  {}                  – stop the robot and exit", "/quit  /exit".bold().cyan());
    println!();
    let kinds: Vec<String> = SurfaceKind::ALL.iter().map(ToString::to_string).collect();
    println!("  Surfaces: {}", kinds.join(", ").dimmed());
    println!();
}

fn print_snapshot(s: &SurfaceSnapshot) {
    println!("{}", "Surface State".bold().underline());
    println!("  Surface   : {} on {}", s.kind.to_string().bold(), s.topic.yellow());
    let phase = match s.phase {
        LifecyclePhase::Active => s.phase.to_string().green(),
        LifecyclePhase::Uninitialized => s.phase.to_string().yellow(),
        LifecyclePhase::TornDown => s.phase.to_string().red(),
    };
    let connected = if s.connected { "connected".green() } else { "disconnected".red() };
    println!("  Phase     : {} ({})", phase.bold(), connected);
    println!("  Speed     : {}   Frame: {}", s.speed_mode.to_string().yellow(), s.frame.to_string().yellow());
    if !s.held.is_empty() {
        println!("  Held      : {}", s.held.join(", ").bold());
    }
    println!("  Published : {}", s.published);
    for (channel, value) in s.state.iter().filter(|(_, v)| *v != 0.0) {
        println!("    {:<10} {:+.3}", channel.to_string(), value);
    }
    if s.state.is_neutral() {
        println!("    {}", "(neutral)".dimmed());
    }
}
