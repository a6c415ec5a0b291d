//! scopectl - two-channel serial scope from the terminal
//!
//! Streams readings from the bench board, renders them as a text trace and
//! sends device commands.

mod device;
mod monitor;
mod render;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use scope_link::{CommandFraming, PlotMode, ScopeConfig, SerialSession};
use std::path::PathBuf;

/// Environment prefix for configuration overrides, e.g. `SCOPE_SERIAL__PORT`
const ENV_PREFIX: &str = "SCOPE_";

#[derive(Parser)]
#[command(name = "scopectl")]
#[command(about = "Two-channel serial scope")]
#[command(long_about = "Two-channel serial scope

Acquisition:
  monitor     Stream readings and draw them as a text trace
  ports       List serial ports

Device control:
  send        Send one framed command (text:..., hex:..., byte:N)
  start       Start streaming
  stop        Stop streaming
  freq        Set the sampling frequency value

Examples:
  scopectl monitor --port /dev/ttyACM0 --start
  scopectl --raw-commands freq 40
  SCOPE_SERIAL__BAUD_RATE=115200 scopectl monitor --mode xy")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (yaml, toml or json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Send commands without start/stop markers
    #[arg(long, global = true)]
    raw_commands: bool,
}

/// Where to connect; unset values come from the configuration
#[derive(Args, Debug, Clone)]
struct PortArgs {
    /// Serial port, e.g. /dev/ttyACM0 or COM3
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate
    #[arg(short, long)]
    baud: Option<u32>,
}

impl PortArgs {
    fn resolve(&self, config: &ScopeConfig) -> (String, u32) {
        (
            self.port.clone().unwrap_or_else(|| config.serial.port.clone()),
            self.baud.unwrap_or(config.serial.baud_rate),
        )
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Stream readings until Ctrl+C
    Monitor {
        #[command(flatten)]
        target: PortArgs,

        /// Plot mode: time or xy
        #[arg(short, long)]
        mode: Option<PlotMode>,

        /// Stop after this many readings
        #[arg(short = 'n', long)]
        count: Option<u64>,

        /// Send the start command after connecting
        #[arg(long)]
        start: bool,
    },

    /// Send one framed command
    Send {
        #[command(flatten)]
        target: PortArgs,

        /// Payload: text:<string>, hex:<bytes> or byte:<0-255>
        payload: String,
    },

    /// Tell the device to start streaming
    Start {
        #[command(flatten)]
        target: PortArgs,
    },

    /// Tell the device to stop streaming
    Stop {
        #[command(flatten)]
        target: PortArgs,
    },

    /// Set the sampling frequency value
    Freq {
        #[command(flatten)]
        target: PortArgs,

        value: u8,
    },

    /// List serial ports known to the OS
    Ports,

    /// Print the effective configuration as YAML
    Config,
}

fn load_config(cli: &Cli) -> Result<ScopeConfig> {
    let mut config: ScopeConfig = common::config::load_config(cli.config.as_deref(), ENV_PREFIX)
        .context("Failed to load configuration")?;

    if cli.raw_commands {
        config.framing = CommandFraming::raw();
    }
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    if cli.no_color {
        config.logging.ansi = false;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let config = load_config(&cli)?;
    let _log_guard = common::init_logging(&config.logging).context("Failed to initialize logging")?;

    match cli.command {
        Commands::Monitor {
            target,
            mode,
            count,
            start,
        } => {
            let (port, baud) = target.resolve(&config);
            let mut display = config.display.clone();
            if let Some(mode) = mode {
                display.mode = mode;
            }
            let mut session = SerialSession::new(config, Default::default())?;
            let options = monitor::MonitorOptions {
                count,
                send_start: start,
            };
            monitor::run(&mut session, &port, baud, &display, options).await?;
        },
        Commands::Send { target, payload } => {
            let (port, baud) = target.resolve(&config);
            let payload = payload.parse()?;
            let mut session = SerialSession::new(config, Default::default())?;
            device::send(&mut session, &port, baud, payload).await?;
        },
        Commands::Start { target } => {
            let (port, baud) = target.resolve(&config);
            let mut session = SerialSession::new(config, Default::default())?;
            device::command(&mut session, &port, baud, scope_link::DeviceCommand::StartStreaming)
                .await?;
        },
        Commands::Stop { target } => {
            let (port, baud) = target.resolve(&config);
            let mut session = SerialSession::new(config, Default::default())?;
            device::command(&mut session, &port, baud, scope_link::DeviceCommand::StopStreaming)
                .await?;
        },
        Commands::Freq { target, value } => {
            let (port, baud) = target.resolve(&config);
            let mut session = SerialSession::new(config, Default::default())?;
            device::command(
                &mut session,
                &port,
                baud,
                scope_link::DeviceCommand::SetFrequency(value),
            )
            .await?;
        },
        Commands::Ports => device::list_ports()?,
        Commands::Config => {
            print!("{}", common::config::to_yaml(&config)?);
        },
    }

    Ok(())
}
