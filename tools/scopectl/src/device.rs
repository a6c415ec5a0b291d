//! One-shot device commands and port listing

use anyhow::{Context, Result};
use colored::*;
use scope_link::transport::{list_ports as os_ports, TransportBuilder};
use scope_link::{DeviceCommand, Payload, SessionController};
use std::time::Duration;
use tracing::warn;

/// Upper bound on waiting for an idle link before a write
pub const SEND_TIMEOUT: Duration = Duration::from_secs(2);

/// Connect, write one framed payload, disconnect
pub async fn send<B: TransportBuilder>(
    session: &mut SessionController<B>,
    port: &str,
    baud: u32,
    payload: Payload,
) -> Result<()> {
    session
        .connect(port, baud)
        .await
        .with_context(|| format!("Cannot open {port}"))?;

    let result = session.writer().send_timeout(payload.clone(), SEND_TIMEOUT).await;

    if let Err(e) = session.disconnect().await {
        warn!("Disconnect failed: {e}");
    }

    let written = result.with_context(|| format!("Failed to send {payload}"))?;
    println!(
        "{} {} ({} bytes) -> {}",
        "OK".green(),
        payload,
        written,
        port.bright_cyan()
    );
    Ok(())
}

pub async fn command<B: TransportBuilder>(
    session: &mut SessionController<B>,
    port: &str,
    baud: u32,
    command: DeviceCommand,
) -> Result<()> {
    send(session, port, baud, command.to_payload()).await
}

pub fn list_ports() -> Result<()> {
    let ports = os_ports().context("Failed to list serial ports")?;
    if ports.is_empty() {
        println!("{}", "No serial ports found".yellow());
        return Ok(());
    }

    println!("{}", "Serial ports:".bright_cyan());
    for (name, description) in ports {
        println!("  {:<24} {}", name.bold(), description.dimmed());
    }
    Ok(())
}
