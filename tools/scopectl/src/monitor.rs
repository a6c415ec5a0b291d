//! `monitor` subcommand: stream readings to the terminal

use anyhow::{Context, Result};
use colored::*;
use scope_link::transport::{TransportBuilder, TransportStats};
use scope_link::{DeviceCommand, DisplayConfig, SessionController, SessionState, TraceRouter};
use std::io::Write;
use tracing::{info, warn};

use crate::device::SEND_TIMEOUT;
use crate::render::TerminalSurface;

#[derive(Debug, Clone, Copy, Default)]
pub struct MonitorOptions {
    /// Stop after this many readings
    pub count: Option<u64>,
    /// Send the start command after connecting
    pub send_start: bool,
}

/// What ended the stream and how much came through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSummary {
    pub readings: u64,
    /// Readings lost because the terminal fell behind
    pub dropped: u64,
    pub link_lost: bool,
    /// Port counters at the end of the stream; gone after a link loss
    pub transport: Option<TransportStats>,
}

pub async fn run<B: TransportBuilder>(
    session: &mut SessionController<B>,
    port: &str,
    baud: u32,
    display: &DisplayConfig,
    options: MonitorOptions,
) -> Result<MonitorSummary> {
    let mut surface = TerminalSurface::stdout(display.y_limit);
    let summary = stream(session, port, baud, display, options, &mut surface).await?;

    println!(
        "{} {} readings, {} dropped",
        "Done:".bright_cyan(),
        summary.readings,
        summary.dropped
    );
    let stats = session.acquisition_stats();
    println!(
        "      {} bytes read, {} bytes resynchronized",
        stats.bytes_read, stats.bytes_discarded
    );
    if let Some(link) = &summary.transport {
        println!(
            "      {} bytes received, {} bytes sent on {port}",
            link.bytes_received, link.bytes_sent
        );
    }
    if summary.link_lost {
        eprintln!("{} serial link lost", "ERROR".red());
    }
    Ok(summary)
}

async fn stream<B, W>(
    session: &mut SessionController<B>,
    port: &str,
    baud: u32,
    display: &DisplayConfig,
    options: MonitorOptions,
    surface: &mut TerminalSurface<W>,
) -> Result<MonitorSummary>
where
    B: TransportBuilder,
    W: Write,
{
    let mut readings = session.subscribe();
    let mut state = session.watch_state();
    session
        .connect(port, baud)
        .await
        .with_context(|| format!("Cannot open {port}"))?;

    if options.send_start {
        session
            .writer()
            .send_timeout(DeviceCommand::StartStreaming, SEND_TIMEOUT)
            .await
            .context("Failed to send start command")?;
    }

    let mut router = TraceRouter::new(display);
    let mut summary = MonitorSummary {
        readings: 0,
        dropped: 0,
        link_lost: false,
        transport: None,
    };
    info!("Monitoring {port} in {} mode", router.mode());

    let shutdown = common::shutdown::wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                info!("{signal} received, stopping");
                break;
            }
            reading = readings.recv() => {
                let Some(reading) = reading else { break };
                router.route(reading, surface);
                surface.render_row()?;
                summary.readings += 1;
                if options.count.is_some_and(|limit| summary.readings >= limit) {
                    break;
                }
            }
            changed = state.changed() => {
                if changed.is_err() || *state.borrow() == SessionState::Disconnected {
                    summary.link_lost = true;
                    break;
                }
            }
        }
    }
    summary.dropped = readings.dropped();
    summary.transport = session.transport_stats().await;

    if session.is_connected() {
        if let Err(e) = session
            .writer()
            .send_timeout(DeviceCommand::StopStreaming, SEND_TIMEOUT)
            .await
        {
            warn!("Failed to send stop command: {e}");
        }
    }
    session.disconnect().await?;

    Ok(summary)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use scope_link::transport::MockTransportBuilder;
    use scope_link::{AcquisitionConfig, CommandFraming, Packet, PlotMode, ScopeConfig};
    use std::time::Duration;

    fn config() -> ScopeConfig {
        ScopeConfig {
            framing: CommandFraming::raw(),
            acquisition: AcquisitionConfig {
                idle_interval_ms: 1,
                error_backoff_ms: 1,
                max_consecutive_failures: 2,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_stream_stops_after_count() {
        let builder = MockTransportBuilder::default();
        let handle = builder.handle();
        let mut session = SessionController::new(config(), builder).unwrap();
        let display = DisplayConfig {
            mode: PlotMode::Xy,
            ..Default::default()
        };
        colored::control::set_override(false);
        let mut surface = TerminalSurface::new(Vec::new(), 3.5, 21);

        let feeder = {
            let handle = handle.clone();
            tokio::spawn(async move {
                // wait for the port to open, then stream three packets
                while !handle.is_open() {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
                for raw in [100u16, 200, 300] {
                    handle.push_rx(Packet::from_raw(raw, raw).as_bytes());
                }
            })
        };

        let options = MonitorOptions {
            count: Some(3),
            send_start: true,
        };
        let summary = tokio::time::timeout(
            Duration::from_secs(2),
            stream(&mut session, "mock0", 57600, &display, options, &mut surface),
        )
        .await
        .unwrap()
        .unwrap();
        feeder.await.unwrap();

        assert_eq!(summary.readings, 3);
        assert!(!summary.link_lost);
        let link = summary.transport.unwrap();
        assert_eq!(link.bytes_received, 36);
        assert_eq!(link.bytes_sent, 1);
        // start on connect, stop on teardown
        assert_eq!(handle.sent(), vec![vec![0xFF], vec![0x00]]);
        assert!(!handle.is_open());
    }

    #[tokio::test]
    async fn test_stream_ends_on_link_loss() {
        let builder = MockTransportBuilder::default();
        let handle = builder.handle();
        let mut session = SessionController::new(config(), builder).unwrap();
        let mut surface = TerminalSurface::new(Vec::new(), 3.5, 21);

        let failer = {
            let handle = handle.clone();
            tokio::spawn(async move {
                while !handle.is_open() {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
                handle.set_unplugged(true);
            })
        };

        let summary = tokio::time::timeout(
            Duration::from_secs(2),
            stream(
                &mut session,
                "mock0",
                57600,
                &DisplayConfig::default(),
                MonitorOptions::default(),
                &mut surface,
            ),
        )
        .await
        .unwrap()
        .unwrap();
        failer.await.unwrap();

        assert!(summary.link_lost);
        assert_eq!(summary.readings, 0);
        assert!(summary.transport.is_none());
        // no stop command once the port is gone
        assert!(handle.sent().is_empty());
    }
}
