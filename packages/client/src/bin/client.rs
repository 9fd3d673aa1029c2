//! Reservation calendar client.
//!
//! Connects to the reservation server, keeps an in-memory calendar in sync
//! with the pushed snapshot and logs what changes. Reconnects with
//! exponential backoff until a normal close; Ctrl+C closes normally.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin yoyaku-client -- --url ws://127.0.0.1:8080/ws
//! cargo run --bin yoyaku-client -- -f '{"customer_key":"alice"}' --granularity 60
//! ```

use std::{sync::Arc, time::Duration};

use chrono::NaiveTime;
use clap::Parser;

use yoyaku_client::{
    client::ConnectionManager,
    config::{CalendarConfig, ClientConfig, ReconnectPolicy},
    domain::{BusinessHours, Notification, RenderSurface, SlotConfig, slot::parse_raw_time},
    error::ClientError,
    infrastructure::{surface::InMemorySurface, transport::WebSocketConnector},
    usecase::{CalendarSync, SyncOutcome},
};
use yoyaku_shared::{
    logger::setup_logger,
    time::{Clock, SystemClock},
};

const SHUTDOWN_TIMEOUT_SECS: u64 = 5;

#[derive(Parser, Debug)]
#[command(name = "yoyaku-client")]
#[command(about = "Reservation calendar client with live WebSocket sync", long_about = None)]
struct Args {
    /// WebSocket server URL
    #[arg(short = 'u', long, default_value = "ws://127.0.0.1:8080/ws")]
    url: String,

    /// Filter sent with `set_filter` on every connect (JSON)
    #[arg(short = 'f', long)]
    filter: Option<String>,

    /// Slot granularity in minutes (at least 60)
    #[arg(short = 'g', long, default_value_t = 120)]
    granularity: u32,

    /// Opening time, HH:MM
    #[arg(long, default_value = "09:00", value_parser = parse_opening)]
    opening: NaiveTime,

    /// Keep-alive ping interval in seconds
    #[arg(long, default_value_t = 25)]
    ping_interval: u64,

    /// Give up after this many reconnection attempts (unbounded when omitted)
    #[arg(long)]
    max_reconnect_attempts: Option<u32>,
}

impl Args {
    fn client_config(&self) -> Result<ClientConfig, ClientError> {
        let mut config = ClientConfig::new(&self.url)
            .with_ping_interval(Duration::from_secs(self.ping_interval))
            .with_reconnect(ReconnectPolicy {
                max_attempts: self.max_reconnect_attempts,
                ..ReconnectPolicy::default()
            });
        if let Some(filter) = &self.filter {
            let filter = serde_json::from_str(filter)
                .map_err(|e| ClientError::InvalidFilter(e.to_string()))?;
            config = config.with_filter(filter);
        }
        Ok(config)
    }

    fn calendar_config(&self) -> CalendarConfig {
        CalendarConfig {
            slots: SlotConfig {
                granularity_minutes: self.granularity,
                business_hours: BusinessHours::new(self.opening),
                ..SlotConfig::default()
            },
            ..CalendarConfig::default()
        }
    }
}

fn parse_opening(raw: &str) -> Result<NaiveTime, String> {
    parse_raw_time(raw).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();

    if let Err(e) = run(args).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), ClientError> {
    let config = args.client_config()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let manager = ConnectionManager::new(config, Arc::new(WebSocketConnector), clock.clone());
    let mut calendar = CalendarSync::new(args.calendar_config(), clock);
    let mut surface = InMemorySurface::new();

    let mut status = manager.status();
    let mut subscription = manager.attach();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, closing connection");
                break;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                if *status.borrow_and_update() {
                    tracing::info!("Connected to {}", args.url);
                } else {
                    tracing::warn!("Disconnected from {}", args.url);
                }
            }
            notification = subscription.next_notification() => {
                let Some(notification) = notification else {
                    break;
                };
                log_notification(&notification);
                let snapshot = manager.snapshot();
                match calendar.apply(&mut surface, &notification, &snapshot, false) {
                    SyncOutcome::Applied(reports) => {
                        for report in reports.iter().filter(|r| !r.placed.is_empty()) {
                            tracing::info!(
                                "Slot {}: {} reservations, {} min each",
                                report.slot,
                                report.placed.len(),
                                report.duration_minutes
                            );
                        }
                        tracing::debug!("Calendar holds {} events", surface.events().len());
                    }
                    SyncOutcome::Suppressed | SyncOutcome::Ignored => {}
                }
            }
        }
    }

    manager.shutdown();
    let closed = tokio::time::timeout(
        Duration::from_secs(SHUTDOWN_TIMEOUT_SECS),
        status.wait_for(|connected| !*connected),
    )
    .await;
    if closed.is_err() {
        tracing::warn!("Connection did not close within {}s", SHUTDOWN_TIMEOUT_SECS);
    }
    drop(subscription);
    Ok(())
}

fn log_notification(notification: &Notification) {
    match notification {
        Notification::SnapshotReplaced => tracing::info!("Snapshot replaced"),
        Notification::ReservationChanged {
            change,
            reservation,
            ..
        } => tracing::info!(
            "Reservation '{}' {:?}: {} {} {}",
            reservation.id,
            change,
            reservation.title(),
            reservation.date,
            reservation.time_slot
        ),
        Notification::VacationPeriodsChanged(periods) => {
            tracing::info!("{} vacation periods", periods.len())
        }
        Notification::NewConversationMessage {
            customer_key,
            message,
        } => tracing::info!(
            "New message from '{}' ({}): {}",
            customer_key,
            message.role,
            message.message
        ),
        Notification::Typing {
            customer_key,
            typing,
        } => tracing::debug!("Typing {:?}: {}", customer_key, typing),
        other => tracing::debug!("Notification: {:?}", other),
    }
}
