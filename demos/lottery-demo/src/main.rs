//! Lottery Demo
//!
//! Drives one event through its whole life against the in-memory store:
//! registration, the lottery draw, an acceptance, a cancellation, a
//! replacement draw and completion. A second event whose registration already
//! closed shows the lottery auto-running when the event is loaded for display.
//!
//! # Running the Example
//!
//! ```bash
//! LOTTERY_SEED=7 LOTTERY_LOG_LEVEL=debug cargo run -p lottery-demo
//! ```

#![allow(missing_docs)]

mod config;

use anyhow::Context;
use chrono::{Duration as ChronoDuration, Utc};
use config::Config;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use waitlist_lottery_core::BoxFuture;
use waitlist_lottery_core::environment::{RandomSource, SystemClock, ThreadRandom};
use waitlist_lottery_core::event::{EntrantId, EventId, EventRecord, OrganizerId};
use waitlist_lottery_core::event_store::EventFilter;
use waitlist_lottery_core::lottery::{LotteryAction, LotteryEnvironment};
use waitlist_lottery_core::notification::{
    NotificationDispatcher, NotificationError, NotificationRequest,
};
use waitlist_lottery_runtime::Coordinator;
use waitlist_lottery_runtime::metrics::MetricsExporter;
use waitlist_lottery_testing::{InMemoryEventStore, SeededRandom};

/// Dispatcher that writes each message to the log
struct LogDispatcher;

impl NotificationDispatcher for LogDispatcher {
    fn notify(&self, request: NotificationRequest) -> BoxFuture<'_, Result<(), NotificationError>> {
        Box::pin(async move {
            tracing::info!(
                entrant_id = %request.entrant_id,
                outcome = %request.outcome,
                "📨 {}",
                request.message()
            );
            Ok(())
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    // 1. Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(?config, "Starting Lottery Demo");

    // 2. Install Prometheus recorder
    let exporter = if config.metrics_enabled {
        Some(MetricsExporter::install()?)
    } else {
        None
    };

    // 3. Wire the coordinator
    let random: Arc<dyn RandomSource> = match config.seed {
        Some(seed) => Arc::new(SeededRandom::new(seed)),
        None => Arc::new(ThreadRandom),
    };
    let coordinator = Coordinator::with_config(
        Arc::new(InMemoryEventStore::new()),
        Arc::new(LogDispatcher),
        LotteryEnvironment::new(Arc::new(SystemClock), random),
        config.coordinator_config(),
    );

    // 4. Full lifecycle
    run_lifecycle(&coordinator).await?;

    // 5. Auto-run on display
    run_auto_draw(&coordinator).await?;

    let owned = coordinator
        .events(EventFilter::ByOrganizer(OrganizerId::new("demo-organizer")))
        .await?;
    tracing::info!(events = owned.len(), "Events owned by demo-organizer");

    if let Some(text) = exporter.as_ref().and_then(MetricsExporter::render) {
        println!("\n# Metrics\n{text}");
    }

    tracing::info!("✓ Demo complete");
    Ok(())
}

async fn run_lifecycle(coordinator: &Coordinator) -> anyhow::Result<()> {
    let now = Utc::now();
    let event = coordinator
        .create_event(
            EventRecord::new(EventId::generate(), 3)
                .with_title("Spring Gala")
                .with_organizer(OrganizerId::new("demo-organizer"))
                .with_registration_window(Some(now - ChronoDuration::hours(1)), Some(now + ChronoDuration::days(7))),
        )
        .await?;
    let event_id = event.event_id.clone();
    tracing::info!(%event_id, "✓ Event created");

    coordinator.send(event_id.clone(), LotteryAction::OpenRegistration).await?;

    for i in 1..=6 {
        let outcome = coordinator
            .send(
                event_id.clone(),
                LotteryAction::JoinWaitlist {
                    entrant_id: EntrantId::new(format!("entrant-{i}")),
                    location: None,
                },
            )
            .await?;
        if let Some(reason) = outcome.skipped {
            tracing::warn!(%reason, "Join skipped");
        }
    }

    coordinator.send(event_id.clone(), LotteryAction::CloseRegistration).await?;

    let mut drawn = coordinator.send(event_id.clone(), LotteryAction::RunLottery).await?;
    drawn.dispatch.wait().await;
    tracing::info!(
        selected = ?drawn.event.selected_attendees,
        waiting = ?drawn.event.waiting_list,
        "✓ Lottery drawn"
    );

    let (Some(accepting), Some(declining)) = (
        drawn.event.selected_attendees.first().cloned(),
        drawn.event.selected_attendees.get(1).cloned(),
    ) else {
        anyhow::bail!("lottery selected fewer than two entrants");
    };

    let mut accepted = coordinator
        .send(event_id.clone(), LotteryAction::AcceptInvitation { entrant_id: accepting })
        .await?;
    accepted.dispatch.wait().await;

    let mut declined = coordinator
        .send(event_id.clone(), LotteryAction::CancelEntrant { entrant_id: declining })
        .await?;
    declined.dispatch.wait().await;

    let mut replaced = coordinator.send(event_id.clone(), LotteryAction::DrawReplacements).await?;
    replaced.dispatch.wait().await;
    tracing::info!(drawn = ?replaced.event.selected_attendees, "✓ Replacements drawn");

    let completed = coordinator.send(event_id.clone(), LotteryAction::CompleteEvent).await?;
    println!("{}", serde_json::to_string_pretty(&completed.event)?);
    Ok(())
}

async fn run_auto_draw(coordinator: &Coordinator) -> anyhow::Result<()> {
    let now = Utc::now();
    let mut closed = EventRecord::new(EventId::generate(), 2)
        .with_title("Winter Workshop")
        .with_organizer(OrganizerId::new("demo-organizer"))
        .with_registration_window(None, Some(now - ChronoDuration::minutes(5)));
    closed.waiting_list = (1..=4).map(|i| EntrantId::new(format!("walk-in-{i}"))).collect();

    let closed = coordinator.create_event(closed).await?;
    let shown = coordinator.load_for_display(closed.event_id.clone()).await?;
    tracing::info!(
        event_id = %shown.event_id,
        lottery_has_run = shown.lottery_has_run,
        selected = shown.selected_attendees.len(),
        "✓ Loaded for display"
    );
    Ok(())
}
