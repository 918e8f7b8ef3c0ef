use crate::classify::{self, InvalidReason, TripStatus};
use crate::config::{Config, ConfigError};
use crate::delay;
use crate::display::TripSummary;
use crate::error::AppError;
use crate::feed::{self, FeedSource};
use crate::metrics;
use crate::store::Store;
use crate::types::{ScheduleStop, WindowRow};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Settings one classify/reconcile cycle runs under.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub timezone: Tz,
    pub window_minutes: i64,
    pub route_prefix: String,
}

impl MonitorSettings {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            timezone: config.timezone()?,
            window_minutes: config.window_minutes(),
            route_prefix: config.route_prefix().to_string(),
        })
    }
}

/// Non-blocking mutual exclusion for the classify/reconcile cycle. A tick
/// that finds the guard held gives up immediately; the permit releases on
/// drop.
#[derive(Debug, Default)]
pub struct CycleGuard {
    busy: AtomicBool,
}

impl CycleGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(guard: &Arc<CycleGuard>) -> Option<CyclePermit> {
        guard
            .busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| CyclePermit {
                guard: Arc::clone(guard),
            })
    }
}

pub struct CyclePermit {
    guard: Arc<CycleGuard>,
}

impl Drop for CyclePermit {
    fn drop(&mut self) {
        self.guard.busy.store(false, Ordering::Release);
    }
}

/// What one pass over the window produced.
#[derive(Debug, Default)]
pub struct WindowEvaluation {
    pub summaries: Vec<TripSummary>,
    pub stalled: Vec<classify::DelayDraft>,
    pub trips_evaluated: usize,
    pub trips_invalid: usize,
}

/// Per-cycle counters for the summary log line.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleStats {
    pub trips_evaluated: usize,
    pub stalled: usize,
    pub resumed: usize,
    pub elapsed_ms: u128,
}

fn group_by_trip(rows: &[WindowRow]) -> Vec<(&str, Vec<&WindowRow>)> {
    let mut order: Vec<&str> = Vec::new();
    let mut grouped: HashMap<&str, Vec<&WindowRow>> = HashMap::new();
    for row in rows {
        let trip_id = row.trip_id.as_str();
        if !grouped.contains_key(trip_id) {
            order.push(trip_id);
        }
        grouped.entry(trip_id).or_default().push(row);
    }
    order
        .into_iter()
        .map(|trip_id| (trip_id, grouped.remove(trip_id).unwrap_or_default()))
        .collect()
}

/// Evaluate every distinct trip in the window: metrics, lifecycle state, and
/// the stalled drafts feeding reconciliation. Bad data for one trip only
/// excludes that trip.
pub fn evaluate_window(
    rows: &[WindowRow],
    final_stops: &HashMap<String, ScheduleStop>,
    now: DateTime<Tz>,
) -> WindowEvaluation {
    let mut evaluation = WindowEvaluation::default();

    for (trip_id, trip_rows) in group_by_trip(rows) {
        evaluation.trips_evaluated += 1;

        let trip_metrics = metrics::distance_and_avg_speed(trip_id, trip_rows.iter().copied());

        let earliest = trip_rows.iter().min_by_key(|row| row.retrieved_at);
        let newest = trip_rows.iter().max_by_key(|row| row.retrieved_at);
        let label = earliest.and_then(|row| row.label.as_deref());
        let route_name = newest.and_then(|row| row.route_long_name.as_deref());

        let status = classify::classify_trip(
            &trip_metrics,
            label,
            route_name,
            final_stops.get(trip_id),
            now,
        );

        if status.retains_metrics() {
            evaluation.summaries.push(TripSummary {
                trip_id: trip_id.to_string(),
                total_km: trip_metrics.total_distance_km,
                avg_kmh: trip_metrics.avg_speed_kmh,
                map_link: classify::map_link(trip_metrics.last_position),
            });
        }

        match status {
            TripStatus::Stalled(draft) => evaluation.stalled.push(draft),
            TripStatus::Invalid(InvalidReason::StartLabel) => {
                evaluation.trips_invalid += 1;
                warn!(trip_id, "no usable start time in vehicle label; trip excluded this cycle");
            }
            TripStatus::Invalid(InvalidReason::MissingSchedule) => {
                evaluation.trips_invalid += 1;
                warn!(trip_id, "no schedule rows for trip; trip excluded this cycle");
            }
            _ => {}
        }
    }

    evaluation
}

/// Window rows plus the final scheduled stop for every trip they mention.
async fn load_window(
    store: &Store,
    settings: &MonitorSettings,
    now: DateTime<Tz>,
) -> Result<(Vec<WindowRow>, HashMap<String, ScheduleStop>), AppError> {
    let cutoff = now.with_timezone(&Utc) - ChronoDuration::minutes(settings.window_minutes);
    let rows = store.window_rows(cutoff, &settings.route_prefix).await?;

    let mut trip_ids: Vec<String> = Vec::new();
    for row in &rows {
        if !trip_ids.contains(&row.trip_id) {
            trip_ids.push(row.trip_id.clone());
        }
    }
    let final_stops = store.final_stops(&trip_ids).await?;
    Ok((rows, final_stops))
}

/// One full classify/reconcile cycle against the store at the given instant.
pub async fn run_cycle(
    store: &Store,
    settings: &MonitorSettings,
    now: DateTime<Tz>,
) -> Result<CycleStats, AppError> {
    let started = Instant::now();

    let (rows, final_stops) = load_window(store, settings, now).await?;
    let evaluation = evaluate_window(&rows, &final_stops, now);

    let tracked = store.delayed_trip_ids().await?;
    let plan = delay::plan_reconciliation(&tracked, evaluation.stalled);
    store.apply_reconciliation(&plan).await?;

    let stats = CycleStats {
        trips_evaluated: evaluation.trips_evaluated,
        stalled: plan.stalled_count(),
        resumed: plan.deletes.len(),
        elapsed_ms: started.elapsed().as_millis(),
    };
    info!(
        trips = stats.trips_evaluated,
        stalled = stats.stalled,
        resumed = stats.resumed,
        invalid = evaluation.trips_invalid,
        elapsed_ms = stats.elapsed_ms,
        "cycle complete"
    );
    Ok(stats)
}

/// Evaluate the current window without touching the delayed-trip table.
/// Backs the display endpoint, which shares the cycle's evaluation rules.
pub async fn evaluate_current_window(
    store: &Store,
    settings: &MonitorSettings,
    now: DateTime<Tz>,
) -> Result<(Vec<WindowRow>, WindowEvaluation), AppError> {
    let (rows, final_stops) = load_window(store, settings, now).await?;
    let evaluation = evaluate_window(&rows, &final_stops, now);
    Ok((rows, evaluation))
}

/// Retry an operation with exponential backoff; I/O at the scheduling-loop
/// boundary goes through here so a transient failure does not cost the tick.
pub async fn with_retry<T, E, F, Fut>(
    what: &str,
    attempts: u32,
    base_delay: Duration,
    mut op: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut delay = base_delay;
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts => {
                warn!(error = %err, attempt, "{what} failed; backing off before retry");
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Fetch one poll's records and append them to the position store.
pub async fn ingest_once<F: FeedSource>(feed: &mut F, store: &Store) -> Result<u64, AppError> {
    let records = with_retry("feed poll", RETRY_ATTEMPTS, RETRY_BASE_DELAY, || {
        std::future::ready(feed.poll())
    })
    .await?;

    let samples = feed::prepare_samples(records, Utc::now());
    if samples.is_empty() {
        return Ok(0);
    }
    let stored = with_retry("sample insert", RETRY_ATTEMPTS, RETRY_BASE_DELAY, || {
        store.insert_samples(&samples)
    })
    .await?;
    Ok(stored)
}

/// Periodic classify/reconcile loop. Each tick tries the guard; a tick that
/// finds a cycle still in flight is skipped outright, never queued.
pub fn spawn_monitor_loop(
    store: Store,
    settings: MonitorSettings,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    let guard = Arc::new(CycleGuard::new());
    let settings = Arc::new(settings);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let Some(permit) = CycleGuard::try_acquire(&guard) else {
                info!("previous cycle still in progress; skipping this tick");
                continue;
            };
            let store = store.clone();
            let settings = Arc::clone(&settings);
            tokio::spawn(async move {
                let _permit = permit;
                let now = Utc::now().with_timezone(&settings.timezone);
                let result = with_retry("classify cycle", RETRY_ATTEMPTS, RETRY_BASE_DELAY, || {
                    run_cycle(&store, settings.as_ref(), now)
                })
                .await;
                if let Err(err) = result {
                    warn!(error = %err, "cycle abandoned; next tick retries");
                }
            });
        }
    })
}

/// Periodic ingestion loop, deliberately not gated by the cycle guard:
/// classification reads a trailing window and tolerates seeing a partially
/// written one.
pub fn spawn_ingest_loop<F>(mut feed: F, store: Store, period: Duration) -> tokio::task::JoinHandle<()>
where
    F: FeedSource + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            match ingest_once(&mut feed, &store).await {
                Ok(count) => info!(samples = count, "ingestion stored samples"),
                Err(err) => warn!(error = %err, "ingestion failed; next tick retries"),
            }
        }
    })
}
