//! Worker Loop: realtime / schedule / hybrid scheduling of
//! repeated fan-out sweeps across all backends. A single blocking
//! thread, no async runtime. No cooperative-task yield semantics
//! are required here.

use crate::change_log;
use crate::config::SyncMode;
use crate::dialect::BackendTag;
use crate::notify::Notifier;
use crate::registry::BackendRegistry;
use crate::replicator;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub struct Worker {
    registry: Arc<BackendRegistry>,
    notifier: Arc<dyn Notifier>,
    running: Arc<AtomicBool>,
}

impl Worker {
    pub fn new(registry: Arc<BackendRegistry>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            registry,
            notifier,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// A clone of the running flag; flip it to `false` to stop
    /// `run_forever` at the next tick boundary instead of relying on a
    /// process signal.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// `process_batch`: fetch up to `batch_size`
    /// unprocessed entries from `tag`'s change log, apply each, and
    /// mark it processed on success. On apply failure, log and leave
    /// the change unprocessed so it retries next tick. Order within a
    /// backend is strictly `change_id` ascending (guaranteed by the
    /// Change Log Reader); there is no ordering guarantee between
    /// backends.
    pub fn process_batch(&self, tag: BackendTag, batch_size: u32) -> usize {
        let pool = match self.registry.engine(tag) {
            Ok(pool) => pool,
            Err(err) => {
                log::warn!("worker: engine lookup failed for backend {tag}: {err}");
                return 0;
            }
        };

        let changes = change_log::fetch_unprocessed(&pool, tag, batch_size);
        let mut processed = 0;
        for change in changes {
            let source_tag = BackendTag::parse(&change.source_db).unwrap_or(tag);
            match replicator::apply_change(&self.registry, self.notifier.as_ref(), source_tag, &change) {
                Ok(_outcome) => match change_log::mark_processed(&pool, change.change_id) {
                    Ok(()) => processed += 1,
                    Err(err) => log::warn!(
                        "worker: failed to mark change_id={} backend={tag} processed: {err}",
                        change.change_id
                    ),
                },
                Err(err) => {
                    log::warn!(
                        "worker: apply error backend={tag} change_id={} error={err}",
                        change.change_id
                    );
                }
            }
        }
        processed
    }

    fn process_all_backends(&self, batch_size: u32) -> usize {
        self.registry
            .all_tags()
            .into_iter()
            .map(|tag| self.process_batch(tag, batch_size))
            .sum()
    }

    /// `run_schedule_cycle`: repeat "process every
    /// backend once" up to `max_rounds` times, stopping early as soon
    /// as a full sweep processes zero changes (convergence reached).
    pub fn run_schedule_cycle(&self, max_rounds: u32, batch_size: u32) -> usize {
        let mut total = 0;
        for _ in 0..max_rounds.max(1) {
            let processed = self.process_all_backends(batch_size);
            total += processed;
            if processed == 0 {
                break;
            }
        }
        total
    }

    /// Run the worker loop until `stop_handle()` is flipped to
    /// `false`. Implements the scheduling state machine exactly:
    /// realtime sweeps every tick (if enabled), a scheduled sweep when
    /// due (if enabled), and a sleep whose duration depends on which
    /// mode produced no work this tick.
    pub fn run_forever(&self) {
        let config = self.registry.config();
        let poll = Duration::from_secs(config.sync_poll_seconds);
        let batch = config.sync_batch_size;
        let mode = config.sync_mode;
        let realtime_enabled = mode.realtime_enabled();
        let schedule_enabled = mode.schedule_enabled();
        let schedule_interval = Duration::from_secs(config.sync_schedule_interval_seconds);
        let max_rounds = config.sync_schedule_max_rounds;

        let mut next_schedule_at = schedule_enabled.then(|| Instant::now() + schedule_interval);

        log::info!(
            "worker starting mode={mode:?} poll={poll:?} batch={batch} schedule_every={}",
            schedule_enabled
                .then(|| format!("{schedule_interval:?}"))
                .unwrap_or_else(|| "n/a".to_string())
        );

        while self.running.load(Ordering::Relaxed) {
            let mut work_done = 0;

            if realtime_enabled {
                let processed = self.process_all_backends(batch);
                work_done += processed;
                if processed > 0 {
                    log::info!("realtime replicated {processed} change(s)");
                }
            }

            if schedule_enabled {
                if let Some(at) = next_schedule_at {
                    if Instant::now() >= at {
                        log::info!("scheduled sync triggered");
                        let processed = self.run_schedule_cycle(max_rounds, batch);
                        work_done += processed;
                        log::info!("scheduled sync finished rows={processed}");
                        next_schedule_at = Some(Instant::now() + schedule_interval);
                    }
                }
            }

            if work_done == 0 {
                let sleep_for = if realtime_enabled {
                    poll
                } else if let Some(at) = next_schedule_at {
                    at.saturating_duration_since(Instant::now()).max(Duration::from_secs(1))
                } else {
                    poll
                };
                thread::sleep(sleep_for);
            }
        }
    }
}
