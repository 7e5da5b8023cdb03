use std::sync::Arc;

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::model::{FetchTask, NormalizedRecord, RunStats, TaskOutcome};

/// Executes one fetch task. Implementations must not fail: errors are
/// reported through `TaskOutcome::Failed`.
#[async_trait]
pub trait TaskRunner: Send + Sync + 'static {
    async fn run(&self, task: &FetchTask) -> TaskOutcome;
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub workers: usize,
    pub progress_every: usize,
    pub show_progress: bool,
}

/// Merged output of all tasks.
#[derive(Debug, Default)]
pub struct Collected {
    pub records: Vec<NormalizedRecord>,
    pub stats: RunStats,
}

impl Collected {
    fn absorb(&mut self, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Records(records) => {
                self.stats.completed += 1;
                self.stats.succeeded += 1;
                self.records.extend(records);
            }
            TaskOutcome::Empty => {
                self.stats.completed += 1;
                self.stats.empty += 1;
            }
            TaskOutcome::Failed(reason) => {
                self.stats.completed += 1;
                self.stats.failed += 1;
                *self.stats.failures.entry(reason).or_default() += 1;
            }
            TaskOutcome::Cancelled => self.stats.cancelled += 1,
        }
    }
}

/// Run every task with at most `config.workers` in flight.
///
/// All tasks are spawned up front and queue on a semaphore; the loop below is
/// the only place results are merged. Once `cancel` fires, queued tasks
/// resolve to `Cancelled` without running. A panicking task counts as failed.
pub async fn run_all<R: TaskRunner>(
    runner: Arc<R>,
    tasks: Vec<FetchTask>,
    config: &SchedulerConfig,
    cancel: CancellationToken,
) -> Collected {
    let total = tasks.len();
    let semaphore = Arc::new(Semaphore::new(config.workers.max(1)));
    let mut set = JoinSet::new();

    for task in tasks {
        let runner = Arc::clone(&runner);
        let sem = Arc::clone(&semaphore);
        let cancel = cancel.clone();

        set.spawn(async move {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => return TaskOutcome::Cancelled,
                permit = sem.acquire_owned() => permit,
            };
            let Ok(_permit) = permit else {
                return TaskOutcome::Cancelled;
            };
            if cancel.is_cancelled() {
                return TaskOutcome::Cancelled;
            }
            runner.run(&task).await
        });
    }

    let pb = progress_bar(total, config.show_progress);
    let every = config.progress_every.max(1);
    let mut collected = Collected {
        records: Vec::new(),
        stats: RunStats {
            total,
            ..Default::default()
        },
    };

    let mut done = 0usize;
    while let Some(joined) = set.join_next().await {
        let outcome = joined.unwrap_or_else(|e| {
            warn!("Fetch task aborted: {}", e);
            TaskOutcome::Failed(if e.is_panic() { "panicked" } else { "aborted" }.into())
        });
        collected.absorb(outcome);
        done += 1;
        pb.inc(1);

        if done % every == 0 && done < total {
            let s = &collected.stats;
            info!(
                "Progress {}/{} ({} ok, {} empty, {} failed, {} records)",
                done,
                total,
                s.succeeded,
                s.empty,
                s.failed,
                collected.records.len()
            );
        }
    }

    pb.finish_and_clear();
    let s = &collected.stats;
    info!(
        "Finished {} tasks ({} ok, {} empty, {} failed, {} cancelled), {} records",
        total,
        s.succeeded,
        s.empty,
        s.failed,
        s.cancelled,
        collected.records.len()
    );

    collected
}

fn progress_bar(total: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total as u64);
    if let Ok(style) =
        ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}
