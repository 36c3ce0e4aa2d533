//! Pipeline scheduler implementation.
//!
//! Every registered stage gets its own polling loop:
//! - Stages run independently of each other, on their own interval
//! - A stage never overlaps with itself (ticks and manual triggers share one in-flight flag)
//! - A failed run is retried as a whole, up to `job_attempts` times
//! - Stopping ends the loops between runs and never aborts a run in progress

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

use crate::metrics;
use crate::pipeline::{PipelineConfig, Stage, StageName, StageReport, StageSchedules};

use super::types::{LastRun, SchedulerError, SchedulerStatus, StageStatus};

/// A stage plus its scheduling state.
struct ScheduledJob {
    stage: Arc<dyn Stage>,
    interval: Duration,
    in_flight: AtomicBool,
    runs: AtomicU64,
    failures: AtomicU64,
    last_run: RwLock<Option<LastRun>>,
}

impl ScheduledJob {
    fn name(&self) -> StageName {
        self.stage.name()
    }
}

/// Resets the in-flight flag when a run ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Runs pipeline stages on fixed intervals.
pub struct PipelineScheduler {
    job_attempts: u32,
    job_retry_delay: Duration,
    jobs: RwLock<Vec<Arc<ScheduledJob>>>,

    // Runtime state
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl PipelineScheduler {
    /// Create a scheduler. `job_attempts` is clamped to at least one.
    pub fn new(job_attempts: u32, job_retry_delay: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            job_attempts: job_attempts.max(1),
            job_retry_delay,
            jobs: RwLock::new(Vec::new()),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.job_attempts, config.job_retry_delay())
    }

    /// Register a stage to run every `interval`.
    ///
    /// Registering while running starts the stage's loop right away.
    pub async fn register(
        &self,
        stage: Arc<dyn Stage>,
        interval: Duration,
    ) -> Result<(), SchedulerError> {
        let name = stage.name();
        let job = {
            let mut jobs = self.jobs.write().await;
            if jobs.iter().any(|job| job.name() == name) {
                return Err(SchedulerError::AlreadyRegistered(name));
            }

            let job = Arc::new(ScheduledJob {
                stage,
                interval,
                in_flight: AtomicBool::new(false),
                runs: AtomicU64::new(0),
                failures: AtomicU64::new(0),
                last_run: RwLock::new(None),
            });
            jobs.push(Arc::clone(&job));
            job
        };

        info!(stage = %name, interval_secs = interval.as_secs(), "Registered stage");

        if self.running.load(Ordering::SeqCst) {
            self.spawn_job_loop(job);
        }
        Ok(())
    }

    /// Register every enabled stage with its configured interval.
    ///
    /// Duplicate registrations are logged and skipped. Returns how many
    /// stages were registered.
    pub async fn register_all(
        &self,
        stages: Vec<Arc<dyn Stage>>,
        schedules: &StageSchedules,
    ) -> usize {
        let mut registered = 0;
        for stage in stages {
            let schedule = schedules.get(stage.name());
            if !schedule.enabled {
                info!(stage = %stage.name(), "Stage disabled, not scheduling");
                continue;
            }

            match self.register(stage, schedule.interval()).await {
                Ok(()) => registered += 1,
                Err(e) => warn!(error = %e, "Failed to register stage"),
            }
        }
        registered
    }

    /// Start the scheduler (spawns one loop per registered stage).
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Scheduler already running");
            return;
        }

        info!("Starting pipeline scheduler");

        for job in self.jobs.read().await.iter() {
            self.spawn_job_loop(Arc::clone(job));
        }

        info!("Pipeline scheduler started");
    }

    /// Stop scheduling new runs. Runs in progress finish on their own.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Scheduler not running");
            return;
        }

        info!("Stopping pipeline scheduler");

        // Signal shutdown to all loops
        let _ = self.shutdown_tx.send(());

        info!("Pipeline scheduler stopped");
    }

    /// Wait until no stage is running, up to `timeout`. Returns whether it got idle.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let busy = self
                .jobs
                .read()
                .await
                .iter()
                .any(|job| job.in_flight.load(Ordering::SeqCst));
            if !busy {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run a stage now, outside its schedule.
    pub async fn trigger(&self, name: StageName) -> Result<StageReport, SchedulerError> {
        let job = self
            .jobs
            .read()
            .await
            .iter()
            .find(|job| job.name() == name)
            .cloned()
            .ok_or_else(|| SchedulerError::UnknownStage(name.to_string()))?;

        info!(stage = %name, "Triggering stage");
        Self::run_job(&job, self.job_attempts, self.job_retry_delay).await
    }

    /// Get current scheduler status.
    pub async fn status(&self) -> SchedulerStatus {
        let jobs = self.jobs.read().await;
        let mut stages = Vec::with_capacity(jobs.len());
        for job in jobs.iter() {
            stages.push(StageStatus {
                name: job.name(),
                interval_secs: job.interval.as_secs(),
                in_flight: job.in_flight.load(Ordering::SeqCst),
                runs: job.runs.load(Ordering::SeqCst),
                failures: job.failures.load(Ordering::SeqCst),
                last_run: job.last_run.read().await.clone(),
            });
        }

        SchedulerStatus {
            running: self.is_running(),
            stages,
        }
    }

    /// Spawn the polling loop of one stage.
    fn spawn_job_loop(&self, job: Arc<ScheduledJob>) {
        let running = Arc::clone(&self.running);
        let attempts = self.job_attempts;
        let retry_delay = self.job_retry_delay;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let name = job.name();
            info!(stage = %name, "Stage loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!(stage = %name, "Stage loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(job.interval) => {
                        if !running.load(Ordering::SeqCst) {
                            break;
                        }
                        match Self::run_job(&job, attempts, retry_delay).await {
                            Ok(_) => {}
                            Err(SchedulerError::AlreadyRunning(_)) => {
                                debug!(stage = %name, "Previous run still in progress, skipping tick");
                            }
                            Err(e) => error!(stage = %name, error = %e, "Scheduled run failed"),
                        }
                    }
                }
            }
            info!(stage = %name, "Stage loop stopped");
        });
    }

    /// Run a stage with job-level retries, unless it is already in flight.
    async fn run_job(
        job: &ScheduledJob,
        attempts: u32,
        retry_delay: Duration,
    ) -> Result<StageReport, SchedulerError> {
        let name = job.name();
        if job.in_flight.swap(true, Ordering::SeqCst) {
            metrics::STAGE_RUNS
                .with_label_values(&[name.as_str(), "skipped"])
                .inc();
            return Err(SchedulerError::AlreadyRunning(name));
        }
        let _in_flight = InFlight(&job.in_flight);

        let started_at = Utc::now();
        let timer = Instant::now();
        let mut attempt = 0;
        let result = loop {
            attempt += 1;
            match job.stage.run().await {
                Ok(report) => break Ok(report),
                Err(e) if attempt < attempts => {
                    warn!(
                        stage = %name,
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Stage run failed, retrying"
                    );
                    tokio::time::sleep(retry_delay).await;
                }
                Err(e) => break Err(e),
            }
        };

        metrics::STAGE_DURATION
            .with_label_values(&[name.as_str()])
            .observe(timer.elapsed().as_secs_f64());
        job.runs.fetch_add(1, Ordering::SeqCst);

        let (outcome, last_run) = match result {
            Ok(report) => (
                Ok(report),
                LastRun {
                    started_at,
                    finished_at: Utc::now(),
                    attempts: attempt,
                    report: Some(report),
                    error: None,
                },
            ),
            Err(e) => {
                job.failures.fetch_add(1, Ordering::SeqCst);
                let message = e.to_string();
                (
                    Err(SchedulerError::StageFailed {
                        stage: name,
                        attempts: attempt,
                        message: message.clone(),
                    }),
                    LastRun {
                        started_at,
                        finished_at: Utc::now(),
                        attempts: attempt,
                        report: None,
                        error: Some(message),
                    },
                )
            }
        };

        metrics::STAGE_RUNS
            .with_label_values(&[name.as_str(), if outcome.is_ok() { "success" } else { "error" }])
            .inc();
        *job.last_run.write().await = Some(last_run);

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineError;
    use crate::store::StoreError;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    /// Stage that counts runs, optionally failing the first `fail_first` of them.
    struct CountingStage {
        name: StageName,
        runs: AtomicU32,
        fail_first: u32,
        delay: Duration,
    }

    impl CountingStage {
        fn new(name: StageName) -> Self {
            Self {
                name,
                runs: AtomicU32::new(0),
                fail_first: 0,
                delay: Duration::ZERO,
            }
        }

        fn runs(&self) -> u32 {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Stage for CountingStage {
        fn name(&self) -> StageName {
            self.name
        }

        async fn run(&self) -> Result<StageReport, PipelineError> {
            let n = self.runs.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if n < self.fail_first {
                return Err(PipelineError::Store(StoreError::Database(
                    "database is locked".to_string(),
                )));
            }
            Ok(StageReport {
                selected: 1,
                succeeded: 1,
                ..Default::default()
            })
        }
    }

    fn scheduler() -> PipelineScheduler {
        PipelineScheduler::new(3, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let scheduler = scheduler();
        scheduler
            .register(Arc::new(CountingStage::new(StageName::Scrape)), Duration::from_secs(60))
            .await
            .unwrap();

        let result = scheduler
            .register(Arc::new(CountingStage::new(StageName::Scrape)), Duration::from_secs(60))
            .await;
        assert!(matches!(
            result,
            Err(SchedulerError::AlreadyRegistered(StageName::Scrape))
        ));
        assert_eq!(scheduler.status().await.stages.len(), 1);
    }

    #[tokio::test]
    async fn test_register_all_skips_disabled_and_duplicates() {
        let scheduler = scheduler();
        let mut schedules = StageSchedules::default();
        schedules.enrich.enabled = false;

        let stages: Vec<Arc<dyn Stage>> = vec![
            Arc::new(CountingStage::new(StageName::Discovery)),
            Arc::new(CountingStage::new(StageName::Enrich)),
            Arc::new(CountingStage::new(StageName::Ingest)),
            Arc::new(CountingStage::new(StageName::Ingest)),
        ];
        let registered = scheduler.register_all(stages, &schedules).await;
        assert_eq!(registered, 2);

        let status = scheduler.status().await;
        assert_eq!(status.stages[0].name, StageName::Discovery);
        assert_eq!(status.stages[0].interval_secs, 600);
        assert_eq!(status.stages[1].name, StageName::Ingest);
    }

    #[tokio::test]
    async fn test_trigger_unknown_stage() {
        let scheduler = scheduler();
        let result = scheduler.trigger(StageName::Ingest).await;
        assert!(matches!(result, Err(SchedulerError::UnknownStage(_))));
    }

    #[tokio::test]
    async fn test_trigger_retries_failed_runs() {
        let scheduler = scheduler();
        let stage = Arc::new(CountingStage {
            fail_first: 2,
            ..CountingStage::new(StageName::Discovery)
        });
        scheduler
            .register(stage.clone(), Duration::from_secs(600))
            .await
            .unwrap();

        let report = scheduler.trigger(StageName::Discovery).await.unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(stage.runs(), 3);

        let status = scheduler.status().await;
        let last = status.stages[0].last_run.clone().unwrap();
        assert_eq!(last.attempts, 3);
        assert!(last.error.is_none());
        assert_eq!(status.stages[0].failures, 0);
    }

    #[tokio::test]
    async fn test_trigger_gives_up_after_attempts() {
        let scheduler = scheduler();
        let stage = Arc::new(CountingStage {
            fail_first: 10,
            ..CountingStage::new(StageName::Discovery)
        });
        scheduler
            .register(stage.clone(), Duration::from_secs(600))
            .await
            .unwrap();

        let result = scheduler.trigger(StageName::Discovery).await;
        assert!(matches!(
            result,
            Err(SchedulerError::StageFailed { attempts: 3, .. })
        ));
        assert_eq!(stage.runs(), 3);
        assert_eq!(scheduler.status().await.stages[0].failures, 1);
    }

    #[tokio::test]
    async fn test_stage_does_not_overlap_with_itself() {
        let scheduler = Arc::new(scheduler());
        let stage = Arc::new(CountingStage {
            delay: Duration::from_millis(200),
            ..CountingStage::new(StageName::Scrape)
        });
        scheduler
            .register(stage.clone(), Duration::from_secs(600))
            .await
            .unwrap();

        let background = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.trigger(StageName::Scrape).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = scheduler.trigger(StageName::Scrape).await;
        assert!(matches!(
            second,
            Err(SchedulerError::AlreadyRunning(StageName::Scrape))
        ));
        assert!(scheduler.status().await.stages[0].in_flight);

        background.await.unwrap().unwrap();
        assert_eq!(stage.runs(), 1);
        assert!(!scheduler.status().await.stages[0].in_flight);
    }

    #[tokio::test]
    async fn test_loops_run_on_interval_until_stopped() {
        let scheduler = scheduler();
        let stage = Arc::new(CountingStage::new(StageName::Ingest));
        scheduler
            .register(stage.clone(), Duration::from_millis(20))
            .await
            .unwrap();

        scheduler.start().await;
        assert!(scheduler.is_running());
        tokio::time::sleep(Duration::from_millis(150)).await;
        scheduler.stop().await;
        assert!(scheduler.wait_idle(Duration::from_secs(1)).await);

        let runs_at_stop = stage.runs();
        assert!(runs_at_stop >= 2, "expected several runs, got {}", runs_at_stop);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(stage.runs(), runs_at_stop);
        assert!(!scheduler.status().await.running);
    }

    #[tokio::test]
    async fn test_stop_does_not_abort_in_flight_run() {
        let scheduler = scheduler();
        let stage = Arc::new(CountingStage {
            delay: Duration::from_millis(200),
            ..CountingStage::new(StageName::Enrich)
        });
        scheduler
            .register(stage.clone(), Duration::from_millis(10))
            .await
            .unwrap();

        scheduler.start().await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        scheduler.stop().await;

        assert!(scheduler.wait_idle(Duration::from_secs(2)).await);
        let status = scheduler.status().await;
        assert_eq!(status.stages[0].runs, 1);
        assert!(status.stages[0].last_run.as_ref().unwrap().report.is_some());
    }
}
