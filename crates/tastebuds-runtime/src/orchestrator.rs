//! Orchestrator — admits batches and drives their generation jobs.

use std::sync::Arc;

use tastebuds_core::{now_millis, Error, FailureReason, JobLimits, ModelKey, Result};
use tastebuds_providers::GenerationProvider;
use tastebuds_store::{
    ArtifactStore, Batch, NewBatch, PlannedRun, QuotaLedger, Run, RunOutcome, SqliteStore, Tier,
};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::job::GenerationJob;
use crate::naming::name_batch;
use crate::types::{Admitted, BatchSubmission};

/// Shared handles a spawned job needs.
#[derive(Clone)]
struct JobContext {
    store: Arc<SqliteStore>,
    artifacts: Arc<dyn ArtifactStore>,
    provider: Arc<dyn GenerationProvider>,
    permits: Arc<Semaphore>,
    limits: JobLimits,
}

/// Admits batches and runs one generation job per run.
pub struct Orchestrator {
    ctx: JobContext,
}

impl Orchestrator {
    pub fn new(
        store: Arc<SqliteStore>,
        artifacts: Arc<dyn ArtifactStore>,
        provider: Arc<dyn GenerationProvider>,
        limits: JobLimits,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(limits.max_concurrent_jobs.max(1)));
        info!(
            "Orchestrator initialized: timeout={}s, max_concurrent_jobs={}",
            limits.generation_timeout_secs, limits.max_concurrent_jobs
        );
        Self {
            ctx: JobContext {
                store,
                artifacts,
                provider,
                permits,
                limits,
            },
        }
    }

    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.ctx.store
    }

    pub fn artifacts(&self) -> &Arc<dyn ArtifactStore> {
        &self.ctx.artifacts
    }

    /// Validate, charge and persist a batch, then launch its jobs.
    ///
    /// Returns as soon as the rows are committed; generation and naming
    /// continue on spawned tasks. Must be called within a Tokio runtime.
    pub fn submit_batch(&self, owner_id: &str, submission: &BatchSubmission) -> Result<Admitted> {
        let new_batch = validate(owner_id, submission)?;
        let plan = plan_runs(&new_batch.flavors, &new_batch.models);
        let cost = plan.len() as i64;

        self.check_quota(owner_id, cost)?;

        let (batch, runs) = self.ctx.store.create_batch(
            &new_batch,
            &plan,
            cost,
            self.ctx.limits.free_project_limit,
        )?;
        info!(
            batch_id = %batch.id,
            "Admitted batch: {} flavors x {} models, charged {} credits",
            batch.flavors.len(),
            batch.models.len(),
            cost
        );

        let jobs = runs
            .iter()
            .zip(&plan)
            .map(|(run, planned)| self.launch(GenerationJob::new(&batch, run, planned.model)))
            .collect();
        let naming = self.spawn_naming(&batch);

        Ok(Admitted {
            batch,
            runs,
            jobs,
            naming,
        })
    }

    /// Re-run a terminal run of a batch owned by `owner_id`.
    pub fn start_run(
        &self,
        owner_id: &str,
        batch_id: &str,
        run_id: &str,
    ) -> Result<(Run, JoinHandle<RunOutcome>)> {
        let batch = self
            .ctx
            .store
            .get_batch(batch_id)?
            .ok_or_else(|| Error::NotFound(format!("Batch {}", batch_id)))?;
        if batch.owner_id != owner_id {
            return Err(Error::Authz(format!("Batch {} belongs to another user", batch_id)));
        }
        let run = self
            .ctx
            .store
            .get_run(batch_id, run_id)?
            .ok_or_else(|| Error::NotFound(format!("Run {}", run_id)))?;
        let job = GenerationJob::for_run(&batch, &run)?;

        if !self.ctx.store.restart_run(run_id, now_millis())? {
            return Err(Error::Conflict(format!("Run {} is still pending", run_id)));
        }
        let run = self
            .ctx
            .store
            .get_run(batch_id, run_id)?
            .ok_or_else(|| Error::NotFound(format!("Run {}", run_id)))?;

        info!(batch_id, run_id, "Restarting run");
        let handle = self.launch(job);
        Ok((run, handle))
    }

    /// Fail runs left pending by a previous process.
    pub fn recover_orphans(&self) -> Result<usize> {
        let count = self.ctx.store.fail_orphaned_runs(now_millis())?;
        if count > 0 {
            warn!("Marked {} interrupted runs as failed", count);
        }
        Ok(count)
    }

    /// Pre-flight quota questions. `create_batch` re-checks both inside
    /// its transaction.
    fn check_quota(&self, owner_id: &str, cost: i64) -> Result<()> {
        let ledger: &dyn QuotaLedger = self.ctx.store.as_ref();
        let available = ledger.credits(owner_id)?;
        if available < cost {
            return Err(Error::InsufficientCredits {
                needed: cost,
                available,
            });
        }

        if ledger.tier(owner_id)? == Tier::Free {
            let limit = self.ctx.limits.free_project_limit;
            if ledger.count_batches(owner_id)? >= limit {
                return Err(Error::ProjectLimitReached { limit });
            }
        }
        Ok(())
    }

    fn launch(&self, job: GenerationJob) -> JoinHandle<RunOutcome> {
        let ctx = self.ctx.clone();
        debug!(run_id = %job.run_id, model = %job.model, "Spawning generation job");
        tokio::spawn(run_job(ctx, job))
    }

    fn spawn_naming(&self, batch: &Batch) -> JoinHandle<()> {
        let store = self.ctx.store.clone();
        let provider = self.ctx.provider.clone();
        let batch_id = batch.id.clone();
        let prompt = batch.prompt.clone();
        let budget = self.ctx.limits.generation_timeout();
        tokio::spawn(async move {
            let naming = name_batch(provider.as_ref(), &store, &batch_id, &prompt);
            match tokio::time::timeout(budget, naming).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(batch_id = %batch_id, "Naming failed: {}", e),
                Err(_) => warn!(batch_id = %batch_id, "Naming gave up after {}s", budget.as_secs()),
            }
        })
    }
}

/// Wait for a permit, race the job against the budget, record the outcome.
async fn run_job(ctx: JobContext, job: GenerationJob) -> RunOutcome {
    let _permit = match ctx.permits.clone().acquire_owned().await {
        Ok(p) => p,
        Err(_) => {
            let outcome = RunOutcome::failed(FailureReason::Internal, "Job pool closed");
            record(&ctx.store, &job, &outcome);
            return outcome;
        }
    };

    let budget = ctx.limits.generation_timeout();
    let execution = job.execute(ctx.provider.as_ref(), ctx.artifacts.as_ref());

    let outcome = match tokio::time::timeout(budget, execution).await {
        Ok(Ok(())) => RunOutcome::Succeeded,
        Ok(Err(e)) => {
            warn!(run_id = %job.run_id, "Generation failed: {}", e);
            RunOutcome::failed(e.failure_reason(), e.to_string())
        }
        Err(_) => {
            let e = Error::Timeout(budget.as_secs());
            warn!(run_id = %job.run_id, "Generation cancelled: {}", e);
            RunOutcome::failed(FailureReason::Timeout, e.to_string())
        }
    };

    record(&ctx.store, &job, &outcome);
    outcome
}

fn record(store: &SqliteStore, job: &GenerationJob, outcome: &RunOutcome) {
    match store.complete_run(&job.run_id, outcome, now_millis()) {
        Ok(true) => info!(run_id = %job.run_id, status = outcome.status().as_str(), "Run finished"),
        Ok(false) => debug!(run_id = %job.run_id, "Run already terminal, outcome dropped"),
        Err(e) => error!(run_id = %job.run_id, "Failed to record run outcome: {}", e),
    }
}

/// Normalise and check a submission. Nothing is written on failure.
pub fn validate(owner_id: &str, submission: &BatchSubmission) -> Result<NewBatch> {
    if owner_id.trim().is_empty() {
        return Err(Error::Validation("Owner is required".into()));
    }

    let prompt = submission.prompt.trim();
    if prompt.is_empty() {
        return Err(Error::Validation("Prompt is required".into()));
    }

    if submission.flavors.is_empty() {
        return Err(Error::Validation("At least one flavor is required".into()));
    }
    let flavors: Vec<String> = submission
        .flavors
        .iter()
        .map(|f| f.trim().to_string())
        .collect();
    if flavors.iter().any(String::is_empty) {
        return Err(Error::Validation("Flavors must not be empty".into()));
    }

    if submission.models.is_empty() {
        return Err(Error::Validation("At least one model is required".into()));
    }
    let models = submission
        .models
        .iter()
        .map(|m| ModelKey::parse(m))
        .collect::<Result<Vec<_>>>()?;

    Ok(NewBatch {
        owner_id: owner_id.to_string(),
        prompt: prompt.to_string(),
        flavors,
        models,
    })
}

/// Flavor-major run plan: `(flavors[i], models[j])` gets order `i·k + j + 1`.
pub fn plan_runs(flavors: &[String], models: &[ModelKey]) -> Vec<PlannedRun> {
    let k = models.len();
    flavors
        .iter()
        .enumerate()
        .flat_map(|(i, flavor)| {
            models.iter().enumerate().map(move |(j, model)| PlannedRun {
                flavor: flavor.clone(),
                model: *model,
                order: (i * k + j + 1) as i64,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tastebuds_providers::{GenerationRequest, Target};
    use tastebuds_store::{ArtifactKey, MemoryArtifactStore, RunStatus};

    const DOC: &str = "<!DOCTYPE html><html><body>ok</body></html>";

    /// Replies instantly, except for models listed in `hang`.
    struct FakeProvider {
        hang: Vec<ModelKey>,
        fail: Vec<ModelKey>,
        hang_naming: bool,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        dropped: Arc<AtomicBool>,
        delay: Duration,
    }

    impl FakeProvider {
        fn new() -> Self {
            Self {
                hang: Vec::new(),
                fail: Vec::new(),
                hang_naming: false,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                dropped: Arc::new(AtomicBool::new(false)),
                delay: Duration::ZERO,
            }
        }
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl GenerationProvider for FakeProvider {
        async fn generate(&self, request: &GenerationRequest) -> Result<String> {
            let model = match request.target {
                Target::Naming if self.hang_naming => {
                    let _flag = DropFlag(self.dropped.clone());
                    return futures::future::pending().await;
                }
                Target::Naming => return Ok("\"Bakery Landing\"".into()),
                Target::Model(m) => m,
            };
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang.contains(&model) {
                let _flag = DropFlag(self.dropped.clone());
                futures::future::pending::<()>().await;
            }
            if self.fail.contains(&model) {
                return Err(Error::Provider("upstream 502".into()));
            }
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(format!("```html\n{}\n```", DOC))
        }
    }

    fn setup(
        provider: FakeProvider,
        limits: JobLimits,
    ) -> (Orchestrator, Arc<FakeProvider>, Arc<MemoryArtifactStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path()).unwrap());
        store.grant_credits("owner", 100).unwrap();
        let provider = Arc::new(provider);
        let artifacts = Arc::new(MemoryArtifactStore::new());
        let orch = Orchestrator::new(store, artifacts.clone(), provider.clone(), limits);
        (orch, provider, artifacts, dir)
    }

    fn submission(flavors: &[&str], models: &[&str]) -> BatchSubmission {
        BatchSubmission {
            prompt: "  A landing page for a bakery  ".into(),
            flavors: flavors.iter().map(|s| s.to_string()).collect(),
            models: models.iter().map(|s| s.to_string()).collect(),
        }
    }

    async fn finish(admitted: Admitted) -> Vec<RunOutcome> {
        let mut outcomes = Vec::new();
        for job in admitted.jobs {
            outcomes.push(job.await.unwrap());
        }
        admitted.naming.await.unwrap();
        outcomes
    }

    #[test]
    fn test_plan_is_flavor_major() {
        let flavors = vec!["A".to_string(), "B".to_string()];
        let plan = plan_runs(&flavors, &[ModelKey::OpenAI, ModelKey::Anthropic]);
        let cells: Vec<_> = plan
            .iter()
            .map(|p| (p.flavor.as_str(), p.model, p.order))
            .collect();
        assert_eq!(
            cells,
            vec![
                ("A", ModelKey::OpenAI, 1),
                ("A", ModelKey::Anthropic, 2),
                ("B", ModelKey::OpenAI, 3),
                ("B", ModelKey::Anthropic, 4),
            ]
        );
    }

    #[test]
    fn test_plan_orders_are_contiguous() {
        let flavors: Vec<String> = (0..3).map(|i| format!("f{}", i)).collect();
        let models = ModelKey::all();
        let plan = plan_runs(&flavors, models);
        assert_eq!(plan.len(), 3 * models.len());
        for (i, planned) in plan.iter().enumerate() {
            assert_eq!(planned.order, i as i64 + 1);
        }
    }

    #[test]
    fn test_validation() {
        let ok = validate("owner", &submission(&[" A "], &["openai"])).unwrap();
        assert_eq!(ok.prompt, "A landing page for a bakery");
        assert_eq!(ok.flavors, vec!["A"]);

        let mut blank = submission(&["A"], &["openai"]);
        blank.prompt = "   ".into();
        assert!(matches!(validate("owner", &blank), Err(Error::Validation(_))));
        assert!(matches!(
            validate("owner", &submission(&[], &["openai"])),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            validate("owner", &submission(&["A", "  "], &["openai"])),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            validate("owner", &submission(&["A"], &[])),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            validate("owner", &submission(&["A"], &["gpt-2"])),
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_submit_runs_every_cell() {
        let (orch, provider, artifacts, _dir) = setup(FakeProvider::new(), JobLimits::default());

        let admitted = orch
            .submit_batch("owner", &submission(&["A", "B"], &["openai", "gemini"]))
            .unwrap();
        let batch_id = admitted.batch.id.clone();
        assert_eq!(admitted.run_ids().len(), 4);

        let outcomes = finish(admitted).await;
        assert!(outcomes.iter().all(|o| *o == RunOutcome::Succeeded));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
        assert_eq!(artifacts.len(), 4);

        let store = orch.store();
        assert_eq!(store.get_profile("owner").unwrap().unwrap().credits, 96);
        assert_eq!(
            store.get_batch(&batch_id).unwrap().unwrap().name.as_deref(),
            Some("Bakery Landing")
        );
        for run in store.list_runs(&batch_id).unwrap() {
            assert_eq!(run.status, RunStatus::Succeeded);
            assert!(run.failed_at().is_none());
            assert!(artifacts.contains(&ArtifactKey::new("owner", &batch_id, &run.id)));
        }
    }

    #[tokio::test]
    async fn test_provider_failure_marks_run_failed() {
        let mut provider = FakeProvider::new();
        provider.fail.push(ModelKey::Anthropic);
        let (orch, _provider, artifacts, _dir) = setup(provider, JobLimits::default());

        let admitted = orch
            .submit_batch("owner", &submission(&["A"], &["openai", "anthropic"]))
            .unwrap();
        let batch_id = admitted.batch.id.clone();
        finish(admitted).await;

        let runs = orch.store().list_runs(&batch_id).unwrap();
        assert_eq!(runs[0].status, RunStatus::Succeeded);
        assert_eq!(runs[1].status, RunStatus::Failed);
        assert_eq!(runs[1].failure, Some(FailureReason::Provider));
        assert_eq!(runs[1].failed_at(), runs[1].finished_at());
        assert_eq!(artifacts.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_run_and_cancels_call() {
        let mut provider = FakeProvider::new();
        provider.hang.push(ModelKey::DeepSeek);
        let (orch, provider, _artifacts, _dir) = setup(provider, JobLimits::default());

        let started = tokio::time::Instant::now();
        let admitted = orch
            .submit_batch("owner", &submission(&["A"], &["deepseek"]))
            .unwrap();
        let batch_id = admitted.batch.id.clone();
        let outcomes = finish(admitted).await;

        assert!(started.elapsed() >= Duration::from_secs(300));
        assert!(matches!(
            &outcomes[0],
            RunOutcome::Failed { reason: FailureReason::Timeout, .. }
        ));
        assert!(provider.dropped.load(Ordering::SeqCst));

        let run = &orch.store().list_runs(&batch_id).unwrap()[0];
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.failure, Some(FailureReason::Timeout));
        assert!(run.failed_at().is_some());
        assert_eq!(run.failed_at(), run.finished_at());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_naming_call_is_abandoned() {
        let mut provider = FakeProvider::new();
        provider.hang_naming = true;
        let (orch, provider, _artifacts, _dir) = setup(provider, JobLimits::default());

        let started = tokio::time::Instant::now();
        let admitted = orch
            .submit_batch("owner", &submission(&["A"], &["openai"]))
            .unwrap();
        let batch_id = admitted.batch.id.clone();
        let outcomes = finish(admitted).await;

        assert_eq!(outcomes, vec![RunOutcome::Succeeded]);
        assert!(started.elapsed() >= Duration::from_secs(300));
        assert!(provider.dropped.load(Ordering::SeqCst));
        assert!(orch.store().get_batch(&batch_id).unwrap().unwrap().name.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let mut provider = FakeProvider::new();
        provider.delay = Duration::from_secs(5);
        let limits = JobLimits {
            max_concurrent_jobs: 2,
            ..JobLimits::default()
        };
        let (orch, provider, _artifacts, _dir) = setup(provider, limits);

        let admitted = orch
            .submit_batch(
                "owner",
                &submission(&["A", "B", "C"], &["openai", "anthropic"]),
            )
            .unwrap();
        let outcomes = finish(admitted).await;

        assert_eq!(outcomes.len(), 6);
        assert!(outcomes.iter().all(|o| *o == RunOutcome::Succeeded));
        assert_eq!(provider.peak.load(Ordering::SeqCst), 2);
        assert_eq!(orch.ctx.permits.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_insufficient_credits_creates_nothing() {
        let (orch, _provider, _artifacts, _dir) = setup(FakeProvider::new(), JobLimits::default());
        orch.store().grant_credits("poor", 3).unwrap();

        let err = orch
            .submit_batch("poor", &submission(&["A", "B"], &["openai", "gemini"]))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            Error::InsufficientCredits { needed: 4, available: 3 }
        ));
        assert!(orch.store().list_batches("poor").unwrap().is_empty());
        assert_eq!(orch.store().get_profile("poor").unwrap().unwrap().credits, 3);
    }

    #[tokio::test]
    async fn test_free_tier_project_limit() {
        let limits = JobLimits {
            free_project_limit: 2,
            ..JobLimits::default()
        };
        let (orch, _provider, _artifacts, _dir) = setup(FakeProvider::new(), limits);

        for _ in 0..2 {
            let admitted = orch
                .submit_batch("owner", &submission(&["A"], &["openai"]))
                .unwrap();
            finish(admitted).await;
        }
        let err = orch
            .submit_batch("owner", &submission(&["A"], &["openai"]))
            .err()
            .unwrap();
        assert!(matches!(err, Error::ProjectLimitReached { limit: 2 }));

        orch.store().set_tier("owner", Tier::Pro).unwrap();
        let admitted = orch
            .submit_batch("owner", &submission(&["A"], &["openai"]))
            .unwrap();
        finish(admitted).await;
        assert_eq!(orch.store().list_batches("owner").unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_start_run_restarts_terminal_run() {
        let mut provider = FakeProvider::new();
        provider.fail.push(ModelKey::Glm);
        let (orch, _provider, _artifacts, _dir) = setup(provider, JobLimits::default());

        let admitted = orch
            .submit_batch("owner", &submission(&["A"], &["glm"]))
            .unwrap();
        let batch_id = admitted.batch.id.clone();
        let run_id = admitted.runs[0].id.clone();
        finish(admitted).await;

        let (run, handle) = orch.start_run("owner", &batch_id, &run_id).unwrap();
        assert_eq!(run.status, RunStatus::Pending);
        assert!(run.completed_at.is_none());

        // A second start while pending is a conflict.
        let err = orch.start_run("owner", &batch_id, &run_id).err().unwrap();
        assert!(matches!(err, Error::Conflict(_)));

        let outcome = handle.await.unwrap();
        assert!(outcome.status().is_terminal());
        assert_eq!(
            orch.store().get_run(&batch_id, &run_id).unwrap().unwrap().status,
            RunStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_start_run_errors() {
        let (orch, _provider, _artifacts, _dir) = setup(FakeProvider::new(), JobLimits::default());
        let admitted = orch
            .submit_batch("owner", &submission(&["A"], &["openai"]))
            .unwrap();
        let batch_id = admitted.batch.id.clone();
        let run_id = admitted.runs[0].id.clone();
        finish(admitted).await;

        assert!(matches!(
            orch.start_run("owner", "missing", &run_id),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            orch.start_run("owner", &batch_id, "missing"),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            orch.start_run("intruder", &batch_id, &run_id),
            Err(Error::Authz(_))
        ));
    }

    #[tokio::test]
    async fn test_late_writer_cannot_overwrite_terminal_state() {
        let (orch, _provider, _artifacts, _dir) = setup(FakeProvider::new(), JobLimits::default());
        let admitted = orch
            .submit_batch("owner", &submission(&["A"], &["openai"]))
            .unwrap();
        let batch_id = admitted.batch.id.clone();
        let run_id = admitted.runs[0].id.clone();
        finish(admitted).await;

        let late = RunOutcome::failed(FailureReason::Timeout, "late");
        assert!(!orch.store().complete_run(&run_id, &late, now_millis()).unwrap());
        let run = orch.store().get_run(&batch_id, &run_id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Succeeded);
        assert!(run.failed_at().is_none());
    }

    #[tokio::test]
    async fn test_wait_until_done_reports_completion() {
        let (orch, _provider, _artifacts, _dir) = setup(FakeProvider::new(), JobLimits::default());
        let admitted = orch
            .submit_batch("owner", &submission(&["A", "B"], &["openai"]))
            .unwrap();
        let batch_id = admitted.batch.id.clone();

        let progress = crate::status::wait_until_done(
            orch.store(),
            &batch_id,
            Duration::from_millis(10),
        )
        .await
        .unwrap();
        assert!(progress.done);
        assert_eq!(progress.completed_count, 2);
        assert_eq!(progress.total_count, 2);
    }
}
