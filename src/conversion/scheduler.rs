// Batch queue, worker pool, progress aggregation and cancellation.
use super::*;

use std::panic::{self, AssertUnwindSafe};
use std::thread::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobStatus {
    Queued,
    Probing,
    Pass1Running,
    Pass2Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Short human label used by the console front end.
    pub fn label(self) -> &'static str {
        match self {
            Self::Queued => "Queued",
            Self::Probing => "Analyzing...",
            Self::Pass1Running => "Pass 1...",
            Self::Pass2Running => "Pass 2...",
            Self::Succeeded => "Done",
            Self::Failed => "Error",
            Self::Cancelled => "Cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub id: JobId,
    pub source: PathBuf,
    pub output: PathBuf,
    pub target_ratio: TargetRatio,
    pub crop_mode: CropMode,
    pub status: JobStatus,
    pub pass_progress: f64,
    pub progress: f64,
    pub duration_seconds: Option<f64>,
    pub error: Option<JobError>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub job_id: JobId,
    pub source: PathBuf,
    pub status: JobStatus,
    pub pass_progress: f64,
    pub progress: f64,
    pub batch_progress: f64,
    pub error: Option<JobError>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BatchEvent {
    Job(JobEvent),
    Complete(BatchSummary),
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub concurrency: usize,
    pub long_edge: u32,
    pub encode: EncodeProfile,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            long_edge: geometry::DEFAULT_LONG_EDGE,
            encode: EncodeProfile::default(),
        }
    }
}

impl BatchConfig {
    pub fn from_settings(settings: &ConverterSettings) -> Self {
        Self {
            concurrency: settings.concurrency.max(1),
            long_edge: settings.long_edge,
            encode: settings.encode.clone(),
        }
    }
}

struct JobEntry {
    id: JobId,
    spec: JobSpec,
    status: JobStatus,
    pass_progress: f64,
    progress: f64,
    duration_seconds: Option<f64>,
    error: Option<JobError>,
    cancel: CancelToken,
    probed: Option<Result<SourceMetadata, JobError>>,
}

struct ClaimedJob {
    job_id: JobId,
    spec: JobSpec,
    cancel: CancelToken,
    probed: Option<Result<SourceMetadata, JobError>>,
}

impl JobEntry {
    fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            source: self.spec.source().to_path_buf(),
            output: self.spec.output().to_path_buf(),
            target_ratio: self.spec.target_ratio(),
            crop_mode: self.spec.crop_mode(),
            status: self.status,
            pass_progress: self.pass_progress,
            progress: self.progress,
            duration_seconds: self.duration_seconds,
            error: self.error.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchPhase {
    Idle,
    Running,
    Finished,
}

struct BatchState {
    jobs: Vec<JobEntry>,
    index: HashMap<JobId, usize>,
    sources: HashSet<PathBuf>,
    outputs: HashSet<PathBuf>,
    queue: VecDeque<JobId>,
    phase: BatchPhase,
    active_workers: usize,
    spawned_workers: usize,
    progress_floor: f64,
}

impl BatchState {
    fn new() -> Self {
        Self {
            jobs: Vec::new(),
            index: HashMap::new(),
            sources: HashSet::new(),
            outputs: HashSet::new(),
            queue: VecDeque::new(),
            phase: BatchPhase::Idle,
            active_workers: 0,
            spawned_workers: 0,
            progress_floor: 0.0,
        }
    }

    fn entry_mut(&mut self, job_id: JobId) -> Option<&mut JobEntry> {
        let position = *self.index.get(&job_id)?;
        self.jobs.get_mut(position)
    }

    fn entry(&self, job_id: JobId) -> Option<&JobEntry> {
        let position = *self.index.get(&job_id)?;
        self.jobs.get(position)
    }

    /// Duration-weighted completion. Durations are read at enqueue, so weights
    /// only change when jobs are added. Jobs whose probe failed weigh the mean
    /// of the known durations; finished jobs count as complete.
    fn raw_progress(&self) -> f64 {
        if self.jobs.is_empty() {
            return 0.0;
        }
        let known: Vec<f64> = self
            .jobs
            .iter()
            .filter_map(|job| job.duration_seconds)
            .filter(|duration| duration.is_finite() && *duration > 0.0)
            .collect();
        let fallback_weight = if known.is_empty() {
            1.0
        } else {
            known.iter().sum::<f64>() / known.len() as f64
        };

        let mut weighted = 0.0;
        let mut total = 0.0;
        for job in &self.jobs {
            let weight = job
                .duration_seconds
                .filter(|duration| duration.is_finite() && *duration > 0.0)
                .unwrap_or(fallback_weight);
            let fraction = if job.status.is_terminal() {
                1.0
            } else {
                job.progress
            };
            weighted += weight * fraction;
            total += weight;
        }
        if total <= 0.0 {
            0.0
        } else {
            (weighted / total).clamp(0.0, 1.0)
        }
    }

    fn batch_progress(&mut self) -> f64 {
        let progress = self.raw_progress().max(self.progress_floor);
        self.progress_floor = progress;
        progress
    }

    fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for job in &self.jobs {
            match job.status {
                JobStatus::Succeeded => summary.succeeded += 1,
                JobStatus::Failed => summary.failed += 1,
                JobStatus::Cancelled => summary.cancelled += 1,
                _ => {}
            }
        }
        summary
    }
}

struct SchedulerShared {
    state: Mutex<BatchState>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    events_sender: Sender<BatchEvent>,
    events_receiver: Receiver<BatchEvent>,
    probe: Arc<dyn MetadataProbe>,
    runner: Arc<dyn PassRunner>,
    config: BatchConfig,
}

/// Owns a batch of jobs and converts them on a bounded pool of worker threads.
///
/// Events are sent while the state lock is held, so the channel order matches
/// the order in which state changed.
#[derive(Clone)]
pub struct BatchScheduler {
    shared: Arc<SchedulerShared>,
}

impl BatchScheduler {
    pub fn new(
        probe: Arc<dyn MetadataProbe>,
        runner: Arc<dyn PassRunner>,
        config: BatchConfig,
    ) -> Self {
        let (events_sender, events_receiver) = crossbeam_channel::unbounded();
        Self {
            shared: Arc::new(SchedulerShared {
                state: Mutex::new(BatchState::new()),
                workers: Mutex::new(Vec::new()),
                events_sender,
                events_receiver,
                probe,
                runner,
                config: BatchConfig {
                    concurrency: config.concurrency.max(1),
                    ..config
                },
            }),
        }
    }

    /// Receiver for the event stream. Clones share one queue, so each event
    /// is delivered to exactly one receiver.
    pub fn events(&self) -> Receiver<BatchEvent> {
        self.shared.events_receiver.clone()
    }

    /// Adds jobs to the batch. The whole call is rejected if any spec clashes
    /// with another spec in the call or with a job already in the batch.
    ///
    /// Every source is probed before it is queued, so its weight in the batch
    /// progress is final before any progress is reported. A failed probe is
    /// kept and surfaces when the job runs.
    pub fn enqueue(&self, specs: Vec<JobSpec>) -> Result<Vec<JobId>, BatchError> {
        if self.is_finished() {
            return Err(BatchError::Finished);
        }
        let probed: Vec<Result<SourceMetadata, JobError>> = specs
            .iter()
            .map(|spec| self.shared.probe.probe(spec.source()))
            .collect();

        let mut state = self.shared.state.lock();
        if state.phase == BatchPhase::Finished {
            return Err(BatchError::Finished);
        }

        let mut new_sources: HashSet<PathBuf> = HashSet::new();
        let mut new_outputs: HashSet<PathBuf> = HashSet::new();
        for spec in &specs {
            let source = spec.source().to_path_buf();
            let output = spec.output().to_path_buf();
            if source == output {
                return Err(BatchError::OutputEqualsSource(source));
            }
            if state.sources.contains(&source) || !new_sources.insert(source.clone()) {
                return Err(BatchError::DuplicateSource(source));
            }
            if state.outputs.contains(&output) || !new_outputs.insert(output.clone()) {
                return Err(BatchError::DuplicateOutput(output));
            }
        }
        for spec in &specs {
            let output = spec.output();
            if state.sources.contains(output) || new_sources.contains(output) {
                return Err(BatchError::OutputEqualsSource(output.to_path_buf()));
            }
            let source = spec.source();
            if state.outputs.contains(source) || new_outputs.contains(source) {
                return Err(BatchError::OutputEqualsSource(source.to_path_buf()));
            }
        }

        let mut ids = Vec::with_capacity(specs.len());
        for (spec, probed) in specs.into_iter().zip(probed) {
            let id = JobId::new();
            let duration_seconds = probed
                .as_ref()
                .ok()
                .map(|metadata| metadata.duration_seconds);
            state.sources.insert(spec.source().to_path_buf());
            state.outputs.insert(spec.output().to_path_buf());
            let position = state.jobs.len();
            state.jobs.push(JobEntry {
                id,
                spec,
                status: JobStatus::Queued,
                pass_progress: 0.0,
                progress: 0.0,
                duration_seconds,
                error: None,
                cancel: CancelToken::new(),
                probed: Some(probed),
            });
            state.index.insert(id, position);
            state.queue.push_back(id);
            ids.push(id);
        }
        // New work lowers overall completion, so the floor restarts here.
        state.progress_floor = 0.0;
        for id in &ids {
            self.emit_job_event(&mut state, *id);
        }
        debug!("enqueued {} jobs ({} total)", ids.len(), state.jobs.len());

        if state.phase == BatchPhase::Running {
            self.spawn_workers(&mut state);
        }
        Ok(ids)
    }

    pub fn start(&self) -> Result<(), BatchError> {
        let mut state = self.shared.state.lock();
        match state.phase {
            BatchPhase::Running => return Err(BatchError::AlreadyStarted),
            BatchPhase::Finished => return Err(BatchError::Finished),
            BatchPhase::Idle => {}
        }
        state.phase = BatchPhase::Running;
        info!(
            "starting batch: {} queued, concurrency {}",
            state.queue.len(),
            self.shared.config.concurrency
        );
        self.spawn_workers(&mut state);
        if state.active_workers == 0 {
            self.finish_batch(&mut state);
        }
        Ok(())
    }

    pub fn cancel_one(&self, job_id: JobId) -> Result<(), BatchError> {
        let mut state = self.shared.state.lock();
        if state.entry(job_id).is_none() {
            return Err(BatchError::UnknownJob(job_id.to_string()));
        }
        self.cancel_locked(&mut state, job_id);
        Ok(())
    }

    pub fn cancel_all(&self) {
        let mut state = self.shared.state.lock();
        let ids: Vec<JobId> = state.jobs.iter().map(|job| job.id).collect();
        info!("cancelling all jobs");
        for id in ids {
            self.cancel_locked(&mut state, id);
        }
    }

    pub fn snapshot(&self) -> Vec<JobSnapshot> {
        let state = self.shared.state.lock();
        state.jobs.iter().map(JobEntry::snapshot).collect()
    }

    pub fn job(&self, job_id: JobId) -> Option<JobSnapshot> {
        let state = self.shared.state.lock();
        state.entry(job_id).map(JobEntry::snapshot)
    }

    pub fn overall_progress(&self) -> f64 {
        self.shared.state.lock().batch_progress()
    }

    pub fn summary(&self) -> BatchSummary {
        self.shared.state.lock().summary()
    }

    pub fn is_finished(&self) -> bool {
        self.shared.state.lock().phase == BatchPhase::Finished
    }

    /// Blocks until every worker spawned so far, and any spawned meanwhile, has exited.
    pub fn wait(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = self.shared.workers.lock().drain(..).collect();
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if handle.join().is_err() {
                    error!("conversion worker panicked");
                }
            }
        }
    }

    fn cancel_locked(&self, state: &mut BatchState, job_id: JobId) {
        let Some(entry) = state.entry(job_id) else {
            return;
        };
        if entry.status.is_terminal() {
            return;
        }

        if let Some(position) = state.queue.iter().position(|queued| *queued == job_id) {
            state.queue.remove(position);
            if let Some(entry) = state.entry_mut(job_id) {
                entry.cancel.cancel();
                entry.status = JobStatus::Cancelled;
            }
            info!("cancelled queued job {job_id}");
            self.emit_job_event(state, job_id);
        } else if let Some(entry) = state.entry_mut(job_id) {
            info!("cancelling running job {job_id}");
            entry.cancel.cancel();
        }
    }

    fn spawn_workers(&self, state: &mut BatchState) {
        let wanted = self
            .shared
            .config
            .concurrency
            .saturating_sub(state.active_workers)
            .min(state.queue.len());
        for _ in 0..wanted {
            state.spawned_workers += 1;
            let name = format!("convert-worker-{}", state.spawned_workers);
            let scheduler = self.clone();
            match thread::Builder::new()
                .name(name.clone())
                .spawn(move || scheduler.worker_loop())
            {
                Ok(handle) => {
                    state.active_workers += 1;
                    self.shared.workers.lock().push(handle);
                    debug!("spawned {name}");
                }
                Err(spawn_error) => error!("failed to spawn {name}: {spawn_error}"),
            }
        }
    }

    fn worker_loop(&self) {
        loop {
            let claimed = {
                let mut state = self.shared.state.lock();
                match Self::claim_next(&mut state) {
                    Some(claimed) => claimed,
                    None => {
                        state.active_workers = state.active_workers.saturating_sub(1);
                        if state.active_workers == 0 && state.phase == BatchPhase::Running {
                            self.finish_batch(&mut state);
                        }
                        return;
                    }
                }
            };
            self.run_claimed(claimed);
        }
    }

    fn claim_next(state: &mut BatchState) -> Option<ClaimedJob> {
        while let Some(job_id) = state.queue.pop_front() {
            match state.entry_mut(job_id) {
                Some(entry) if entry.status == JobStatus::Queued => {
                    return Some(ClaimedJob {
                        job_id,
                        spec: entry.spec.clone(),
                        cancel: entry.cancel.clone(),
                        probed: entry.probed.take(),
                    });
                }
                Some(entry) => {
                    error!(
                        "queued job {job_id} was already {:?}; skipping",
                        entry.status
                    );
                }
                None => error!("queued job {job_id} is missing from the batch; skipping"),
            }
        }
        None
    }

    /// Runs a claimed job. A panic below this point fails the job instead of
    /// taking the worker down, so the worker still retires and the batch
    /// still completes.
    fn run_claimed(&self, claimed: ClaimedJob) {
        let ClaimedJob {
            job_id,
            spec,
            cancel,
            probed,
        } = claimed;
        info!("job {job_id}: converting {}", spec.source().to_string_lossy());
        let context = JobContext {
            probe: self.shared.probe.as_ref(),
            runner: self.shared.runner.as_ref(),
            profile: &self.shared.config.encode,
            long_edge: self.shared.config.long_edge,
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            run_job(&spec, &context, &cancel, probed, &mut |update| {
                self.apply_update(job_id, update)
            })
        }))
        .unwrap_or_else(|_| {
            error!("job {job_id}: conversion panicked");
            JobOutcome::Failed(JobError::Internal("conversion panicked".to_string()))
        });
        self.finish_job(job_id, outcome);
    }

    fn apply_update(&self, job_id: JobId, update: JobUpdate) {
        let mut state = self.shared.state.lock();
        let Some(entry) = state.entry_mut(job_id) else {
            error!("update for unknown job {job_id}");
            return;
        };
        if entry.status.is_terminal() {
            return;
        }
        match update {
            JobUpdate::Status(status) => {
                entry.status = status;
                entry.pass_progress = 0.0;
            }
            JobUpdate::Probed { duration_seconds } => {
                entry.duration_seconds = Some(duration_seconds);
                return;
            }
            JobUpdate::Progress {
                pass_progress,
                progress,
            } => {
                entry.pass_progress = entry.pass_progress.max(pass_progress);
                entry.progress = entry.progress.max(progress);
            }
        }
        self.emit_job_event(&mut state, job_id);
    }

    fn finish_job(&self, job_id: JobId, outcome: JobOutcome) {
        let mut state = self.shared.state.lock();
        let Some(entry) = state.entry_mut(job_id) else {
            error!("outcome for unknown job {job_id}");
            return;
        };
        entry.status = outcome.status();
        match outcome {
            JobOutcome::Succeeded => {
                entry.pass_progress = 1.0;
                entry.progress = 1.0;
                info!("job {job_id}: done");
            }
            JobOutcome::Failed(job_error) => {
                warn!("job {job_id}: {job_error}");
                entry.error = Some(job_error);
            }
            JobOutcome::Cancelled => info!("job {job_id}: cancelled"),
        }
        self.emit_job_event(&mut state, job_id);
    }

    fn finish_batch(&self, state: &mut BatchState) {
        state.phase = BatchPhase::Finished;
        let summary = state.summary();
        info!(
            "batch complete: {} succeeded, {} failed, {} cancelled",
            summary.succeeded, summary.failed, summary.cancelled
        );
        let _ = self
            .shared
            .events_sender
            .send(BatchEvent::Complete(summary));
    }

    fn emit_job_event(&self, state: &mut BatchState, job_id: JobId) {
        let batch_progress = state.batch_progress();
        let Some(entry) = state.entry(job_id) else {
            return;
        };
        let event = JobEvent {
            job_id,
            source: entry.spec.source().to_path_buf(),
            status: entry.status,
            pass_progress: entry.pass_progress,
            progress: entry.progress,
            batch_progress,
            error: entry.error.clone(),
        };
        let _ = self.shared.events_sender.send(BatchEvent::Job(event));
    }
}
