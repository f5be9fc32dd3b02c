// Probe plus two encoder passes for a single job.
use super::*;

const PROGRESS_EMIT_STEP: f64 = 0.01;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum JobUpdate {
    Status(JobStatus),
    Probed { duration_seconds: f64 },
    Progress { pass_progress: f64, progress: f64 },
}

#[derive(Debug, Clone)]
pub(crate) enum JobOutcome {
    Succeeded,
    Failed(JobError),
    Cancelled,
}

impl JobOutcome {
    pub(crate) fn status(&self) -> JobStatus {
        match self {
            Self::Succeeded => JobStatus::Succeeded,
            Self::Failed(_) => JobStatus::Failed,
            Self::Cancelled => JobStatus::Cancelled,
        }
    }
}

pub(crate) struct JobContext<'a> {
    pub(crate) probe: &'a dyn MetadataProbe,
    pub(crate) runner: &'a dyn PassRunner,
    pub(crate) profile: &'a EncodeProfile,
    pub(crate) long_edge: u32,
}

fn ensure_not_cancelled(cancel: &CancelToken) -> Result<(), JobError> {
    if cancel.is_cancelled() {
        Err(JobError::Cancelled)
    } else {
        Ok(())
    }
}

/// Runs one job to a terminal outcome. `probed` carries metadata read when the
/// job was queued; the source is only probed here when it is absent.
pub(crate) fn run_job(
    spec: &JobSpec,
    context: &JobContext<'_>,
    cancel: &CancelToken,
    probed: Option<Result<SourceMetadata, JobError>>,
    on_update: &mut dyn FnMut(JobUpdate),
) -> JobOutcome {
    match drive_job(spec, context, cancel, probed, on_update) {
        Ok(()) => JobOutcome::Succeeded,
        Err(error) if error.is_cancelled() => JobOutcome::Cancelled,
        Err(error) => JobOutcome::Failed(error),
    }
}

fn drive_job(
    spec: &JobSpec,
    context: &JobContext<'_>,
    cancel: &CancelToken,
    probed: Option<Result<SourceMetadata, JobError>>,
    on_update: &mut dyn FnMut(JobUpdate),
) -> Result<(), JobError> {
    ensure_not_cancelled(cancel)?;
    on_update(JobUpdate::Status(JobStatus::Probing));
    let metadata = match probed {
        Some(result) => result?,
        None => context.probe.probe(spec.source())?,
    };
    on_update(JobUpdate::Probed {
        duration_seconds: metadata.duration_seconds,
    });
    ensure_not_cancelled(cancel)?;

    let geometry = plan_with_long_edge(
        metadata.display_width(),
        metadata.display_height(),
        spec.target_ratio(),
        spec.crop_mode(),
        context.long_edge,
    )?;
    debug!(
        "{}: {}x{} (rotation {}) -> {}x{} via {}",
        spec.source().to_string_lossy(),
        metadata.width,
        metadata.height,
        metadata.rotation,
        geometry.target_width,
        geometry.target_height,
        geometry.filter_chain()
    );

    let artifacts = JobArtifacts::prepare(spec)?;

    on_update(JobUpdate::Status(JobStatus::Pass1Running));
    run_single_pass(
        context,
        cancel,
        1,
        build_analysis_args(spec, &geometry, context.profile),
        metadata.duration_seconds,
        on_update,
    )?;
    ensure_not_cancelled(cancel)?;

    on_update(JobUpdate::Status(JobStatus::Pass2Running));
    run_single_pass(
        context,
        cancel,
        2,
        build_encode_args(spec, &geometry, context.profile),
        metadata.duration_seconds,
        on_update,
    )?;
    ensure_not_cancelled(cancel)?;

    artifacts.promote(spec.output())?;
    info!("converted {}", spec.output().to_string_lossy());
    Ok(())
}

fn run_single_pass(
    context: &JobContext<'_>,
    cancel: &CancelToken,
    pass: u8,
    args: Vec<String>,
    total_duration: f64,
    on_update: &mut dyn FnMut(JobUpdate),
) -> Result<(), JobError> {
    let invocation = PassInvocation {
        pass,
        args,
        total_duration,
    };
    let base = if pass == 1 { 0.0 } else { 0.5 };
    let mut last_reported = 0.0_f64;
    let mut report = |fraction: f64, on_update: &mut dyn FnMut(JobUpdate)| {
        let fraction = fraction.clamp(0.0, 1.0);
        let should_emit = fraction - last_reported >= PROGRESS_EMIT_STEP
            || (fraction >= 1.0 && last_reported < 1.0);
        if should_emit {
            last_reported = fraction;
            on_update(JobUpdate::Progress {
                pass_progress: fraction,
                progress: base + fraction * 0.5,
            });
        }
    };

    info!("pass {pass} starting");
    let result = context.runner.run_pass(&invocation, cancel, &mut |fraction| {
        report(fraction, &mut *on_update)
    })?;

    if result.cancelled || cancel.is_cancelled() {
        info!("pass {pass} cancelled");
        return Err(JobError::Cancelled);
    }
    if !result.succeeded() {
        let message = result.last_error.unwrap_or_else(|| match result.exit_code {
            Some(code) => format!("FFmpeg exited with code {code}."),
            None => "FFmpeg was terminated by a signal.".to_string(),
        });
        warn!("pass {pass} failed: {message}");
        return Err(JobError::Encode { pass, message });
    }

    report(1.0, on_update);
    info!("pass {pass} finished");
    Ok(())
}
