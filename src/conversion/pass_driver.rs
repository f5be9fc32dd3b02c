// Runs one encoder pass as a child process and streams its diagnostics.
use super::*;

use crossbeam_channel::RecvTimeoutError;
use std::process::Stdio;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);
pub(crate) const DEFAULT_CANCEL_GRACE: Duration = Duration::from_millis(3000);
pub(crate) const DEFAULT_TAIL_LINES: usize = 6;

/// Shared cancellation flag. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct PassInvocation {
    pub pass: u8,
    pub args: Vec<String>,
    pub total_duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassResult {
    pub exit_code: Option<i32>,
    pub duration_processed: f64,
    pub last_error: Option<String>,
    pub cancelled: bool,
}

impl PassResult {
    pub fn succeeded(&self) -> bool {
        !self.cancelled && self.exit_code == Some(0) && self.last_error.is_none()
    }
}

pub trait PassRunner: Send + Sync {
    /// Runs one pass to completion or cancellation. `on_progress` receives
    /// non-decreasing fractions in `[0, 1]`.
    fn run_pass(
        &self,
        invocation: &PassInvocation,
        cancel: &CancelToken,
        on_progress: &mut dyn FnMut(f64),
    ) -> Result<PassResult, JobError>;
}

struct DiagnosticState {
    tail: VecDeque<String>,
    tail_limit: usize,
    total_duration: f64,
    processed: f64,
    fraction: f64,
    fatal: bool,
}

impl DiagnosticState {
    fn new(tail_limit: usize, total_duration: f64) -> Self {
        Self {
            tail: VecDeque::with_capacity(tail_limit),
            tail_limit: tail_limit.max(1),
            total_duration,
            processed: 0.0,
            fraction: 0.0,
            fatal: false,
        }
    }

    fn observe(&mut self, line: &str, on_progress: &mut dyn FnMut(f64)) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }
        if is_fatal_diagnostic(trimmed) {
            self.fatal = true;
        }
        if let Some(elapsed) = parse_progress_time(trimmed) {
            self.processed = self.processed.max(elapsed);
        }
        if let Some(fraction) = progress_fraction(trimmed, self.total_duration) {
            if fraction > self.fraction {
                self.fraction = fraction;
                on_progress(fraction);
            }
        }

        if self.tail.len() == self.tail_limit {
            self.tail.pop_front();
        }
        self.tail.push_back(trimmed.to_string());
    }

    fn error_message(&self) -> String {
        format_diagnostic_tail(&self.tail, self.tail_limit)
            .map(|tail| format!("FFmpeg: {tail}"))
            .unwrap_or_else(|| "FFmpeg exited with an error.".to_string())
    }
}

#[derive(Debug, Clone)]
pub struct FfmpegPassRunner {
    ffmpeg_binary: PathBuf,
    grace: Duration,
    tail_lines: usize,
}

impl FfmpegPassRunner {
    pub fn new(ffmpeg_binary: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_binary: ffmpeg_binary.into(),
            grace: DEFAULT_CANCEL_GRACE,
            tail_lines: DEFAULT_TAIL_LINES,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn with_tail_lines(mut self, tail_lines: usize) -> Self {
        self.tail_lines = tail_lines.max(1);
        self
    }
}

impl PassRunner for FfmpegPassRunner {
    fn run_pass(
        &self,
        invocation: &PassInvocation,
        cancel: &CancelToken,
        on_progress: &mut dyn FnMut(f64),
    ) -> Result<PassResult, JobError> {
        let pass = invocation.pass;
        let mut child = hidden_command(&self.ffmpeg_binary)
            .args(&invocation.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| JobError::Encode {
                pass,
                message: format!("Failed to start FFmpeg: {error}"),
            })?;
        let mut stdin = child.stdin.take();
        let Some(stderr) = child.stderr.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(JobError::Encode {
                pass,
                message: "Failed to capture FFmpeg diagnostics.".to_string(),
            });
        };
        debug!("pass {pass} started (pid {})", child.id());

        let (line_sender, line_receiver) = crossbeam_channel::unbounded::<String>();
        let reader_handle = thread::spawn(move || {
            let mut reader = BufReader::new(stderr);
            let mut raw_buffer = Vec::<u8>::new();
            loop {
                match read_lossy_diagnostic_line(&mut reader, &mut raw_buffer) {
                    Ok(Some(line)) => {
                        if line_sender.send(line).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(error) => {
                        let _ = line_sender.send(format!("Failed to read FFmpeg diagnostics: {error}"));
                        break;
                    }
                }
            }
        });

        let mut diagnostics = DiagnosticState::new(self.tail_lines, invocation.total_duration);
        let mut cancel_requested_at: Option<Instant> = None;
        let mut killed = false;

        let status = loop {
            if cancel_requested_at.is_none() && cancel.is_cancelled() {
                info!("pass {pass}: cancellation requested, asking FFmpeg to stop");
                if let Some(mut pipe) = stdin.take() {
                    let _ = pipe.write_all(b"q\n");
                    let _ = pipe.flush();
                }
                cancel_requested_at = Some(Instant::now());
            }
            if let Some(requested_at) = cancel_requested_at {
                if !killed && requested_at.elapsed() >= self.grace {
                    warn!("pass {pass}: FFmpeg ignored the stop request, killing it");
                    let _ = child.kill();
                    killed = true;
                }
            }

            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(error) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(JobError::Encode {
                        pass,
                        message: format!("Failed while waiting for FFmpeg: {error}"),
                    });
                }
            }

            match line_receiver.recv_timeout(POLL_INTERVAL) {
                Ok(line) => diagnostics.observe(&line, on_progress),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => thread::sleep(POLL_INTERVAL),
            }
        };
        drop(stdin);

        // Lines still buffered after exit. A stray grandchild can keep the pipe
        // open, so the reader is only joined once it has hung up.
        let drain_deadline = Instant::now() + DRAIN_TIMEOUT;
        loop {
            let remaining = drain_deadline.saturating_duration_since(Instant::now());
            match line_receiver.recv_timeout(remaining) {
                Ok(line) => diagnostics.observe(&line, on_progress),
                Err(RecvTimeoutError::Disconnected) => {
                    let _ = reader_handle.join();
                    break;
                }
                Err(RecvTimeoutError::Timeout) => break,
            }
        }

        let cancelled = cancel_requested_at.is_some();
        let clean_exit = status.success() && !diagnostics.fatal;
        let last_error = if cancelled || clean_exit {
            None
        } else {
            Some(diagnostics.error_message())
        };
        debug!(
            "pass {pass} finished with {:?} after {:.2}s of media",
            status.code(),
            diagnostics.processed
        );

        Ok(PassResult {
            exit_code: status.code(),
            duration_processed: diagnostics.processed,
            last_error,
            cancelled,
        })
    }
}
