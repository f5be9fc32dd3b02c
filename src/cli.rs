// Command-line arguments and console rendering of batch events.
use clap::Parser;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::conversion::{BatchEvent, CropMode, JobEvent, JobId, JobStatus, TargetRatio};
use crate::tooling::{normalize_settings, ConverterSettings, RuntimeToolsStatus, ToolStatus};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Convert videos into WhatsApp-friendly two-pass MP4 files",
    long_about = None
)]
pub(crate) struct Cli {
    /// Video files or file:// URLs to convert
    #[arg(required_unless_present_any = ["check_tools", "save_settings"])]
    pub(crate) inputs: Vec<String>,

    /// Target aspect ratio
    #[arg(short, long, value_enum)]
    pub(crate) ratio: Option<TargetRatio>,

    /// How to reconcile a source whose shape differs from the target
    #[arg(short, long, value_enum)]
    pub(crate) mode: Option<CropMode>,

    /// Number of files converted at the same time
    #[arg(short = 'j', long, env = "WHATSAPP_CONVERTER_CONCURRENCY")]
    pub(crate) concurrency: Option<usize>,

    /// Settings file (defaults to the per-user config directory)
    #[arg(long, env = "WHATSAPP_CONVERTER_CONFIG")]
    pub(crate) config: Option<PathBuf>,

    /// Path to the ffmpeg binary
    #[arg(long, env = "FFMPEG_PATH")]
    pub(crate) ffmpeg: Option<String>,

    /// Path to the ffprobe binary
    #[arg(long, env = "FFPROBE_PATH")]
    pub(crate) ffprobe: Option<String>,

    /// Print events as JSON lines
    #[arg(long, default_value_t = false)]
    pub(crate) json: bool,

    /// Report which ffmpeg/ffprobe binaries would be used
    #[arg(long, default_value_t = false)]
    pub(crate) check_tools: bool,

    /// Persist the effective settings (including command-line overrides)
    #[arg(long, default_value_t = false)]
    pub(crate) save_settings: bool,
}

impl Cli {
    pub(crate) fn apply_overrides(
        &self,
        mut settings: ConverterSettings,
    ) -> Result<ConverterSettings, String> {
        if let Some(ratio) = self.ratio {
            settings.target_ratio = ratio;
        }
        if let Some(mode) = self.mode {
            settings.crop_mode = mode;
        }
        if let Some(concurrency) = self.concurrency {
            settings.concurrency = concurrency;
        }
        if let Some(ffmpeg) = self.ffmpeg.as_ref() {
            settings.ffmpeg_custom_path = Some(ffmpeg.clone());
        }
        if let Some(ffprobe) = self.ffprobe.as_ref() {
            settings.ffprobe_custom_path = Some(ffprobe.clone());
        }
        normalize_settings(settings)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|value| value.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

fn describe_tool(tool: &ToolStatus) -> String {
    match (&tool.path, &tool.version) {
        (Some(path), Some(version)) => format!("{}: {path} [{}] {version}", tool.name, tool.source),
        (Some(path), None) => format!("{}: {path} [{}] (no version)", tool.name, tool.source),
        _ => format!(
            "{}: {}",
            tool.name,
            tool.message.as_deref().unwrap_or("not found")
        ),
    }
}

pub(crate) fn render_tools_status(status: &RuntimeToolsStatus) -> String {
    [describe_tool(&status.ffmpeg), describe_tool(&status.ffprobe)].join("\n")
}

/// Renders events for the terminal. Text mode prints status changes and every
/// tenth of a pass so the log stays readable.
pub(crate) struct EventPrinter {
    json: bool,
    last_seen: HashMap<JobId, (JobStatus, u32)>,
}

impl EventPrinter {
    pub(crate) fn new(json: bool) -> Self {
        Self {
            json,
            last_seen: HashMap::new(),
        }
    }

    pub(crate) fn render(&mut self, event: &BatchEvent) -> Option<String> {
        if self.json {
            return serde_json::to_string(event).ok();
        }
        match event {
            BatchEvent::Job(job) => self.render_job(job),
            BatchEvent::Complete(summary) => Some(format!(
                "Finished: {} converted, {} failed, {} cancelled",
                summary.succeeded, summary.failed, summary.cancelled
            )),
        }
    }

    fn render_job(&mut self, job: &JobEvent) -> Option<String> {
        let decile = (job.pass_progress * 10.0).floor() as u32;
        let key = (job.status, decile);
        if self.last_seen.insert(job.job_id, key) == Some(key) {
            return None;
        }

        let name = display_name(&job.source);
        let overall = job.batch_progress * 100.0;
        let line = match job.status {
            JobStatus::Pass1Running | JobStatus::Pass2Running => format!(
                "[{overall:5.1}%] {name}: {} {:.0}%",
                job.status.label(),
                job.pass_progress * 100.0
            ),
            JobStatus::Failed => format!(
                "[{overall:5.1}%] {name}: {} - {}",
                job.status.label(),
                job.error
                    .as_ref()
                    .map(|error| error.to_string())
                    .unwrap_or_default()
            ),
            _ => format!("[{overall:5.1}%] {name}: {}", job.status.label()),
        };
        Some(line)
    }
}
