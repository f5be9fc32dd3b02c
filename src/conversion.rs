use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

use crate::tooling::{
    hidden_command, is_allowed_video_file, normalize_dropped_input, null_device,
    probe_video_metadata, read_lossy_diagnostic_line, resolve_ffmpeg_binary,
    resolve_ffprobe_binary, ConverterSettings, SourceMetadata,
};

mod artifacts;
mod commands;
mod encode_args;
mod errors;
mod geometry;
mod job_runner;
mod job_spec;
mod pass_driver;
mod probe;
mod progress;
mod scheduler;

#[cfg(test)]
mod test_support;

use artifacts::*;
use encode_args::*;
use job_runner::*;
use progress::*;

pub use commands::*;
pub use encode_args::EncodeProfile;
pub use errors::{BatchError, JobError, JobErrorKind};
pub use geometry::{plan, plan_with_long_edge, CropMode, CropRect, GeometryPlan, TargetRatio};
pub use job_spec::JobSpec;
pub use pass_driver::{CancelToken, FfmpegPassRunner, PassInvocation, PassResult, PassRunner};
pub use probe::{FfprobeProbe, MetadataProbe};
pub use progress::{parse_progress_time, progress_fraction};
pub use scheduler::{
    BatchConfig, BatchEvent, BatchScheduler, BatchSummary, JobEvent, JobId, JobSnapshot,
    JobStatus,
};
