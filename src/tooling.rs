use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use url::Url;
use which::which;

use crate::conversion::{CropMode, EncodeProfile, TargetRatio};

mod commands;
mod media_io;
mod runtime;

pub(crate) use media_io::*;
pub(crate) use runtime::*;

pub use commands::*;
pub use media_io::SourceMetadata;
pub use runtime::{ConverterSettings, RuntimeToolsStatus, ToolStatus};
