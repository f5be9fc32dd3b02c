// Source metadata probing seam.
use super::*;

pub trait MetadataProbe: Send + Sync {
    fn probe(&self, source: &Path) -> Result<SourceMetadata, JobError>;
}

#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    ffprobe_binary: PathBuf,
}

impl FfprobeProbe {
    pub fn new(ffprobe_binary: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe_binary: ffprobe_binary.into(),
        }
    }
}

impl MetadataProbe for FfprobeProbe {
    fn probe(&self, source: &Path) -> Result<SourceMetadata, JobError> {
        if !source.is_file() {
            return Err(JobError::Probe(format!(
                "Source file was not found: {}",
                source.to_string_lossy()
            )));
        }
        probe_video_metadata(&self.ffprobe_binary, source).map_err(JobError::Probe)
    }
}
