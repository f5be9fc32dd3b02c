// Immutable per-file conversion request and its derived paths.
use super::*;

pub(crate) const OUTPUT_SUFFIX: &str = "_whatsapp";
pub(crate) const OUTPUT_EXTENSION: &str = "mp4";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    source: PathBuf,
    output: PathBuf,
    target_ratio: TargetRatio,
    crop_mode: CropMode,
}

impl JobSpec {
    pub fn new(
        source: impl Into<PathBuf>,
        target_ratio: TargetRatio,
        crop_mode: CropMode,
    ) -> Result<Self, BatchError> {
        let source = source.into();
        let stem = source
            .file_stem()
            .and_then(|value| value.to_str())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| BatchError::InvalidSource(source.clone()))?;
        let parent = source
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let output = parent.join(format!("{stem}{OUTPUT_SUFFIX}.{OUTPUT_EXTENSION}"));
        if output == source {
            return Err(BatchError::OutputEqualsSource(source));
        }
        Ok(Self {
            source,
            output,
            target_ratio,
            crop_mode,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn target_ratio(&self) -> TargetRatio {
        self.target_ratio
    }

    pub fn crop_mode(&self) -> CropMode {
        self.crop_mode
    }

    fn output_stem(&self) -> String {
        self.output
            .file_stem()
            .map(|value| value.to_string_lossy().to_string())
            .unwrap_or_else(|| "video_whatsapp".to_string())
    }

    /// Hidden sibling of the output that pass 2 writes before the final rename.
    pub fn temp_output_path(&self) -> PathBuf {
        self.output.with_file_name(format!(
            ".{}.partial.{OUTPUT_EXTENSION}",
            self.output_stem()
        ))
    }

    /// Prefix handed to `-passlogfile`; the encoder appends `-0.log` and friends.
    pub fn passlog_prefix(&self) -> PathBuf {
        self.output
            .with_file_name(format!(".{}.passlog", self.output_stem()))
    }
}
