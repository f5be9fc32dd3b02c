// Job and batch error taxonomy.
use super::*;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobErrorKind {
    Probe,
    Encode,
    Filesystem,
    Internal,
    Cancelled,
}

/// Terminal failure of a single job. `Cancelled` is not counted as a failure.
#[derive(Debug, Clone, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum JobError {
    #[error("probe failed: {0}")]
    Probe(String),
    #[error("pass {pass} failed: {message}")]
    Encode { pass: u8, message: String },
    #[error("filesystem error: {0}")]
    Filesystem(String),
    /// A defect inside the converter itself, such as a panicking worker.
    #[error("internal error: {0}")]
    Internal(String),
    #[error("cancelled")]
    Cancelled,
}

impl JobError {
    pub fn kind(&self) -> JobErrorKind {
        match self {
            Self::Probe(_) => JobErrorKind::Probe,
            Self::Encode { .. } => JobErrorKind::Encode,
            Self::Filesystem(_) => JobErrorKind::Filesystem,
            Self::Internal(_) => JobErrorKind::Internal,
            Self::Cancelled => JobErrorKind::Cancelled,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("source is already part of the batch: {0}")]
    DuplicateSource(PathBuf),
    #[error("output path is already claimed by another job: {0}")]
    DuplicateOutput(PathBuf),
    #[error("output path equals the source path: {0}")]
    OutputEqualsSource(PathBuf),
    #[error("source is not a readable video file: {0}")]
    InvalidSource(PathBuf),
    #[error("unknown job id {0}")]
    UnknownJob(String),
    #[error("batch already started")]
    AlreadyStarted,
    #[error("batch already finished")]
    Finished,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_errors_carry_pass_and_tail() {
        let error = JobError::Encode {
            pass: 1,
            message: "Invalid argument | Conversion failed!".to_string(),
        };
        assert_eq!(error.kind(), JobErrorKind::Encode);
        assert_eq!(
            error.to_string(),
            "pass 1 failed: Invalid argument | Conversion failed!"
        );
        let payload = serde_json::to_value(&error).unwrap();
        assert_eq!(payload["kind"], "encode");
        assert_eq!(payload["detail"]["pass"], 1);
    }

    #[test]
    fn cancellation_is_distinguishable() {
        assert!(JobError::Cancelled.is_cancelled());
        assert!(!JobError::Probe("x".to_string()).is_cancelled());
    }
}
