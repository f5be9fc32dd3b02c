// Scoped ownership of a job's temp output and analysis log files.
use super::*;

const PASSLOG_SUFFIXES: [&str; 4] = ["-0.log", "-0.log.mbtree", "-0.log.temp", "-0.log.mbtree.temp"];

pub(crate) fn passlog_files(prefix: &Path) -> Vec<PathBuf> {
    let base = prefix.as_os_str().to_string_lossy().to_string();
    PASSLOG_SUFFIXES
        .iter()
        .map(|suffix| PathBuf::from(format!("{base}{suffix}")))
        .collect()
}

fn remove_if_present(path: &Path) -> Result<(), String> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(format!(
            "Failed to remove {}: {error}",
            path.to_string_lossy()
        )),
    }
}

/// Deletes the temp output and every analysis log file when dropped.
#[derive(Debug)]
pub(crate) struct JobArtifacts {
    temp_output: PathBuf,
    passlog_prefix: PathBuf,
}

impl JobArtifacts {
    /// Claims the artifact paths for `spec`, clearing anything a crashed run left behind.
    pub(crate) fn prepare(spec: &JobSpec) -> Result<Self, JobError> {
        let artifacts = Self {
            temp_output: spec.temp_output_path(),
            passlog_prefix: spec.passlog_prefix(),
        };
        for path in artifacts.paths() {
            if path.exists() {
                debug!("removing stale artifact {}", path.to_string_lossy());
            }
            remove_if_present(&path).map_err(JobError::Filesystem)?;
        }
        Ok(artifacts)
    }

    pub(crate) fn temp_output(&self) -> &Path {
        &self.temp_output
    }

    fn paths(&self) -> Vec<PathBuf> {
        let mut paths = passlog_files(&self.passlog_prefix);
        paths.push(self.temp_output.clone());
        paths
    }

    /// Moves the finished temp output onto `destination`, replacing any previous file.
    pub(crate) fn promote(&self, destination: &Path) -> Result<(), JobError> {
        if !self.temp_output.is_file() {
            return Err(JobError::Filesystem(format!(
                "Encoder did not produce {}",
                self.temp_output.to_string_lossy()
            )));
        }
        fs::rename(&self.temp_output, destination).map_err(|error| {
            JobError::Filesystem(format!(
                "Failed to move output into place at {}: {error}",
                destination.to_string_lossy()
            ))
        })
    }

    fn cleanup(&self) {
        for path in self.paths() {
            if let Err(message) = remove_if_present(&path) {
                warn!("{message}");
            }
        }
    }
}

impl Drop for JobArtifacts {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_in(dir: &Path) -> JobSpec {
        JobSpec::new(dir.join("clip.mov"), TargetRatio::Square, CropMode::Pad).unwrap()
    }

    #[test]
    fn stale_artifacts_are_cleared_on_prepare() {
        let dir = tempfile::tempdir().unwrap();
        let spec = spec_in(dir.path());
        let stale_log = passlog_files(&spec.passlog_prefix())[0].clone();
        fs::write(&stale_log, b"stale").unwrap();
        fs::write(spec.temp_output_path(), b"half").unwrap();

        let artifacts = JobArtifacts::prepare(&spec).unwrap();
        assert!(!stale_log.exists());
        assert!(!artifacts.temp_output().exists());
    }

    #[test]
    fn dropping_the_guard_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let spec = spec_in(dir.path());
        let artifacts = JobArtifacts::prepare(&spec).unwrap();
        for path in passlog_files(&spec.passlog_prefix()) {
            fs::write(path, b"log").unwrap();
        }
        fs::write(artifacts.temp_output(), b"partial").unwrap();

        drop(artifacts);
        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().flatten().collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[test]
    fn promote_replaces_an_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let spec = spec_in(dir.path());
        fs::write(spec.output(), b"old").unwrap();
        let artifacts = JobArtifacts::prepare(&spec).unwrap();
        fs::write(artifacts.temp_output(), b"new").unwrap();

        artifacts.promote(spec.output()).unwrap();
        drop(artifacts);
        assert_eq!(fs::read(spec.output()).unwrap(), b"new");
        assert!(!spec.temp_output_path().exists());
    }

    #[test]
    fn promote_without_output_is_a_filesystem_error() {
        let dir = tempfile::tempdir().unwrap();
        let spec = spec_in(dir.path());
        let artifacts = JobArtifacts::prepare(&spec).unwrap();
        let error = artifacts.promote(spec.output()).unwrap_err();
        assert_eq!(error.kind(), JobErrorKind::Filesystem);
    }
}
