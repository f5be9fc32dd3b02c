// Fakes and fixtures shared by the conversion tests.
use super::*;

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|value| value.to_string_lossy().to_string())
        .unwrap_or_default()
}

pub(crate) fn leftover_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .flatten()
        .map(|entry| file_name(&entry.path()))
        .collect();
    names.sort();
    names
}

#[cfg(unix)]
pub(crate) fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut permissions = fs::metadata(&path).unwrap().permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(&path, permissions).unwrap();
    path
}

#[derive(Default)]
pub(crate) struct FakeProbe {
    pub(crate) failing: HashSet<String>,
    pub(crate) durations: HashMap<String, f64>,
}

impl MetadataProbe for FakeProbe {
    fn probe(&self, source: &Path) -> Result<SourceMetadata, JobError> {
        let name = file_name(source);
        if self.failing.contains(&name) {
            return Err(JobError::Probe(format!("{name} is unreadable")));
        }
        Ok(SourceMetadata {
            width: 1920,
            height: 1080,
            rotation: 0,
            duration_seconds: self.durations.get(&name).copied().unwrap_or(10.0),
        })
    }
}

/// Stand-in encoder that writes the same files a real two-pass run would.
#[derive(Default)]
pub(crate) struct FakePassRunner {
    pub(crate) fail_pass: HashMap<String, u8>,
    pub(crate) block: HashSet<String>,
    pub(crate) skip_output: HashSet<String>,
    pub(crate) panic_on: HashSet<String>,
    pub(crate) started: Option<Sender<String>>,
    pub(crate) watched_output: Option<PathBuf>,
    pub(crate) watched_contents: Mutex<Vec<Option<Vec<u8>>>>,
    pub(crate) calls: Mutex<Vec<(String, u8)>>,
}

fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|index| args.get(index + 1))
        .map(String::as_str)
}

impl PassRunner for FakePassRunner {
    fn run_pass(
        &self,
        invocation: &PassInvocation,
        cancel: &CancelToken,
        on_progress: &mut dyn FnMut(f64),
    ) -> Result<PassResult, JobError> {
        let args = &invocation.args;
        let name = value_after(args, "-i")
            .map(|source| file_name(Path::new(source)))
            .unwrap_or_default();
        self.calls.lock().push((name.clone(), invocation.pass));

        if invocation.pass == 1 {
            if let Some(prefix) = value_after(args, "-passlogfile") {
                fs::write(format!("{prefix}-0.log"), b"stats").unwrap();
                fs::write(format!("{prefix}-0.log.mbtree"), b"tree").unwrap();
            }
        }

        if self.panic_on.contains(&name) {
            panic!("encoder crashed on {name}");
        }

        if self.block.contains(&name) {
            if let Some(started) = self.started.as_ref() {
                let _ = started.send(name.clone());
            }
            on_progress(0.1);
            while !cancel.is_cancelled() {
                thread::sleep(Duration::from_millis(5));
            }
            return Ok(PassResult {
                exit_code: None,
                duration_processed: invocation.total_duration * 0.1,
                last_error: None,
                cancelled: true,
            });
        }

        if self.fail_pass.get(&name) == Some(&invocation.pass) {
            return Ok(PassResult {
                exit_code: Some(1),
                duration_processed: 0.0,
                last_error: Some("FFmpeg: Invalid data found | Conversion failed!".to_string()),
                cancelled: false,
            });
        }

        for fraction in [0.25, 0.5, 1.0] {
            on_progress(fraction);
        }

        if invocation.pass == 2 {
            if let Some(watched) = self.watched_output.as_ref() {
                self.watched_contents.lock().push(fs::read(watched).ok());
            }
            if !self.skip_output.contains(&name) {
                if let Some(output) = args.last() {
                    fs::write(output, b"encoded").unwrap();
                }
            }
        }

        Ok(PassResult {
            exit_code: Some(0),
            duration_processed: invocation.total_duration,
            last_error: None,
            cancelled: false,
        })
    }
}
