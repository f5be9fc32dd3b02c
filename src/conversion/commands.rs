// Public entry points that turn dropped inputs and settings into a running batch.
use super::*;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedInput {
    pub input: String,
    pub reason: String,
}

/// Builds job specs from dropped paths or `file://` URLs. Inputs that are not
/// video files, repeat an earlier input, or would share an output path with an
/// earlier input are returned as skipped, so the remaining specs always
/// enqueue together.
pub fn collect_job_specs(
    inputs: &[String],
    target_ratio: TargetRatio,
    crop_mode: CropMode,
) -> (Vec<JobSpec>, Vec<SkippedInput>) {
    let mut specs: Vec<JobSpec> = Vec::new();
    let mut skipped: Vec<SkippedInput> = Vec::new();
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut claimed_outputs: HashSet<PathBuf> = HashSet::new();
    let mut skip = |input: &str, reason: String| {
        skipped.push(SkippedInput {
            input: input.to_string(),
            reason,
        })
    };

    for raw in inputs {
        let path = match normalize_dropped_input(raw) {
            Ok(path) => path,
            Err(reason) => {
                skip(raw, reason);
                continue;
            }
        };
        if !path.is_file() {
            skip(raw, "Not a file.".to_string());
            continue;
        }
        if !is_allowed_video_file(&path) {
            skip(raw, "Unsupported video format.".to_string());
            continue;
        }
        let path = fs::canonicalize(&path).unwrap_or(path);
        if !seen.insert(path.clone()) {
            skip(raw, "Already added.".to_string());
            continue;
        }
        let spec = match JobSpec::new(path, target_ratio, crop_mode) {
            Ok(spec) => spec,
            Err(error) => {
                skip(raw, error.to_string());
                continue;
            }
        };
        if claimed_outputs.contains(spec.output()) {
            skip(raw, "Output name already used by an earlier input.".to_string());
            continue;
        }
        if claimed_outputs.contains(spec.source()) || seen.contains(spec.output()) {
            skip(raw, "Output would overwrite an earlier input.".to_string());
            continue;
        }
        claimed_outputs.insert(spec.output().to_path_buf());
        specs.push(spec);
    }

    (specs, skipped)
}

/// Resolves FFmpeg and FFprobe from `settings` and wires them into a scheduler.
pub fn create_scheduler(settings: &ConverterSettings) -> Result<BatchScheduler, String> {
    let (ffmpeg_binary, ffmpeg_source) = resolve_ffmpeg_binary(settings).ok_or_else(|| {
        "FFmpeg was not found. Install it or configure the path in settings.".to_string()
    })?;
    let (ffprobe_binary, ffprobe_source) = resolve_ffprobe_binary(settings).ok_or_else(|| {
        "FFprobe was not found. Install it or configure the path in settings.".to_string()
    })?;
    info!(
        "using ffmpeg at {} ({ffmpeg_source}), ffprobe at {} ({ffprobe_source})",
        ffmpeg_binary.to_string_lossy(),
        ffprobe_binary.to_string_lossy()
    );

    let runner = FfmpegPassRunner::new(ffmpeg_binary)
        .with_grace(Duration::from_millis(settings.cancel_grace_ms))
        .with_tail_lines(settings.diagnostic_tail_lines);
    Ok(BatchScheduler::new(
        Arc::new(FfprobeProbe::new(ffprobe_binary)),
        Arc::new(runner),
        BatchConfig::from_settings(settings),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::test_support::{file_name, FakePassRunner, FakeProbe};

    #[test]
    fn dropped_inputs_are_filtered_like_the_drop_target() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("beach.mov");
        let notes = dir.path().join("notes.txt");
        fs::write(&video, b"video").unwrap();
        fs::write(&notes, b"text").unwrap();
        for name in ["clip.mov", "clip.mkv", "other.mp4", "beach_whatsapp.mp4"] {
            fs::write(dir.path().join(name), b"video").unwrap();
        }
        let in_dir = |name: &str| dir.path().join(name).to_string_lossy().to_string();

        let inputs = vec![
            video.to_string_lossy().to_string(),
            notes.to_string_lossy().to_string(),
            in_dir("missing.mp4"),
            video.to_string_lossy().to_string(),
            dir.path().to_string_lossy().to_string(),
            in_dir("clip.mov"),
            in_dir("clip.mkv"),
            in_dir("other.mp4"),
            in_dir("beach_whatsapp.mp4"),
        ];
        let (specs, skipped) =
            collect_job_specs(&inputs, TargetRatio::Square, CropMode::CropToFit);

        let outputs: Vec<String> = specs
            .iter()
            .map(|spec| file_name(spec.output()))
            .collect();
        assert_eq!(
            outputs,
            vec![
                "beach_whatsapp.mp4".to_string(),
                "clip_whatsapp.mp4".to_string(),
                "other_whatsapp.mp4".to_string()
            ]
        );
        assert_eq!(specs[0].crop_mode(), CropMode::CropToFit);
        let reasons: Vec<&str> = skipped.iter().map(|entry| entry.reason.as_str()).collect();
        assert_eq!(
            reasons,
            vec![
                "Unsupported video format.",
                "Not a file.",
                "Already added.",
                "Not a file.",
                "Output name already used by an earlier input.",
                "Output would overwrite an earlier input."
            ]
        );
        assert_eq!(skipped[4].input, in_dir("clip.mkv"));

        let scheduler = BatchScheduler::new(
            Arc::new(FakeProbe::default()),
            Arc::new(FakePassRunner::default()),
            BatchConfig::default(),
        );
        assert_eq!(scheduler.enqueue(specs).unwrap().len(), 3);
    }

    #[cfg(unix)]
    #[test]
    fn file_urls_resolve_to_the_same_job() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("two words.mp4");
        fs::write(&video, b"video").unwrap();
        let url = url::Url::from_file_path(&video).unwrap().to_string();

        let (specs, skipped) = collect_job_specs(
            &[url, video.to_string_lossy().to_string()],
            TargetRatio::MatchOrientation,
            CropMode::Pad,
        );
        assert_eq!(specs.len(), 1);
        assert_eq!(skipped.len(), 1);
    }

    #[test]
    fn missing_tools_prevent_scheduler_creation() {
        let settings = ConverterSettings {
            ffmpeg_custom_path: Some("/definitely/not/here/ffmpeg".to_string()),
            ..ConverterSettings::default()
        };
        // Falls back to PATH; only assert the error wording when nothing resolves.
        if resolve_ffmpeg_binary(&settings).is_none() {
            let error = create_scheduler(&settings).err().unwrap();
            assert!(error.contains("FFmpeg was not found"));
        }
    }
}
