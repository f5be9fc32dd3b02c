// Public settings and tool status entry points used by the front end.
use super::*;

/// Returns the explicit settings path, or the per-user default location.
pub fn resolve_settings_path(explicit: Option<&Path>) -> Result<PathBuf, String> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => default_settings_path(),
    }
}

pub fn get_converter_settings(path: &Path) -> Result<ConverterSettings, String> {
    load_settings(path)
}

pub fn save_converter_settings(
    path: &Path,
    settings: ConverterSettings,
) -> Result<ConverterSettings, String> {
    save_settings_internal(path, settings)
}

pub fn get_runtime_tools_status(settings: &ConverterSettings) -> RuntimeToolsStatus {
    build_runtime_status(settings.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_settings_path_wins_over_default() {
        let explicit = PathBuf::from("/tmp/custom-settings.json");
        assert_eq!(
            resolve_settings_path(Some(&explicit)).unwrap(),
            explicit
        );
    }

    #[test]
    fn saved_settings_are_returned_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let saved = save_converter_settings(
            &path,
            ConverterSettings {
                concurrency: 99,
                ..ConverterSettings::default()
            },
        )
        .unwrap();
        assert_eq!(saved.concurrency, MAX_CONCURRENCY);
        assert_eq!(get_converter_settings(&path).unwrap().concurrency, MAX_CONCURRENCY);
    }

    #[test]
    fn status_reports_missing_custom_binaries_as_unresolved_custom_path() {
        let settings = ConverterSettings {
            ffmpeg_custom_path: Some("/definitely/not/here/ffmpeg".to_string()),
            ..ConverterSettings::default()
        };
        let status = get_runtime_tools_status(&settings);
        assert_ne!(status.ffmpeg.source, "custom");
    }
}
