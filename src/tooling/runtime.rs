// Converter settings, external tool resolution and common process primitives.
use super::*;

#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;

pub(crate) const SETTINGS_DIR_NAME: &str = "whatsapp-converter";
pub(crate) const SETTINGS_FILE_NAME: &str = "settings.json";
pub(crate) const ALLOWED_VIDEO_EXTENSIONS: [&str; 10] = [
    "mp4", "mov", "mkv", "webm", "m4v", "avi", "wmv", "mpeg", "mpg", "3gp",
];
pub(crate) const MAX_CONCURRENCY: usize = 16;
#[cfg(target_os = "windows")]
pub(crate) const CREATE_NO_WINDOW: u32 = 0x0800_0000;

pub(crate) fn hidden_command(program: impl AsRef<OsStr>) -> Command {
    let mut command = Command::new(program);
    #[cfg(target_os = "windows")]
    {
        command.creation_flags(CREATE_NO_WINDOW);
    }
    command
}

pub(crate) fn null_device() -> &'static str {
    if cfg!(target_os = "windows") {
        "NUL"
    } else {
        "/dev/null"
    }
}

fn default_long_edge() -> u32 {
    1280
}

fn default_cancel_grace_ms() -> u64 {
    3000
}

fn default_diagnostic_tail_lines() -> usize {
    6
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConverterSettings {
    pub ffmpeg_custom_path: Option<String>,
    pub ffprobe_custom_path: Option<String>,
    pub concurrency: usize,
    pub target_ratio: TargetRatio,
    pub crop_mode: CropMode,
    pub long_edge: u32,
    pub encode: EncodeProfile,
    pub cancel_grace_ms: u64,
    pub diagnostic_tail_lines: usize,
}

impl Default for ConverterSettings {
    fn default() -> Self {
        Self {
            ffmpeg_custom_path: None,
            ffprobe_custom_path: None,
            concurrency: 1,
            target_ratio: TargetRatio::MatchOrientation,
            crop_mode: CropMode::Pad,
            long_edge: default_long_edge(),
            encode: EncodeProfile::default(),
            cancel_grace_ms: default_cancel_grace_ms(),
            diagnostic_tail_lines: default_diagnostic_tail_lines(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolStatus {
    pub name: String,
    pub available: bool,
    pub source: String,
    pub path: Option<String>,
    pub version: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeToolsStatus {
    pub settings: ConverterSettings,
    pub ffmpeg: ToolStatus,
    pub ffprobe: ToolStatus,
}

impl RuntimeToolsStatus {
    pub fn ready(&self) -> bool {
        self.ffmpeg.available && self.ffprobe.available
    }
}

pub(crate) fn default_settings_path() -> Result<PathBuf, String> {
    let config_dir =
        dirs::config_dir().ok_or_else(|| "Failed to resolve user config dir.".to_string())?;
    Ok(config_dir.join(SETTINGS_DIR_NAME).join(SETTINGS_FILE_NAME))
}

pub(crate) fn sanitize_optional_path(value: Option<String>) -> Result<Option<String>, String> {
    match value {
        None => Ok(None),
        Some(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            if trimmed.len() > 512 {
                return Err("Path is too long.".to_string());
            }
            if trimmed.chars().any(|ch| ch.is_control()) {
                return Err("Path contains invalid control characters.".to_string());
            }
            Ok(Some(trimmed.to_string()))
        }
    }
}

pub(crate) fn normalize_settings(
    mut settings: ConverterSettings,
) -> Result<ConverterSettings, String> {
    settings.ffmpeg_custom_path = sanitize_optional_path(settings.ffmpeg_custom_path)?;
    settings.ffprobe_custom_path = sanitize_optional_path(settings.ffprobe_custom_path)?;
    settings.concurrency = settings.concurrency.clamp(1, MAX_CONCURRENCY);
    if !(240..=4320).contains(&settings.long_edge) {
        settings.long_edge = default_long_edge();
    }
    settings.cancel_grace_ms = settings.cancel_grace_ms.clamp(100, 60_000);
    settings.diagnostic_tail_lines = settings.diagnostic_tail_lines.clamp(1, 64);
    settings.encode = settings.encode.normalized();
    Ok(settings)
}

pub(crate) fn load_settings(path: &Path) -> Result<ConverterSettings, String> {
    if !path.exists() {
        return Ok(ConverterSettings::default());
    }

    let raw =
        fs::read_to_string(path).map_err(|error| format!("Failed to read settings: {error}"))?;
    let parsed: ConverterSettings =
        serde_json::from_str(&raw).map_err(|error| format!("Failed to parse settings: {error}"))?;
    normalize_settings(parsed)
}

pub(crate) fn save_settings_internal(
    path: &Path,
    settings: ConverterSettings,
) -> Result<ConverterSettings, String> {
    let normalized = normalize_settings(settings)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|error| format!("Failed to create config dir: {error}"))?;
    }
    let payload = serde_json::to_string_pretty(&normalized)
        .map_err(|error| format!("Failed to serialize settings: {error}"))?;
    fs::write(path, payload).map_err(|error| format!("Failed to save settings: {error}"))?;
    Ok(normalized)
}

pub(crate) fn canonicalize_existing_path(path: &Path) -> Result<PathBuf, String> {
    fs::canonicalize(path).map_err(|error| format!("Failed to resolve path: {error}"))
}

pub(crate) fn run_version(binary: &Path, arg: &str) -> Option<String> {
    let output = hidden_command(binary).arg(arg).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .find(|line| !line.trim().is_empty())
        .map(|line| line.trim().to_string())
}

pub(crate) fn platform_bin(name: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}

pub(crate) fn sibling_binary_candidates(name: &str) -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    let executable = platform_bin(name);

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(parent) = exe_path.parent() {
            candidates.push(parent.join(&executable));
            candidates.push(parent.join("bin").join(&executable));
        }
    }

    candidates
}

pub(crate) fn ensure_custom_binary(path: &str) -> Option<PathBuf> {
    let parsed = PathBuf::from(path);
    if !parsed.exists() {
        return None;
    }
    let canonical = canonicalize_existing_path(&parsed).ok()?;
    if canonical.is_file() {
        Some(canonical)
    } else {
        None
    }
}

fn resolve_tool_binary(name: &str, custom_path: Option<&String>) -> Option<(PathBuf, String)> {
    if let Some(custom) = custom_path.and_then(|value| ensure_custom_binary(value)) {
        return Some((custom, "custom".to_string()));
    }

    if let Ok(system) = which(name) {
        return Some((system, "system".to_string()));
    }

    sibling_binary_candidates(name)
        .into_iter()
        .find(|candidate| candidate.is_file())
        .map(|path| (path, "bundled".to_string()))
}

pub(crate) fn resolve_ffmpeg_binary(settings: &ConverterSettings) -> Option<(PathBuf, String)> {
    resolve_tool_binary("ffmpeg", settings.ffmpeg_custom_path.as_ref())
}

pub(crate) fn resolve_ffprobe_binary(settings: &ConverterSettings) -> Option<(PathBuf, String)> {
    resolve_tool_binary("ffprobe", settings.ffprobe_custom_path.as_ref())
}

pub(crate) fn inspect_tool(name: &str, resolved: Option<(PathBuf, String)>) -> ToolStatus {
    match resolved {
        Some((path, source)) => {
            let version = run_version(&path, "-version");
            let available = version.is_some();
            ToolStatus {
                name: name.to_string(),
                available,
                source,
                path: Some(path.to_string_lossy().to_string()),
                message: if available {
                    None
                } else {
                    Some(format!("{name} was found but did not report a version."))
                },
                version,
            }
        }
        None => ToolStatus {
            name: name.to_string(),
            available: false,
            source: "missing".to_string(),
            path: None,
            version: None,
            message: Some(format!(
                "{name} was not found. Install FFmpeg or configure the path in settings."
            )),
        },
    }
}

pub(crate) fn build_runtime_status(settings: ConverterSettings) -> RuntimeToolsStatus {
    let ffmpeg = inspect_tool("ffmpeg", resolve_ffmpeg_binary(&settings));
    let ffprobe = inspect_tool("ffprobe", resolve_ffprobe_binary(&settings));
    RuntimeToolsStatus {
        settings,
        ffmpeg,
        ffprobe,
    }
}
