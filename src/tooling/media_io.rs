// Source probing, dropped-input normalization and diagnostic stream helpers.
use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMetadata {
    pub width: u32,
    pub height: u32,
    pub rotation: u32,
    pub duration_seconds: f64,
}

impl SourceMetadata {
    fn is_quarter_turned(&self) -> bool {
        self.rotation == 90 || self.rotation == 270
    }

    /// Width of the frame as the player shows it, after applying rotation.
    pub fn display_width(&self) -> u32 {
        if self.is_quarter_turned() {
            self.height
        } else {
            self.width
        }
    }

    pub fn display_height(&self) -> u32 {
        if self.is_quarter_turned() {
            self.width
        } else {
            self.height
        }
    }
}

#[derive(Debug, Deserialize)]
struct FfprobePayload {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
    tags: Option<FfprobeTags>,
    #[serde(default)]
    side_data_list: Vec<FfprobeSideData>,
}

#[derive(Debug, Deserialize)]
struct FfprobeTags {
    rotate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeSideData {
    rotation: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

fn normalize_rotation(degrees: f64) -> u32 {
    let whole = degrees.round() as i64;
    (whole.rem_euclid(360)) as u32
}

fn parse_positive_seconds(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite() && *value > 0.0)
}

pub(crate) fn parse_ffprobe_payload(raw: &str) -> Result<SourceMetadata, String> {
    let payload: FfprobePayload = serde_json::from_str(raw)
        .map_err(|error| format!("Failed to parse FFprobe output: {error}"))?;

    let stream = payload
        .streams
        .iter()
        .find(|stream| stream.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| "No video stream found.".to_string())?;

    let width = stream.width.unwrap_or(0);
    let height = stream.height.unwrap_or(0);
    if width == 0 || height == 0 {
        return Err("Video stream has no usable dimensions.".to_string());
    }

    let rotation = stream
        .tags
        .as_ref()
        .and_then(|tags| tags.rotate.as_deref())
        .and_then(|value| value.trim().parse::<f64>().ok())
        .or_else(|| {
            stream
                .side_data_list
                .iter()
                .find_map(|side_data| side_data.rotation)
        })
        .map(normalize_rotation)
        .unwrap_or(0);

    let duration_seconds = parse_positive_seconds(
        payload
            .format
            .as_ref()
            .and_then(|format| format.duration.as_deref()),
    )
    .or_else(|| parse_positive_seconds(stream.duration.as_deref()))
    .ok_or_else(|| "FFprobe did not report a usable duration.".to_string())?;

    Ok(SourceMetadata {
        width,
        height,
        rotation,
        duration_seconds,
    })
}

pub(crate) fn probe_video_metadata(
    ffprobe_binary: &Path,
    media_path: &Path,
) -> Result<SourceMetadata, String> {
    let output = hidden_command(ffprobe_binary)
        .arg("-v")
        .arg("quiet")
        .arg("-print_format")
        .arg("json")
        .arg("-show_streams")
        .arg("-show_format")
        .arg(media_path)
        .stdin(Stdio::null())
        .output()
        .map_err(|error| format!("Failed to start FFprobe: {error}"))?;
    if !output.status.success() {
        return Err(format!(
            "FFprobe could not read {}.",
            media_path.to_string_lossy()
        ));
    }
    parse_ffprobe_payload(&String::from_utf8_lossy(&output.stdout))
}

/// Reads one diagnostic line, treating both `\r` and `\n` as terminators so
/// in-place progress updates arrive as separate lines.
pub(crate) fn read_lossy_diagnostic_line<R: BufRead>(
    reader: &mut R,
    raw_buffer: &mut Vec<u8>,
) -> Result<Option<String>, std::io::Error> {
    raw_buffer.clear();
    loop {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            if raw_buffer.is_empty() {
                return Ok(None);
            }
            break;
        }
        if let Some(index) = available
            .iter()
            .position(|byte| *byte == b'\n' || *byte == b'\r')
        {
            raw_buffer.extend_from_slice(&available[..index]);
            reader.consume(index + 1);
            break;
        }
        let consumed = available.len();
        raw_buffer.extend_from_slice(available);
        reader.consume(consumed);
    }
    Ok(Some(String::from_utf8_lossy(raw_buffer).to_string()))
}

pub(crate) fn is_allowed_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_lowercase())
        .map(|value| ALLOWED_VIDEO_EXTENSIONS.contains(&value.as_str()))
        .unwrap_or(false)
}

pub(crate) fn normalize_dropped_input(raw: &str) -> Result<PathBuf, String> {
    let trimmed = raw.trim().trim_matches('"');
    if trimmed.is_empty() {
        return Err("Empty input.".to_string());
    }

    if trimmed.starts_with("file://") {
        let url = Url::parse(trimmed).map_err(|error| format!("Invalid file URL: {error}"))?;
        return url
            .to_file_path()
            .map_err(|_| "File URL does not point to a local path.".to_string());
    }

    let normalized = trimmed.strip_prefix("\\\\?\\").unwrap_or(trimmed);
    Ok(PathBuf::from(normalized))
}
