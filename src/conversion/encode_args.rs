// Two-pass encoder argument construction.
use super::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EncodeProfile {
    pub video_codec: String,
    pub preset: String,
    pub tune: Option<String>,
    pub profile: String,
    pub level: String,
    pub video_bitrate_kbps: u32,
    pub max_bitrate_kbps: u32,
    pub buffer_size_kbps: u32,
    pub pixel_format: String,
    pub frame_rate: Option<u32>,
    pub audio_codec: String,
    pub audio_bitrate: String,
}

impl Default for EncodeProfile {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "veryslow".to_string(),
            tune: Some("film".to_string()),
            profile: "high".to_string(),
            level: "3.0".to_string(),
            video_bitrate_kbps: 3100,
            max_bitrate_kbps: 3200,
            buffer_size_kbps: 6400,
            pixel_format: "yuv420p".to_string(),
            frame_rate: Some(60),
            audio_codec: "aac".to_string(),
            audio_bitrate: "128k".to_string(),
        }
    }
}

fn non_empty_or(value: String, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

impl EncodeProfile {
    pub(crate) fn normalized(self) -> Self {
        let defaults = Self::default();
        let video_bitrate_kbps = self.video_bitrate_kbps.clamp(200, 50_000);
        let max_bitrate_kbps = self.max_bitrate_kbps.max(video_bitrate_kbps);
        let buffer_size_kbps = self.buffer_size_kbps.max(max_bitrate_kbps);
        Self {
            video_codec: non_empty_or(self.video_codec, &defaults.video_codec),
            preset: non_empty_or(self.preset, &defaults.preset),
            tune: self
                .tune
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            profile: non_empty_or(self.profile, &defaults.profile),
            level: non_empty_or(self.level, &defaults.level),
            video_bitrate_kbps,
            max_bitrate_kbps,
            buffer_size_kbps,
            pixel_format: non_empty_or(self.pixel_format, &defaults.pixel_format),
            frame_rate: self.frame_rate.filter(|value| (1..=240).contains(value)),
            audio_codec: non_empty_or(self.audio_codec, &defaults.audio_codec),
            audio_bitrate: non_empty_or(self.audio_bitrate, &defaults.audio_bitrate),
        }
    }
}

pub(crate) fn build_pass_args(
    pass: u8,
    source: &Path,
    filter_chain: &str,
    passlog_prefix: &Path,
    pass_output: &Path,
    profile: &EncodeProfile,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".to_string(),
        "-y".to_string(),
        "-i".to_string(),
        source.to_string_lossy().to_string(),
        "-vf".to_string(),
        filter_chain.to_string(),
        "-c:v".to_string(),
        profile.video_codec.clone(),
        "-preset".to_string(),
        profile.preset.clone(),
    ];
    if let Some(tune) = profile.tune.as_ref() {
        args.push("-tune".to_string());
        args.push(tune.clone());
    }
    args.extend([
        "-profile:v".to_string(),
        profile.profile.clone(),
        "-level".to_string(),
        profile.level.clone(),
        "-b:v".to_string(),
        format!("{}k", profile.video_bitrate_kbps),
        "-maxrate".to_string(),
        format!("{}k", profile.max_bitrate_kbps),
        "-bufsize".to_string(),
        format!("{}k", profile.buffer_size_kbps),
        "-pix_fmt".to_string(),
        profile.pixel_format.clone(),
    ]);
    if let Some(frame_rate) = profile.frame_rate {
        args.push("-r".to_string());
        args.push(frame_rate.to_string());
    }

    if pass == 1 {
        args.push("-an".to_string());
    } else {
        args.extend([
            "-c:a".to_string(),
            profile.audio_codec.clone(),
            "-b:a".to_string(),
            profile.audio_bitrate.clone(),
            "-movflags".to_string(),
            "+faststart".to_string(),
        ]);
    }

    args.extend([
        "-pass".to_string(),
        pass.to_string(),
        "-passlogfile".to_string(),
        passlog_prefix.to_string_lossy().to_string(),
        "-f".to_string(),
        "mp4".to_string(),
        pass_output.to_string_lossy().to_string(),
    ]);
    args
}

/// Pass 1 discards its picture to the null device and only writes the analysis log.
pub(crate) fn build_analysis_args(
    spec: &JobSpec,
    geometry: &GeometryPlan,
    profile: &EncodeProfile,
) -> Vec<String> {
    build_pass_args(
        1,
        spec.source(),
        &geometry.filter_chain(),
        &spec.passlog_prefix(),
        Path::new(null_device()),
        profile,
    )
}

pub(crate) fn build_encode_args(
    spec: &JobSpec,
    geometry: &GeometryPlan,
    profile: &EncodeProfile,
) -> Vec<String> {
    build_pass_args(
        2,
        spec.source(),
        &geometry.filter_chain(),
        &spec.passlog_prefix(),
        &spec.temp_output_path(),
        profile,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|arg| arg == flag)
            .and_then(|index| args.get(index + 1))
            .map(String::as_str)
    }

    fn sample() -> (JobSpec, GeometryPlan) {
        let spec = JobSpec::new("/videos/trip.mov", TargetRatio::Portrait9x16, CropMode::Pad)
            .unwrap();
        let geometry = plan(1920, 1080, TargetRatio::Portrait9x16, CropMode::Pad).unwrap();
        (spec, geometry)
    }

    #[test]
    fn analysis_pass_drops_audio_and_discards_picture() {
        let (spec, geometry) = sample();
        let args = build_analysis_args(&spec, &geometry, &EncodeProfile::default());
        assert!(args.contains(&"-an".to_string()));
        assert!(!args.contains(&"-c:a".to_string()));
        assert_eq!(value_after(&args, "-pass"), Some("1"));
        assert_eq!(
            value_after(&args, "-passlogfile"),
            Some("/videos/.trip_whatsapp.passlog")
        );
        assert_eq!(args.last().map(String::as_str), Some(null_device()));
        assert_eq!(value_after(&args, "-vf"), Some(geometry.filter_chain().as_str()));
    }

    #[test]
    fn encode_pass_writes_the_temp_output_with_rate_caps() {
        let (spec, geometry) = sample();
        let args = build_encode_args(&spec, &geometry, &EncodeProfile::default());
        assert_eq!(value_after(&args, "-pass"), Some("2"));
        assert_eq!(value_after(&args, "-b:v"), Some("3100k"));
        assert_eq!(value_after(&args, "-maxrate"), Some("3200k"));
        assert_eq!(value_after(&args, "-bufsize"), Some("6400k"));
        assert_eq!(value_after(&args, "-c:a"), Some("aac"));
        assert_eq!(value_after(&args, "-tune"), Some("film"));
        assert_eq!(value_after(&args, "-r"), Some("60"));
        assert_eq!(
            args.last().map(String::as_str),
            Some("/videos/.trip_whatsapp.partial.mp4")
        );
    }

    #[test]
    fn normalized_profile_keeps_rate_ordering() {
        let profile = EncodeProfile {
            video_bitrate_kbps: 4000,
            max_bitrate_kbps: 1000,
            buffer_size_kbps: 10,
            preset: "  ".to_string(),
            tune: Some(String::new()),
            frame_rate: Some(0),
            ..EncodeProfile::default()
        }
        .normalized();
        assert_eq!(profile.max_bitrate_kbps, 4000);
        assert_eq!(profile.buffer_size_kbps, 4000);
        assert_eq!(profile.preset, "veryslow");
        assert_eq!(profile.tune, None);
        assert_eq!(profile.frame_rate, None);
    }
}
