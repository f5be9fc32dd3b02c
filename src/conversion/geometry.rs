// Crop, scale and pad planning for a target aspect ratio.
use super::*;

pub(crate) const DEFAULT_LONG_EDGE: u32 = 1280;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
pub enum TargetRatio {
    #[serde(rename = "16:9")]
    #[value(name = "16:9")]
    Landscape16x9,
    #[serde(rename = "9:16")]
    #[value(name = "9:16")]
    Portrait9x16,
    #[serde(rename = "1:1")]
    #[value(name = "1:1")]
    Square,
    #[serde(rename = "19.5:9")]
    #[value(name = "19.5:9")]
    Phone19_5x9,
    #[serde(rename = "match-orientation")]
    #[value(name = "match-orientation", alias = "keep")]
    MatchOrientation,
}

impl TargetRatio {
    pub fn label(self) -> &'static str {
        match self {
            Self::Landscape16x9 => "16:9",
            Self::Portrait9x16 => "9:16",
            Self::Square => "1:1",
            Self::Phone19_5x9 => "19.5:9",
            Self::MatchOrientation => "match-orientation",
        }
    }

    /// Reduced `(width, height)` terms of the ratio for a source of the given shape.
    pub fn terms(self, source_width: u32, source_height: u32) -> (u32, u32) {
        match self {
            Self::Landscape16x9 => (16, 9),
            Self::Portrait9x16 => (9, 16),
            Self::Square => (1, 1),
            Self::Phone19_5x9 => (13, 6),
            Self::MatchOrientation => {
                if source_width >= source_height {
                    (16, 9)
                } else {
                    (9, 16)
                }
            }
        }
    }
}

impl std::fmt::Display for TargetRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
pub enum CropMode {
    #[serde(rename = "pad")]
    #[value(name = "pad")]
    Pad,
    #[serde(rename = "crop-to-fit", alias = "crop")]
    #[value(name = "crop", alias = "crop-to-fit")]
    CropToFit,
}

impl CropMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Pad => "pad",
            Self::CropToFit => "crop-to-fit",
        }
    }
}

impl std::fmt::Display for CropMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeometryPlan {
    pub source_width: u32,
    pub source_height: u32,
    pub target_width: u32,
    pub target_height: u32,
    pub crop: CropRect,
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub pad_x: u32,
    pub pad_y: u32,
    pub needs_padding: bool,
}

impl GeometryPlan {
    pub fn crops(&self) -> bool {
        self.crop.x != 0
            || self.crop.y != 0
            || self.crop.width != self.source_width
            || self.crop.height != self.source_height
    }

    /// The `-vf` expression for this plan. Always ends with `setsar=1`.
    pub fn filter_chain(&self) -> String {
        let mut filters: Vec<String> = Vec::with_capacity(4);
        if self.crops() {
            filters.push(format!(
                "crop={}:{}:{}:{}",
                self.crop.width, self.crop.height, self.crop.x, self.crop.y
            ));
        }
        filters.push(format!("scale={}:{}", self.scaled_width, self.scaled_height));
        if self.needs_padding {
            filters.push(format!(
                "pad={}:{}:{}:{}:black",
                self.target_width, self.target_height, self.pad_x, self.pad_y
            ));
        }
        filters.push("setsar=1".to_string());
        filters.join(",")
    }
}

fn even_floor(value: u64) -> u32 {
    let even = (value & !1).min(u64::from(u32::MAX - 1));
    (even as u32).max(2)
}

fn centered_offset(outer: u32, inner: u32) -> u32 {
    (outer.saturating_sub(inner) / 2) & !1
}

fn target_frame(num: u32, den: u32, long_edge: u32) -> Result<(u32, u32), JobError> {
    let mut multiplier = long_edge / num.max(den);
    if num % 2 == 1 || den % 2 == 1 {
        multiplier &= !1;
    }
    if multiplier == 0 {
        return Err(JobError::Probe(format!(
            "Long edge {long_edge} is too small for a {num}:{den} frame."
        )));
    }
    Ok((num * multiplier, den * multiplier))
}

pub fn plan(
    source_width: u32,
    source_height: u32,
    ratio: TargetRatio,
    mode: CropMode,
) -> Result<GeometryPlan, JobError> {
    plan_with_long_edge(source_width, source_height, ratio, mode, DEFAULT_LONG_EDGE)
}

pub fn plan_with_long_edge(
    source_width: u32,
    source_height: u32,
    ratio: TargetRatio,
    mode: CropMode,
    long_edge: u32,
) -> Result<GeometryPlan, JobError> {
    if source_width == 0 || source_height == 0 {
        return Err(JobError::Probe(format!(
            "Invalid source dimensions {source_width}x{source_height}."
        )));
    }
    // Even crops need at least two pixels on each axis.
    if source_width < 2 || source_height < 2 {
        return Err(JobError::Probe(format!(
            "Source {source_width}x{source_height} is too small to convert."
        )));
    }

    let (num, den) = ratio.terms(source_width, source_height);
    let (target_width, target_height) = target_frame(num, den, long_edge)?;
    let w = u64::from(source_width);
    let h = u64::from(source_height);
    let source_is_wider = w * u64::from(den) >= h * u64::from(num);

    let full_frame = CropRect {
        x: 0,
        y: 0,
        width: source_width,
        height: source_height,
    };

    let geometry = match mode {
        CropMode::Pad => {
            let (scaled_width, scaled_height) = if source_is_wider {
                let scaled = even_floor(h * u64::from(target_width) / w).min(target_height);
                (target_width, scaled)
            } else {
                let scaled = even_floor(w * u64::from(target_height) / h).min(target_width);
                (scaled, target_height)
            };
            GeometryPlan {
                source_width,
                source_height,
                target_width,
                target_height,
                crop: full_frame,
                scaled_width,
                scaled_height,
                pad_x: centered_offset(target_width, scaled_width),
                pad_y: centered_offset(target_height, scaled_height),
                needs_padding: scaled_width != target_width || scaled_height != target_height,
            }
        }
        CropMode::CropToFit => {
            let crop = if source_is_wider {
                let width = even_floor(h * u64::from(num) / u64::from(den)).min(even_floor(w));
                let height = even_floor(h).min(source_height);
                CropRect {
                    x: centered_offset(source_width, width),
                    y: centered_offset(source_height, height),
                    width,
                    height,
                }
            } else {
                let width = even_floor(w).min(source_width);
                let height = even_floor(w * u64::from(den) / u64::from(num)).min(even_floor(h));
                CropRect {
                    x: centered_offset(source_width, width),
                    y: centered_offset(source_height, height),
                    width,
                    height,
                }
            };
            GeometryPlan {
                source_width,
                source_height,
                target_width,
                target_height,
                crop,
                scaled_width: target_width,
                scaled_height: target_height,
                pad_x: 0,
                pad_y: 0,
                needs_padding: false,
            }
        }
    };

    Ok(geometry)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCES: [(u32, u32); 10] = [
        (1920, 1080),
        (1080, 1920),
        (1280, 720),
        (640, 480),
        (3840, 2160),
        (1000, 1000),
        (2560, 1080),
        (480, 854),
        (1366, 768),
        (720, 1280),
    ];

    const RATIOS: [TargetRatio; 5] = [
        TargetRatio::Landscape16x9,
        TargetRatio::Portrait9x16,
        TargetRatio::Square,
        TargetRatio::Phone19_5x9,
        TargetRatio::MatchOrientation,
    ];

    #[test]
    fn target_frames_are_even_with_exact_ratio() {
        for (width, height) in SOURCES {
            for ratio in RATIOS {
                for mode in [CropMode::Pad, CropMode::CropToFit] {
                    let geometry = plan(width, height, ratio, mode).unwrap();
                    let (num, den) = ratio.terms(width, height);
                    assert_eq!(geometry.target_width % 2, 0);
                    assert_eq!(geometry.target_height % 2, 0);
                    assert_eq!(geometry.scaled_width % 2, 0);
                    assert_eq!(geometry.scaled_height % 2, 0);
                    assert_eq!(geometry.pad_x % 2, 0);
                    assert_eq!(geometry.pad_y % 2, 0);
                    assert_eq!(
                        u64::from(geometry.target_width) * u64::from(den),
                        u64::from(geometry.target_height) * u64::from(num),
                        "{width}x{height} {ratio} {mode}"
                    );
                    assert!(geometry.target_width.max(geometry.target_height) <= DEFAULT_LONG_EDGE);
                    assert!(geometry.filter_chain().ends_with("setsar=1"));
                }
            }
        }
    }

    #[test]
    fn pad_never_crops_and_keeps_uniform_scale() {
        for (width, height) in SOURCES {
            for ratio in RATIOS {
                let geometry = plan(width, height, ratio, CropMode::Pad).unwrap();
                assert!(!geometry.crops(), "{width}x{height} {ratio}");
                assert!(!geometry.filter_chain().contains("crop="));
                assert!(geometry.scaled_width <= geometry.target_width);
                assert!(geometry.scaled_height <= geometry.target_height);
                assert!(geometry.pad_x + geometry.scaled_width <= geometry.target_width);
                assert!(geometry.pad_y + geometry.scaled_height <= geometry.target_height);

                let skew = (i64::from(geometry.scaled_width) * i64::from(height)
                    - i64::from(geometry.scaled_height) * i64::from(width))
                .unsigned_abs();
                assert!(skew <= 3 * u64::from(width.max(height)), "{width}x{height} {ratio}");
            }
        }
    }

    #[test]
    fn crop_to_fit_never_pads() {
        for (width, height) in SOURCES {
            for ratio in RATIOS {
                let geometry = plan(width, height, ratio, CropMode::CropToFit).unwrap();
                let (num, den) = ratio.terms(width, height);
                assert!(!geometry.needs_padding);
                assert!(!geometry.filter_chain().contains("pad="));
                assert_eq!(geometry.scaled_width, geometry.target_width);
                assert_eq!(geometry.scaled_height, geometry.target_height);
                assert!(geometry.crop.x + geometry.crop.width <= width);
                assert!(geometry.crop.y + geometry.crop.height <= height);

                let skew = (i64::from(geometry.crop.width) * i64::from(den)
                    - i64::from(geometry.crop.height) * i64::from(num))
                .unsigned_abs();
                assert!(skew <= 3 * u64::from(num + den), "{width}x{height} {ratio}");
            }
        }
    }

    #[test]
    fn landscape_to_portrait_crop_trims_width() {
        let geometry = plan(1920, 1080, TargetRatio::Portrait9x16, CropMode::CropToFit).unwrap();
        assert_eq!(
            geometry.crop,
            CropRect {
                x: 656,
                y: 0,
                width: 606,
                height: 1080,
            }
        );
        assert_eq!((geometry.target_width, geometry.target_height), (720, 1280));
        assert_eq!(
            geometry.filter_chain(),
            "crop=606:1080:656:0,scale=720:1280,setsar=1"
        );
    }

    #[test]
    fn landscape_to_portrait_pad_letterboxes() {
        let geometry = plan(1920, 1080, TargetRatio::Portrait9x16, CropMode::Pad).unwrap();
        assert_eq!((geometry.scaled_width, geometry.scaled_height), (720, 404));
        assert_eq!((geometry.pad_x, geometry.pad_y), (0, 438));
        assert_eq!(
            geometry.filter_chain(),
            "scale=720:404,pad=720:1280:0:438:black,setsar=1"
        );
    }

    #[test]
    fn matching_ratio_is_a_pure_scale() {
        for mode in [CropMode::Pad, CropMode::CropToFit] {
            let geometry = plan(1920, 1080, TargetRatio::Landscape16x9, mode).unwrap();
            assert!(!geometry.crops());
            assert!(!geometry.needs_padding);
            assert_eq!(geometry.filter_chain(), "scale=1280:720,setsar=1");
        }
    }

    #[test]
    fn phone_ratio_uses_largest_even_frame() {
        let geometry = plan(1080, 2340, TargetRatio::Phone19_5x9, CropMode::Pad).unwrap();
        assert_eq!((geometry.target_width, geometry.target_height), (1274, 588));
    }

    #[test]
    fn match_orientation_follows_source_shape() {
        let portrait = plan(1080, 1920, TargetRatio::MatchOrientation, CropMode::Pad).unwrap();
        assert_eq!((portrait.target_width, portrait.target_height), (720, 1280));
        let square = plan(1000, 1000, TargetRatio::MatchOrientation, CropMode::Pad).unwrap();
        assert_eq!((square.target_width, square.target_height), (1280, 720));
    }

    #[test]
    fn zero_dimensions_are_probe_errors() {
        let error = plan(0, 1080, TargetRatio::Square, CropMode::Pad).unwrap_err();
        assert_eq!(error.kind(), JobErrorKind::Probe);
    }

    #[test]
    fn sub_two_pixel_sources_are_rejected_and_tiny_crops_fit() {
        for (width, height) in [(1, 1), (1, 1080), (1920, 1)] {
            let error = plan(width, height, TargetRatio::Landscape16x9, CropMode::CropToFit)
                .unwrap_err();
            assert_eq!(error.kind(), JobErrorKind::Probe);
        }

        for (width, height) in [(2, 2), (3, 3), (2, 1000), (1000, 2)] {
            for ratio in RATIOS {
                let geometry = plan(width, height, ratio, CropMode::CropToFit).unwrap();
                let crop = geometry.crop;
                assert!(crop.x + crop.width <= width, "{width}x{height} {ratio:?}");
                assert!(crop.y + crop.height <= height, "{width}x{height} {ratio:?}");
                assert_eq!(crop.width % 2, 0);
                assert_eq!(crop.height % 2, 0);
            }
        }
    }

    #[test]
    fn ratio_labels_parse_from_settings_json() {
        let ratio: TargetRatio = serde_json::from_str("\"19.5:9\"").unwrap();
        assert_eq!(ratio, TargetRatio::Phone19_5x9);
        let mode: CropMode = serde_json::from_str("\"crop\"").unwrap();
        assert_eq!(mode, CropMode::CropToFit);
    }
}
