// Encoder diagnostic line parsing.
use super::*;

pub(crate) const FATAL_DIAGNOSTIC_MARKERS: [&str; 2] = ["Conversion failed!", "Error while opening encoder"];

/// Extracts the `time=HH:MM:SS.ms` field of an encoder status line, in seconds.
pub fn parse_progress_time(line: &str) -> Option<f64> {
    let start = line.find("time=")? + "time=".len();
    let token = line[start..].split_whitespace().next()?;
    let mut parts = token.split(':');
    let hours = parts.next()?.parse::<f64>().ok()?;
    let minutes = parts.next()?.parse::<f64>().ok()?;
    let seconds = parts.next()?.parse::<f64>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    let total = hours * 3600.0 + minutes * 60.0 + seconds;
    if total.is_finite() && total >= 0.0 {
        Some(total)
    } else {
        None
    }
}

pub fn progress_fraction(line: &str, total_duration: f64) -> Option<f64> {
    if !total_duration.is_finite() || total_duration <= 0.0 {
        return None;
    }
    parse_progress_time(line).map(|elapsed| (elapsed / total_duration).clamp(0.0, 1.0))
}

pub(crate) fn is_fatal_diagnostic(line: &str) -> bool {
    FATAL_DIAGNOSTIC_MARKERS
        .iter()
        .any(|marker| line.contains(marker))
}

/// Joins the last `limit` non-empty lines the way the error surface shows them.
pub(crate) fn format_diagnostic_tail(lines: &VecDeque<String>, limit: usize) -> Option<String> {
    let skip = lines.len().saturating_sub(limit);
    let tail: Vec<&str> = lines.iter().skip(skip).map(String::as_str).collect();
    if tail.is_empty() {
        None
    } else {
        Some(tail.join(" | "))
    }
}
