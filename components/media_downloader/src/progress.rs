// components/media_downloader/src/progress.rs
//! Parsers for the progress output of the external tools.
//!
//! yt-dlp is run with `--newline --progress-template download:%(progress._percent_str)s`
//! so each update arrives on its own line; its default `[download]  12.3% of ...`
//! format is accepted too. ffmpeg is run with `-progress pipe:1`, which prints
//! `key=value` lines.

use std::time::Duration;

/// Template passed to yt-dlp's `--progress-template`
pub const YTDLP_PROGRESS_TEMPLATE: &str = "download:%(progress._percent_str)s";

/// Parse one line of yt-dlp output into a percentage
pub fn parse_ytdlp_progress(line: &str) -> Option<f64> {
    let line = line.trim();
    let pct_str = if let Some(rest) = line.strip_prefix("download:") {
        rest.trim()
    } else if let Some(rest) = line.strip_prefix("[download]") {
        rest.split_whitespace().next()?
    } else {
        return None;
    };

    let value: f64 = pct_str.strip_suffix('%')?.trim().parse().ok()?;
    value.is_finite().then(|| value.clamp(0.0, 100.0))
}

/// A `key=value` update from `ffmpeg -progress`
#[derive(Debug, Clone, PartialEq)]
pub enum FfmpegProgress {
    /// Position of the encoder in the output
    Position(Duration),
    /// Encoding has finished
    End,
}

pub fn parse_ffmpeg_progress(line: &str) -> Option<FfmpegProgress> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        // Despite the name, out_time_ms is in microseconds as well
        "out_time_us" | "out_time_ms" => {
            let micros: i64 = value.trim().parse().ok()?;
            (micros >= 0).then(|| FfmpegProgress::Position(Duration::from_micros(micros as u64)))
        }
        "progress" if value.trim() == "end" => Some(FfmpegProgress::End),
        _ => None,
    }
}

/// Convert an encoder position into a percentage of the total duration
pub fn position_percent(position: Duration, total: Duration) -> Option<f64> {
    if total.is_zero() {
        return None;
    }
    let pct = position.as_secs_f64() / total.as_secs_f64() * 100.0;
    Some(pct.clamp(0.0, 100.0))
}
