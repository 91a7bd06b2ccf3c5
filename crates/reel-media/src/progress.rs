//! FFmpeg progress parsing.

use serde::{Deserialize, Serialize};

/// Progress information from FFmpeg's `-progress` output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FfmpegProgress {
    pub frame: u64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (1.5 = 1.5x realtime)
    pub speed: f64,
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Progress percentage given the expected output duration.
    pub fn percentage(&self, total_duration_ms: i64) -> f64 {
        if total_duration_ms <= 0 {
            return 0.0;
        }
        ((self.out_time_ms as f64 / total_duration_ms as f64) * 100.0).clamp(0.0, 100.0)
    }
}

/// What a single stderr line turned out to be.
#[derive(Debug, PartialEq)]
pub(crate) enum ProgressLine {
    /// A `key=value` progress field; `Some` when a progress block completed.
    Field(Option<FfmpegProgress>),
    /// Anything else (warnings, errors).
    Other,
}

/// Fold one `-progress pipe:2` line into `current`.
pub(crate) fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> ProgressLine {
    let Some((key, value)) = line.trim().split_once('=') else {
        return ProgressLine::Other;
    };

    match key {
        // out_time_ms is also in microseconds despite its name
        "out_time_us" | "out_time_ms" => {
            if let Ok(us) = value.parse::<i64>() {
                current.out_time_ms = us / 1000;
            }
        }
        "frame" => {
            if let Ok(frame) = value.parse() {
                current.frame = frame;
            }
        }
        "speed" => {
            if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                current.speed = speed;
            }
        }
        "progress" => {
            current.is_complete = value == "end";
            return ProgressLine::Field(Some(current.clone()));
        }
        k if k.contains(char::is_whitespace) => return ProgressLine::Other,
        _ => {}
    }
    ProgressLine::Field(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_parsing() {
        let mut progress = FfmpegProgress::default();

        assert_eq!(
            parse_progress_line("out_time_us=5000000", &mut progress),
            ProgressLine::Field(None)
        );
        assert_eq!(progress.out_time_ms, 5000);

        parse_progress_line("speed=1.5x", &mut progress);
        assert!((progress.speed - 1.5).abs() < 0.01);

        parse_progress_line("speed=N/A", &mut progress);
        assert!((progress.speed - 1.5).abs() < 0.01);

        match parse_progress_line("progress=end", &mut progress) {
            ProgressLine::Field(Some(p)) => assert!(p.is_complete),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_non_progress_lines() {
        let mut progress = FfmpegProgress::default();
        assert_eq!(
            parse_progress_line("Error opening input file clip.mp4", &mut progress),
            ProgressLine::Other
        );
        assert_eq!(
            parse_progress_line("[libx264 @ 0x1] crf=23 requested", &mut progress),
            ProgressLine::Other
        );
    }

    #[test]
    fn test_percentage() {
        let progress = FfmpegProgress {
            out_time_ms: 5000,
            ..Default::default()
        };
        assert!((progress.percentage(10000) - 50.0).abs() < 0.01);
        assert_eq!(progress.percentage(0), 0.0);
    }
}
