use std::fmt::Write as _;
use std::path::Path;

use crate::domain::{OutputFormat, Transcript};

/// Seconds to `HH:MM:SS,mmm`, truncated (not rounded) to milliseconds.
fn timestamp_srt(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0) as u64;
    format!(
        "{:02}:{:02}:{:02},{:03}",
        total_ms / 3_600_000,
        (total_ms / 60_000) % 60,
        (total_ms / 1000) % 60,
        total_ms % 1000
    )
}

/// Seconds to `HH:MM:SS.mmm`, truncated to milliseconds.
fn timestamp_vtt(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0) as u64;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        total_ms / 3_600_000,
        (total_ms / 60_000) % 60,
        (total_ms / 1000) % 60,
        total_ms % 1000
    )
}

/// Seconds to `HH:MM:SS`, for human-facing metadata.
fn timestamp_simple(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{:02}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}

/// Segment texts separated by single newlines, with a trailing newline.
pub fn render_txt(transcript: &Transcript) -> String {
    let mut out = String::new();
    for segment in &transcript.segments {
        out.push_str(&segment.text);
        out.push('\n');
    }
    out
}

/// SubRip: numbered cues, comma-millisecond timecodes, blank-line separated.
pub fn render_srt(transcript: &Transcript) -> String {
    let mut out = String::new();
    for (i, segment) in transcript.segments.iter().enumerate() {
        let _ = writeln!(out, "{}", i + 1);
        let _ = writeln!(
            out,
            "{} --> {}",
            timestamp_srt(segment.start),
            timestamp_srt(segment.end)
        );
        out.push_str(&segment.text);
        out.push_str("\n\n");
    }
    out
}

/// WebVTT: mandatory header, then numbered cues with dot-millisecond
/// timecodes.
pub fn render_vtt(transcript: &Transcript) -> String {
    let mut out = String::from("WEBVTT\n\n");
    for (i, segment) in transcript.segments.iter().enumerate() {
        let _ = writeln!(out, "{}", i + 1);
        let _ = writeln!(
            out,
            "{} --> {}",
            timestamp_vtt(segment.start),
            timestamp_vtt(segment.end)
        );
        out.push_str(&segment.text);
        out.push_str("\n\n");
    }
    out
}

/// Markdown report: title, metadata block, full text, timestamped segments.
///
/// Derived from the transcript alone so re-rendering is byte-stable.
pub fn render_markdown(transcript: &Transcript) -> String {
    let mut out = String::from("# Transcript\n\n");
    let _ = writeln!(out, "**Language**: {}", transcript.language);
    let _ = writeln!(out, "**Duration**: {}", timestamp_simple(transcript.duration));
    let _ = writeln!(out, "**Segments**: {}", transcript.segment_count());
    out.push_str("\n---\n\n## Full Text\n\n");
    out.push_str(&transcript.text);
    out.push_str("\n\n---\n\n## Segments\n\n");
    for segment in &transcript.segments {
        let _ = writeln!(
            out,
            "**[{}]** {}\n",
            timestamp_simple(segment.start),
            segment.text
        );
    }
    out
}

#[derive(Debug, thiserror::Error)]
pub enum FormatterError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Writes the derived artifacts next to `transcript.json`.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Render txt/srt/vtt/md into `output_dir` and return the full set of
    /// formats now available on disk (json is the transcript itself).
    pub async fn write_all(
        transcript: &Transcript,
        output_dir: &Path,
    ) -> Result<Vec<OutputFormat>, FormatterError> {
        let renders = [
            (OutputFormat::Txt, render_txt(transcript)),
            (OutputFormat::Srt, render_srt(transcript)),
            (OutputFormat::Vtt, render_vtt(transcript)),
            (OutputFormat::Md, render_markdown(transcript)),
        ];
        for (format, body) in renders {
            tokio::fs::write(output_dir.join(format.file_name()), body).await?;
        }
        Ok(OutputFormat::ALL.to_vec())
    }
}
