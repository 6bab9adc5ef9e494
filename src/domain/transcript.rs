use serde::{Deserialize, Serialize};

/// One timed span of recognized speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: usize,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Canonical transcript persisted as `output/transcript.json`.
///
/// Segments are ordered by `start`; every other serialization is derived
/// from this structure alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub language: String,
    pub duration: f64,
    pub segments: Vec<Segment>,
    pub text: String,
}

impl Transcript {
    /// Build a transcript from raw segments: sorts by start time, renumbers
    /// ids, trims texts, and joins the full text.
    pub fn from_segments(
        language: impl Into<String>,
        duration: f64,
        mut segments: Vec<Segment>,
    ) -> Self {
        segments.sort_by(|a, b| a.start.total_cmp(&b.start));
        for (i, segment) in segments.iter_mut().enumerate() {
            segment.id = i;
            segment.text = segment.text.trim().to_string();
        }
        let text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            language: language.into(),
            duration,
            segments,
            text,
        }
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}
