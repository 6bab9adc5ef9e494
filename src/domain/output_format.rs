use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The closed set of artifact serializations a completed job offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Txt,
    Srt,
    Vtt,
    Md,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 5] = [
        OutputFormat::Json,
        OutputFormat::Txt,
        OutputFormat::Srt,
        OutputFormat::Vtt,
        OutputFormat::Md,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Txt => "txt",
            OutputFormat::Srt => "srt",
            OutputFormat::Vtt => "vtt",
            OutputFormat::Md => "md",
        }
    }

    /// File name of the artifact inside the job's `output/` directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            OutputFormat::Json => "transcript.json",
            OutputFormat::Txt => "result.txt",
            OutputFormat::Srt => "result.srt",
            OutputFormat::Vtt => "result.vtt",
            OutputFormat::Md => "result.md",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Json => "application/json",
            OutputFormat::Txt => "text/plain; charset=utf-8",
            OutputFormat::Srt => "text/plain; charset=utf-8",
            OutputFormat::Vtt => "text/vtt; charset=utf-8",
            OutputFormat::Md => "text/markdown; charset=utf-8",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(OutputFormat::Json),
            "txt" => Ok(OutputFormat::Txt),
            "srt" => Ok(OutputFormat::Srt),
            "vtt" => Ok(OutputFormat::Vtt),
            "md" => Ok(OutputFormat::Md),
            _ => Err(format!("invalid output format: {}", s)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
