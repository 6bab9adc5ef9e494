use kikitori::application::services::{
    render_markdown, render_srt, render_txt, render_vtt, OutputFormatter,
};
use kikitori::domain::{OutputFormat, Segment, Transcript};

fn sample_transcript() -> Transcript {
    Transcript::from_segments(
        "ja",
        7754.2,
        vec![
            Segment {
                id: 0,
                start: 0.0,
                end: 4.32,
                text: "こんにちは、世界".to_string(),
            },
            Segment {
                id: 1,
                start: 4.32,
                end: 9.877,
                text: "これはテストです".to_string(),
            },
            Segment {
                id: 2,
                start: 3661.5,
                end: 3670.0,
                text: "一時間後のセグメント".to_string(),
            },
        ],
    )
}

#[test]
fn given_transcript_when_rendering_txt_then_one_line_per_segment_with_trailing_newline() {
    let txt = render_txt(&sample_transcript());
    assert_eq!(txt, "こんにちは、世界\nこれはテストです\n一時間後のセグメント\n");
}

#[test]
fn given_transcript_when_rendering_srt_then_cues_are_numbered_from_one() {
    let srt = render_srt(&sample_transcript());
    let mut lines = srt.lines();
    assert_eq!(lines.next(), Some("1"));
    assert_eq!(lines.next(), Some("00:00:00,000 --> 00:00:04,320"));
    assert_eq!(lines.next(), Some("こんにちは、世界"));
    assert_eq!(lines.next(), Some(""));
    assert_eq!(lines.next(), Some("2"));
}

#[test]
fn given_fractional_timestamps_when_rendering_then_truncated_not_rounded() {
    let transcript = Transcript::from_segments(
        "ja",
        2.0,
        vec![Segment {
            id: 0,
            start: 0.9999,
            end: 1.9996,
            text: "a".to_string(),
        }],
    );
    let srt = render_srt(&transcript);
    // 0.9999s truncates to 999 ms, 1.9996s to 999 ms; rounding would give
    // 1.000 and 2.000.
    assert!(srt.contains("00:00:00,999 --> 00:00:01,999"), "got: {}", srt);

    let vtt = render_vtt(&transcript);
    assert!(vtt.contains("00:00:00.999 --> 00:00:01.999"), "got: {}", vtt);
}

#[test]
fn given_transcript_when_rendering_vtt_then_header_and_dot_timecodes() {
    let vtt = render_vtt(&sample_transcript());
    assert!(vtt.starts_with("WEBVTT\n\n"));
    assert!(vtt.contains("00:00:00.000 --> 00:00:04.320"));
    // Cues past one hour keep rolling the hour field.
    assert!(vtt.contains("01:01:01.500 --> 01:01:10.000"));
    assert!(!vtt.contains(','), "vtt must not use srt comma timecodes");
}

#[test]
fn given_transcript_when_rendering_markdown_then_metadata_and_text_present() {
    let md = render_markdown(&sample_transcript());
    assert!(md.starts_with("# Transcript\n"));
    assert!(md.contains("**Language**: ja"));
    assert!(md.contains("**Duration**: 02:09:14"));
    assert!(md.contains("**Segments**: 3"));
    assert!(md.contains("こんにちは、世界"));
    assert!(md.contains("**[01:01:01]**"));
}

#[test]
fn given_same_transcript_when_rendering_twice_then_output_is_byte_identical() {
    let transcript = sample_transcript();
    assert_eq!(render_txt(&transcript), render_txt(&transcript));
    assert_eq!(render_srt(&transcript), render_srt(&transcript));
    assert_eq!(render_vtt(&transcript), render_vtt(&transcript));
    assert_eq!(render_markdown(&transcript), render_markdown(&transcript));

    // Round-trip through the persisted form changes nothing.
    let json = serde_json::to_string(&transcript).unwrap();
    let reparsed: Transcript = serde_json::from_str(&json).unwrap();
    assert_eq!(render_srt(&transcript), render_srt(&reparsed));
    assert_eq!(render_vtt(&transcript), render_vtt(&reparsed));
}

#[tokio::test]
async fn given_output_dir_when_writing_all_then_every_artifact_exists() {
    let dir = tempfile::TempDir::new().unwrap();
    let transcript = sample_transcript();

    let formats = OutputFormatter::write_all(&transcript, dir.path())
        .await
        .expect("write_all should succeed");

    assert_eq!(formats.len(), 5);
    for format in [
        OutputFormat::Txt,
        OutputFormat::Srt,
        OutputFormat::Vtt,
        OutputFormat::Md,
    ] {
        let path = dir.path().join(format.file_name());
        let body = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(!body.is_empty(), "{} is empty", format);
    }
}

#[test]
fn given_empty_transcript_when_rendering_then_minimal_but_valid_output() {
    let transcript = Transcript::from_segments("ja", 0.0, Vec::new());
    assert_eq!(render_txt(&transcript), "");
    assert_eq!(render_srt(&transcript), "");
    assert_eq!(render_vtt(&transcript), "WEBVTT\n\n");
    assert!(render_markdown(&transcript).contains("**Segments**: 0"));
}
