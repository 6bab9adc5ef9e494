use kikitori::domain::{JobId, JobStatus, OutputFormat, Segment, Transcript};

#[test]
fn given_generated_job_id_then_it_matches_the_documented_shape() {
    for _ in 0..50 {
        let id = JobId::generate();
        let s = id.as_str();
        assert!(s.starts_with("JOB-"), "unexpected prefix: {}", s);
        let suffix = &s["JOB-".len()..];
        assert_eq!(suffix.len(), 6);
        assert!(
            suffix
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()),
            "unexpected characters: {}",
            s
        );
    }
}

#[test]
fn given_valid_job_id_string_when_parsing_then_round_trips() {
    let id: JobId = "JOB-A1B2C3".parse().expect("should parse");
    assert_eq!(id.as_str(), "JOB-A1B2C3");
}

#[test]
fn given_malformed_job_id_strings_when_parsing_then_rejected() {
    for bad in ["JOB-abc123", "JOB-A1B2C", "JOB-A1B2C3D", "J0B-A1B2C3", "A1B2C3", ""] {
        assert!(bad.parse::<JobId>().is_err(), "accepted: {}", bad);
    }
}

#[test]
fn given_lifecycle_dag_then_only_forward_transitions_are_legal() {
    use JobStatus::*;
    let forward = [
        (Queued, Downloading),
        (Downloading, Extracting),
        (Extracting, Transcribing),
        (Transcribing, Formatting),
        (Formatting, Completed),
    ];
    for (from, to) in forward {
        assert!(from.can_transition_to(to), "{} -> {} should be legal", from, to);
        assert!(!to.can_transition_to(from), "{} -> {} should be illegal", to, from);
    }
}

#[test]
fn given_any_non_terminal_status_then_failed_is_reachable() {
    use JobStatus::*;
    for status in [Queued, Downloading, Extracting, Transcribing, Formatting] {
        assert!(status.can_transition_to(Failed));
    }
}

#[test]
fn given_terminal_status_then_nothing_is_reachable() {
    use JobStatus::*;
    for terminal in [Completed, Failed] {
        for next in [Queued, Downloading, Extracting, Transcribing, Formatting, Completed, Failed]
        {
            assert!(!terminal.can_transition_to(next), "{} -> {}", terminal, next);
        }
    }
}

#[test]
fn given_non_terminal_status_then_self_transition_is_legal_for_resumption() {
    use JobStatus::*;
    for status in [Queued, Downloading, Extracting, Transcribing, Formatting] {
        assert!(status.can_transition_to(status));
    }
}

#[test]
fn given_stage_bands_then_global_progress_never_decreases_across_stages() {
    use JobStatus::*;
    let path = [Downloading, Extracting, Transcribing, Formatting];
    let mut last = 0u8;
    for status in path {
        let floor = status.scale_progress(0);
        let ceiling = status.scale_progress(100);
        assert!(floor >= last, "{}: floor {} below {}", status, floor, last);
        assert!(ceiling >= floor);
        last = ceiling;
    }
    assert_eq!(Completed.scale_progress(100), 100);
}

#[test]
fn given_unsorted_segments_when_building_transcript_then_ordered_and_renumbered() {
    let transcript = Transcript::from_segments(
        "ja",
        10.0,
        vec![
            Segment {
                id: 7,
                start: 5.0,
                end: 9.5,
                text: "  後半です  ".to_string(),
            },
            Segment {
                id: 3,
                start: 0.0,
                end: 5.0,
                text: "前半です".to_string(),
            },
        ],
    );

    assert_eq!(transcript.segments[0].id, 0);
    assert_eq!(transcript.segments[0].text, "前半です");
    assert_eq!(transcript.segments[1].id, 1);
    assert_eq!(transcript.segments[1].text, "後半です");
    assert_eq!(transcript.text, "前半です\n後半です");
}

#[test]
fn given_output_format_strings_then_parse_and_file_names_agree() {
    for format in OutputFormat::ALL {
        let parsed: OutputFormat = format.as_str().parse().expect("round trip");
        assert_eq!(parsed, format);
    }
    assert_eq!(OutputFormat::Json.file_name(), "transcript.json");
    assert_eq!(OutputFormat::Srt.file_name(), "result.srt");
    assert!("xml".parse::<OutputFormat>().is_err());
}
