use std::path::PathBuf;

use scenestitch_sequence_analysis::{extract, FrameValue, SequenceAnalysisService};

fn load_module(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("fixtures")
        .join("modules")
        .join(name);
    std::fs::read_to_string(path).expect("fixture module should be readable")
}

#[test]
fn product_launch_chain_is_extracted() {
    let parsed = extract(&load_module("product_launch.tsx"));
    assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
    assert!(parsed.uses_transition_chain);

    let names: Vec<_> = parsed
        .sequences
        .iter()
        .map(|s| s.name.as_deref().unwrap_or("?"))
        .collect();
    assert_eq!(names, vec!["Opening", "Gallery", "Outro"]);
    assert!(parsed.sequences.iter().all(|s| s.is_transition_child));
    assert_eq!(parsed.sequences[0].source_line, 15);
    assert_eq!(parsed.sequences[1].source_line, 22);

    assert_eq!(parsed.transitions.len(), 2);
    assert_eq!(parsed.transitions[0].duration_in_frames, FrameValue::Literal(20));
    assert_eq!(parsed.transitions[0].presentation_kind.as_deref(), Some("fade"));
    assert_eq!(parsed.transitions[1].duration_in_frames, FrameValue::Dynamic);
    assert_eq!(parsed.transitions[1].presentation_kind.as_deref(), Some("slide"));
}

#[test]
fn product_launch_structure_overlaps_cross_fades() {
    let mut service = SequenceAnalysisService::with_options(30, 8);
    let result = service.analyze("product_launch", &load_module("product_launch.tsx"));
    assert!(result.has_dynamic_values);

    let structure = result.structure.as_ref().expect("sequences were found");
    let layout: Vec<_> = structure
        .sequences
        .iter()
        .map(|s| (s.from, s.duration_in_frames))
        .collect();
    // 20-frame fade, then a spring that falls back to the 30-frame default.
    assert_eq!(layout, vec![(0, 90), (70, 150), (190, 60)]);
    assert_eq!(structure.total_duration_in_frames(), 250);
    assert_eq!(structure.transitions.as_ref().map(Vec::len), Some(2));
}

#[test]
fn storyboard_finds_loop_and_nested_sequences() {
    let parsed = extract(&load_module("storyboard.tsx"));
    assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
    assert!(!parsed.uses_transition_chain);
    assert_eq!(parsed.sequences.len(), 5);

    let leader = &parsed.sequences[0];
    assert_eq!(leader.from, Some(FrameValue::Literal(0)));
    assert_eq!(leader.duration_in_frames, Some(FrameValue::Dynamic));

    assert!(parsed.sequences[1].is_series_child);
    assert!(parsed.sequences[2].is_series_child);
    assert_eq!(parsed.sequences[2].duration_in_frames, Some(FrameValue::Literal(30)));

    let credits = &parsed.sequences[3];
    assert_eq!(credits.name.as_deref(), Some("Credits"));
    assert_eq!(credits.duration_in_frames, Some(FrameValue::Literal(24)));
    assert!(!parsed.sequences[4].is_series_child);
}

#[test]
fn unfinished_module_reports_recoverable_error() {
    let parsed = extract(&load_module("unfinished.tsx"));
    assert_eq!(parsed.sequences.len(), 2);
    assert_eq!(parsed.errors.len(), 1);
    assert!(parsed.errors[0].starts_with("Line 6:"), "{}", parsed.errors[0]);
}
