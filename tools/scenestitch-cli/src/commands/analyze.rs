//! Discover a scene module's sequence structure.

use std::path::PathBuf;

use scenestitch_common::AppConfig;
use scenestitch_sequence_analysis::{FrameValue, SequenceAnalysisService};

pub fn run(
    config: &AppConfig,
    path: PathBuf,
    id: Option<String>,
    default_duration: Option<u64>,
    json: bool,
) -> anyhow::Result<()> {
    let source = std::fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
    let component_id = id.unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "module".to_string())
    });

    let mut service = SequenceAnalysisService::with_options(
        default_duration.unwrap_or(config.analysis.default_duration_frames),
        config.analysis.max_cache_size,
    );
    let result = service.analyze(&component_id, &source);

    if json {
        println!("{}", serde_json::to_string_pretty(&*result)?);
        return Ok(());
    }

    println!("Module: {component_id}");
    println!("  Source hash: {}", result.source_hash);
    println!("  Transition chain: {}", result.parsed.uses_transition_chain);
    println!("  Dynamic values: {}", result.has_dynamic_values);
    println!();

    println!("Sequences ({}):", result.parsed.sequences.len());
    for (i, seq) in result.parsed.sequences.iter().enumerate() {
        println!(
            "  [{i}] {:<20} from={:<8} duration={:<8} line {}",
            seq.name.as_deref().unwrap_or("-"),
            describe(seq.from),
            describe(seq.duration_in_frames),
            seq.source_line
        );
    }

    if !result.parsed.transitions.is_empty() {
        println!();
        println!("Transitions ({}):", result.parsed.transitions.len());
        for t in &result.parsed.transitions {
            println!(
                "  after [{}] {:<12} duration={:<8} line {}",
                t.after_sequence_index,
                t.presentation_kind.as_deref().unwrap_or("-"),
                describe(Some(t.duration_in_frames)),
                t.source_line
            );
        }
    }

    println!();
    match &result.structure {
        Some(structure) => {
            println!(
                "Layout ({} frames total):",
                structure.total_duration_in_frames()
            );
            for seq in &structure.sequences {
                println!(
                    "  {:<20} {:>6} .. {:<6}",
                    seq.name.as_deref().unwrap_or("-"),
                    seq.from,
                    seq.end()
                );
            }
        }
        None => println!("Layout: no sequences found"),
    }

    if !result.parsed.errors.is_empty() {
        println!();
        println!("Syntax errors ({}):", result.parsed.errors.len());
        for err in &result.parsed.errors {
            println!("  {err}");
        }
    }

    Ok(())
}

fn describe(value: Option<FrameValue>) -> String {
    match value {
        None => "-".to_string(),
        Some(FrameValue::Dynamic) => "dynamic".to_string(),
        Some(FrameValue::Literal(v)) => v.to_string(),
    }
}
