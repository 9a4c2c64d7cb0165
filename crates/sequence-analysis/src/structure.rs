//! Normalized, concrete sequence layout.
//!
//! [`to_structure`] turns raw descriptors into frame offsets a timeline view
//! can draw directly: dynamic values get a default, appended sequences are
//! laid out back-to-back, and each transition pulls every later sequence
//! earlier by its own length so cross-fades overlap.

use serde::{Deserialize, Serialize};

use crate::descriptor::{FrameValue, ParsedStructure, SequenceDescriptor};

/// One sequence with concrete offsets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureSequence {
    pub name: Option<String>,
    pub from: u64,
    pub duration_in_frames: u64,
}

impl StructureSequence {
    /// First frame after the sequence.
    pub fn end(&self) -> u64 {
        self.from + self.duration_in_frames
    }
}

/// One transition with a concrete length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureTransition {
    pub after_sequence_index: usize,
    pub duration_in_frames: u64,
    pub presentation_kind: Option<String>,
}

/// The layout consumed by visualization collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceStructure {
    pub sequences: Vec<StructureSequence>,
    pub transitions: Option<Vec<StructureTransition>>,
}

impl SequenceStructure {
    /// Frames until the last sequence ends.
    pub fn total_duration_in_frames(&self) -> u64 {
        self.sequences.iter().map(StructureSequence::end).max().unwrap_or(0)
    }

    /// Index of the top-most sequence showing at `frame`. During a cross-fade
    /// the incoming (later) sequence wins.
    pub fn sequence_at(&self, frame: u64) -> Option<usize> {
        self.sequences
            .iter()
            .rposition(|s| frame >= s.from && frame < s.end())
    }
}

/// Normalize `parsed` with `default_duration` substituted for dynamic or
/// missing durations. `None` when no sequences were found.
pub fn to_structure(parsed: &ParsedStructure, default_duration: u64) -> Option<SequenceStructure> {
    if parsed.sequences.is_empty() {
        return None;
    }

    let default = i64::try_from(default_duration).unwrap_or(i64::MAX);
    let mut froms = Vec::with_capacity(parsed.sequences.len());
    let mut durations = Vec::with_capacity(parsed.sequences.len());
    let mut cursor = 0i64;

    for seq in &parsed.sequences {
        let duration = match seq.duration_in_frames {
            Some(FrameValue::Literal(v)) => v.max(0),
            Some(FrameValue::Dynamic) | None => default,
        };
        let from = base_from(seq, cursor);
        cursor = from.max(0).saturating_add(duration);
        froms.push(from);
        durations.push(duration);
    }

    let last = parsed.sequences.len() - 1;
    let transitions: Vec<StructureTransition> = parsed
        .transitions
        .iter()
        .filter_map(|t| {
            let index = usize::try_from(t.after_sequence_index).ok()?;
            if index >= last {
                return None;
            }
            let duration = match t.duration_in_frames {
                FrameValue::Literal(v) => v.max(0),
                FrameValue::Dynamic => default,
            };
            Some(StructureTransition {
                after_sequence_index: index,
                duration_in_frames: duration as u64,
                presentation_kind: t.presentation_kind.clone(),
            })
        })
        .collect();

    for t in &transitions {
        for from in &mut froms[t.after_sequence_index + 1..] {
            *from = from.saturating_sub(t.duration_in_frames as i64);
        }
    }

    let sequences = parsed
        .sequences
        .iter()
        .zip(froms.into_iter().zip(durations))
        .map(|(seq, (from, duration))| StructureSequence {
            name: seq.name.clone(),
            from: from.max(0) as u64,
            duration_in_frames: duration as u64,
        })
        .collect();

    Some(SequenceStructure {
        sequences,
        transitions: (!transitions.is_empty()).then_some(transitions),
    })
}

fn base_from(seq: &SequenceDescriptor, cursor: i64) -> i64 {
    if seq.is_transition_child || seq.is_series_child {
        return cursor;
    }
    match seq.from {
        Some(FrameValue::Literal(v)) => v,
        Some(FrameValue::Dynamic) => cursor,
        None => 0,
    }
}
