//! Raw descriptors produced by one extraction pass.

use serde::{Deserialize, Serialize};

/// A frame count or offset as written in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameValue {
    /// A value the extractor could read directly.
    Literal(i64),
    /// An expression that can only be known by running the module.
    Dynamic,
}

impl FrameValue {
    pub fn is_dynamic(self) -> bool {
        matches!(self, FrameValue::Dynamic)
    }

    pub fn literal(self) -> Option<i64> {
        match self {
            FrameValue::Literal(v) => Some(v),
            FrameValue::Dynamic => None,
        }
    }
}

/// One discovered Sequence element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceDescriptor {
    pub name: Option<String>,

    /// `None` when the attribute is absent.
    pub from: Option<FrameValue>,

    /// `None` when the attribute is absent.
    pub duration_in_frames: Option<FrameValue>,

    /// 1-based line of the element's opening tag.
    pub source_line: u32,

    /// Child of a transition chain.
    pub is_transition_child: bool,

    /// Child of a back-to-back series.
    pub is_series_child: bool,
}

/// One discovered Transition element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionDescriptor {
    pub duration_in_frames: FrameValue,

    /// Best-effort presentation name (`fade`, `slide`, `wipe`, ...).
    pub presentation_kind: Option<String>,

    /// Index of the sequence this transition follows; `-1` when it precedes
    /// every sequence.
    pub after_sequence_index: i64,

    pub source_line: u32,
}

/// Result of a single extraction pass over one source text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedStructure {
    pub sequences: Vec<SequenceDescriptor>,
    pub transitions: Vec<TransitionDescriptor>,
    pub uses_transition_chain: bool,
    /// Line-numbered syntax problems (`Line N: message`).
    pub errors: Vec<String>,
}

impl ParsedStructure {
    /// Whether any extracted timing value is `Dynamic`.
    pub fn has_dynamic_values(&self) -> bool {
        let seq_dynamic = self.sequences.iter().any(|s| {
            s.from.is_some_and(FrameValue::is_dynamic)
                || s.duration_in_frames.is_some_and(FrameValue::is_dynamic)
        });
        seq_dynamic
            || self
                .transitions
                .iter()
                .any(|t| t.duration_in_frames.is_dynamic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(from: Option<FrameValue>, duration: Option<FrameValue>) -> SequenceDescriptor {
        SequenceDescriptor {
            name: None,
            from,
            duration_in_frames: duration,
            source_line: 1,
            is_transition_child: false,
            is_series_child: false,
        }
    }

    #[test]
    fn test_absent_values_are_not_dynamic() {
        let parsed = ParsedStructure {
            sequences: vec![seq(None, None), seq(Some(FrameValue::Literal(5)), None)],
            ..Default::default()
        };
        assert!(!parsed.has_dynamic_values());
    }

    #[test]
    fn test_dynamic_transition_marks_structure_dynamic() {
        let parsed = ParsedStructure {
            sequences: vec![seq(None, Some(FrameValue::Literal(30)))],
            transitions: vec![TransitionDescriptor {
                duration_in_frames: FrameValue::Dynamic,
                presentation_kind: Some("fade".into()),
                after_sequence_index: 0,
                source_line: 2,
            }],
            uses_transition_chain: true,
            errors: vec![],
        };
        assert!(parsed.has_dynamic_values());
    }

    #[test]
    fn test_frame_value_serde() {
        let json = serde_json::to_string(&FrameValue::Literal(12)).unwrap();
        assert_eq!(json, r#"{"literal":12}"#);
        assert_eq!(serde_json::to_string(&FrameValue::Dynamic).unwrap(), "\"dynamic\"");
    }
}
