//! Static discovery of Sequence and Transition elements.
//!
//! The walk is purely structural: every element in the tree is visited,
//! including elements inside callbacks, conditionals and attribute values, so
//! loop-generated sequences are found even though their count at runtime may
//! differ.

use std::collections::{HashMap, HashSet};

use crate::descriptor::{FrameValue, ParsedStructure, SequenceDescriptor, TransitionDescriptor};
use crate::syntax::ast::{AttrValue, Attribute, Element, ElementName, Expr, Module};
use crate::syntax::parse_module;

/// Parse `source` and extract its timing descriptors.
///
/// Never fails: recoverable syntax problems are appended to `errors` and
/// extraction continues on the recovered tree; an unrecoverable one leaves
/// every list empty with a single error.
pub fn extract(source: &str) -> ParsedStructure {
    if source.trim().is_empty() {
        return ParsedStructure::default();
    }

    let output = match parse_module(source) {
        Ok(output) => output,
        Err(e) => {
            tracing::debug!(error = %e, "Module source could not be parsed");
            return ParsedStructure {
                errors: vec![e.to_string()],
                ..Default::default()
            };
        }
    };

    let mut extractor = Extractor {
        aliases: Aliases::from_module(&output.module),
        out: ParsedStructure {
            errors: output.diagnostics.iter().map(ToString::to_string).collect(),
            ..Default::default()
        },
    };
    for expr in &output.module.body {
        extractor.visit(expr, Scope::default());
    }

    let parsed = extractor.out;
    tracing::debug!(
        sequences = parsed.sequences.len(),
        transitions = parsed.transitions.len(),
        errors = parsed.errors.len(),
        chain = parsed.uses_transition_chain,
        "Extracted module timing"
    );
    parsed
}

/// Container context an element is discovered in.
#[derive(Debug, Clone, Copy, Default)]
struct Scope {
    chain: bool,
    series: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Sequence,
    SeriesSequence,
    ChainSequence,
    Transition,
    Series,
    TransitionSeries,
    Other,
}

fn classify(tag: &str, scope: Scope) -> Tag {
    match tag {
        "Sequence" => Tag::Sequence,
        "Series.Sequence" => Tag::SeriesSequence,
        "TransitionSeries.Sequence" => Tag::ChainSequence,
        "TransitionSeries.Transition" => Tag::Transition,
        "Transition" if scope.chain => Tag::Transition,
        "Series" => Tag::Series,
        "TransitionSeries" => Tag::TransitionSeries,
        _ => Tag::Other,
    }
}

/// Import-derived renames used to resolve tag and factory names.
struct Aliases<'m> {
    /// local name -> exported name
    named: HashMap<&'m str, &'m str>,
    namespaces: HashSet<&'m str>,
}

impl<'m> Aliases<'m> {
    fn from_module(module: &'m Module) -> Self {
        let mut named = HashMap::new();
        let mut namespaces = HashSet::new();
        for binding in &module.imports {
            if binding.is_namespace() {
                namespaces.insert(binding.local.as_str());
            } else if binding.imported != "default" {
                named.insert(binding.local.as_str(), binding.imported.as_str());
            }
        }
        Self { named, namespaces }
    }

    fn resolve<'a>(&'a self, local: &'a str) -> &'a str {
        self.named.get(local).copied().unwrap_or(local)
    }

    /// Canonical spelling of a tag name with aliases removed.
    fn tag(&self, name: &ElementName) -> Option<String> {
        match name {
            ElementName::Ident(name) => Some(self.resolve(name).to_string()),
            ElementName::Member(parts) => {
                let parts = match parts.split_first() {
                    Some((head, rest)) if !rest.is_empty() && self.namespaces.contains(head.as_str()) => rest,
                    _ => parts.as_slice(),
                };
                let (head, rest) = parts.split_first()?;
                let mut tag = self.resolve(head).to_string();
                for part in rest {
                    tag.push('.');
                    tag.push_str(part);
                }
                Some(tag)
            }
            ElementName::Fragment | ElementName::Namespaced { .. } => None,
        }
    }

    /// Final name segment of a callee after alias resolution.
    fn callee_name<'a>(&'a self, callee: &'a Expr) -> Option<&'a str> {
        match callee {
            Expr::Ident(name) => Some(self.resolve(name)),
            Expr::Member { property, .. } => Some(property.as_str()),
            _ => None,
        }
    }
}

struct Extractor<'m> {
    aliases: Aliases<'m>,
    out: ParsedStructure,
}

impl Extractor<'_> {
    fn visit(&mut self, expr: &Expr, scope: Scope) {
        match expr {
            Expr::Element(element) => self.visit_element(element, scope),
            other => other.for_each_child(|child| self.visit(child, scope)),
        }
    }

    fn visit_element(&mut self, element: &Element, scope: Scope) {
        let tag = self
            .aliases
            .tag(&element.name)
            .map_or(Tag::Other, |tag| classify(&tag, scope));

        let inner = match tag {
            Tag::Sequence | Tag::SeriesSequence | Tag::ChainSequence => {
                self.push_sequence(element, tag, scope);
                Scope::default()
            }
            Tag::Transition => {
                self.push_transition(element);
                Scope::default()
            }
            Tag::TransitionSeries => {
                self.out.uses_transition_chain = true;
                Scope {
                    chain: true,
                    series: false,
                }
            }
            Tag::Series => Scope {
                chain: false,
                series: true,
            },
            Tag::Other => scope,
        };

        for attr in &element.attributes {
            match attr {
                Attribute::Named {
                    value: Some(AttrValue::Expr(expr)),
                    ..
                }
                | Attribute::Spread(expr) => self.visit(expr, inner),
                _ => {}
            }
        }
        for child in &element.children {
            self.visit(child, inner);
        }
    }

    fn push_sequence(&mut self, element: &Element, tag: Tag, scope: Scope) {
        let is_transition_child = tag == Tag::ChainSequence || (tag == Tag::Sequence && scope.chain);
        let is_series_child =
            !is_transition_child && (tag == Tag::SeriesSequence || (tag == Tag::Sequence && scope.series));

        self.out.sequences.push(SequenceDescriptor {
            name: string_attribute(element, "name"),
            from: frame_attribute(element, "from"),
            duration_in_frames: frame_attribute(element, "durationInFrames"),
            source_line: element.line,
            is_transition_child,
            is_series_child,
        });
    }

    fn push_transition(&mut self, element: &Element) {
        let duration_in_frames = self
            .timing_duration(element)
            .or_else(|| frame_attribute(element, "durationInFrames"))
            .unwrap_or(FrameValue::Dynamic);

        let presentation_kind = match attribute_expr(element, "presentation") {
            Some(Expr::Call { callee, .. }) => self.aliases.callee_name(callee).map(str::to_string),
            _ => None,
        };

        self.out.transitions.push(TransitionDescriptor {
            duration_in_frames,
            presentation_kind,
            after_sequence_index: self.out.sequences.len() as i64 - 1,
            source_line: element.line,
        });
    }

    /// Duration from a `timing={factory({...})}` attribute, if present.
    fn timing_duration(&self, element: &Element) -> Option<FrameValue> {
        let expr = attribute_expr(element, "timing")?;
        let Expr::Call { callee, args } = expr else {
            return Some(FrameValue::Dynamic);
        };
        let explicit = args
            .first()
            .and_then(|options| options.object_field("durationInFrames"))
            .map(expr_frame_value);

        match self.aliases.callee_name(callee) {
            Some("linearTiming") => Some(explicit.unwrap_or(FrameValue::Dynamic)),
            // A spring settles on its own schedule unless told otherwise.
            Some("springTiming") => Some(explicit.unwrap_or(FrameValue::Dynamic)),
            _ => Some(FrameValue::Dynamic),
        }
    }
}

fn attribute_expr<'e>(element: &'e Element, name: &str) -> Option<&'e Expr> {
    match element.attribute(name)? {
        Attribute::Named {
            value: Some(AttrValue::Expr(expr)),
            ..
        } => Some(expr),
        _ => None,
    }
}

fn string_attribute(element: &Element, name: &str) -> Option<String> {
    match element.attribute(name)? {
        Attribute::Named {
            value: Some(AttrValue::Str(s)),
            ..
        }
        | Attribute::Named {
            value: Some(AttrValue::Expr(Expr::Str(s))),
            ..
        } => Some(s.clone()),
        _ => None,
    }
}

/// `None` when the attribute is absent.
fn frame_attribute(element: &Element, name: &str) -> Option<FrameValue> {
    match element.attribute(name)? {
        // Value-less attributes mean `true`, which is not a frame count.
        Attribute::Named { value: None, .. } => Some(FrameValue::Dynamic),
        Attribute::Named {
            value: Some(AttrValue::Str(s)),
            ..
        } => Some(numeric_string(s)),
        Attribute::Named {
            value: Some(AttrValue::Expr(expr)),
            ..
        } => Some(expr_frame_value(expr)),
        Attribute::Spread(_) => None,
    }
}

fn expr_frame_value(expr: &Expr) -> FrameValue {
    match expr {
        Expr::Number(n) => number_value(*n),
        Expr::Str(s) => numeric_string(s),
        _ => FrameValue::Dynamic,
    }
}

fn numeric_string(s: &str) -> FrameValue {
    s.trim()
        .parse::<f64>()
        .map_or(FrameValue::Dynamic, number_value)
}

fn number_value(n: f64) -> FrameValue {
    if n.is_finite() && n.abs() < i64::MAX as f64 {
        FrameValue::Literal(n.trunc() as i64)
    } else {
        FrameValue::Dynamic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_source() {
        assert_eq!(extract(""), ParsedStructure::default());
        assert_eq!(extract("  \n\t "), ParsedStructure::default());
    }

    #[test]
    fn test_literal_and_dynamic_values() {
        let parsed = extract(
            r#"export const Main = () => (
  <>
    <Sequence from={0} durationInFrames={60} name="Intro" />
    <Sequence from={offset} durationInFrames={fps * 2} />
    <Sequence durationInFrames="45" />
    <Sequence from durationInFrames={12.9} />
  </>
);"#,
        );
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        assert_eq!(parsed.sequences.len(), 4);

        let s = &parsed.sequences;
        assert_eq!(s[0].name.as_deref(), Some("Intro"));
        assert_eq!(s[0].from, Some(FrameValue::Literal(0)));
        assert_eq!(s[0].duration_in_frames, Some(FrameValue::Literal(60)));
        assert_eq!(s[0].source_line, 3);

        assert_eq!(s[1].from, Some(FrameValue::Dynamic));
        assert_eq!(s[1].duration_in_frames, Some(FrameValue::Dynamic));

        assert_eq!(s[2].from, None);
        assert_eq!(s[2].duration_in_frames, Some(FrameValue::Literal(45)));

        assert_eq!(s[3].from, Some(FrameValue::Dynamic));
        assert_eq!(s[3].duration_in_frames, Some(FrameValue::Literal(12)));
        assert!(!parsed.uses_transition_chain);
    }

    #[test]
    fn test_transition_chain() {
        let parsed = extract(
            r#"import { TransitionSeries, linearTiming, springTiming } from "@remotion/transitions";
import { fade } from "@remotion/transitions/fade";
import { slide } from "@remotion/transitions/slide";

export const Chain = () => (
  <TransitionSeries>
    <TransitionSeries.Sequence durationInFrames={40}><A /></TransitionSeries.Sequence>
    <TransitionSeries.Transition presentation={fade()} timing={linearTiming({ durationInFrames: 15 })} />
    <TransitionSeries.Sequence durationInFrames={60}><B /></TransitionSeries.Sequence>
    <TransitionSeries.Transition presentation={slide({ direction: "from-left" })} timing={springTiming({ config: { damping: 200 } })} />
    <TransitionSeries.Sequence durationInFrames={30}><C /></TransitionSeries.Sequence>
  </TransitionSeries>
);"#,
        );
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        assert!(parsed.uses_transition_chain);
        assert_eq!(parsed.sequences.len(), 3);
        assert!(parsed.sequences.iter().all(|s| s.is_transition_child));

        let t = &parsed.transitions;
        assert_eq!(t.len(), 2);
        assert_eq!(t[0].after_sequence_index, 0);
        assert_eq!(t[0].duration_in_frames, FrameValue::Literal(15));
        assert_eq!(t[0].presentation_kind.as_deref(), Some("fade"));
        assert_eq!(t[1].after_sequence_index, 1);
        assert_eq!(t[1].duration_in_frames, FrameValue::Dynamic);
        assert_eq!(t[1].presentation_kind.as_deref(), Some("slide"));
    }

    #[test]
    fn test_spring_with_explicit_duration_is_literal() {
        let parsed = extract(
            "<TransitionSeries><TransitionSeries.Sequence durationInFrames={10} /><TransitionSeries.Transition presentation={wipes.wipe()} timing={springTiming({durationInFrames: 24})} /><TransitionSeries.Sequence durationInFrames={10} /></TransitionSeries>",
        );
        assert_eq!(parsed.transitions[0].duration_in_frames, FrameValue::Literal(24));
        assert_eq!(parsed.transitions[0].presentation_kind.as_deref(), Some("wipe"));
    }

    #[test]
    fn test_aliases_and_namespace_imports() {
        let parsed = extract(
            r#"import * as R from "remotion";
import { TransitionSeries as TS } from "@remotion/transitions";
import { Sequence as Clip } from "remotion";
const X = () => (
  <TS>
    <TS.Sequence durationInFrames={20} />
    <TS.Transition timing={linearTiming({durationInFrames: 5})} />
    <Sequence durationInFrames={20} />
  </TS>
);
const Y = () => <R.Sequence from={5} durationInFrames={10}><Clip durationInFrames={3} /></R.Sequence>;"#,
        );
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        assert!(parsed.uses_transition_chain);
        assert_eq!(parsed.sequences.len(), 4);
        // Unqualified short name inside the chain still counts as a chain child.
        assert!(parsed.sequences[0].is_transition_child);
        assert!(parsed.sequences[1].is_transition_child);
        // Sequences outside the chain, and nested inside another sequence, do not.
        assert!(!parsed.sequences[2].is_transition_child);
        assert!(!parsed.sequences[3].is_transition_child);
        assert_eq!(parsed.transitions.len(), 1);
    }

    #[test]
    fn test_series_children_and_loops() {
        let parsed = extract(
            r#"export const S = ({ items }) => (
  <Series>
    {items.map((item, i) => (
      <Series.Sequence key={i} durationInFrames={item.frames}>
        <Card item={item} />
      </Series.Sequence>
    ))}
    <Series.Sequence durationInFrames={30} />
  </Series>
);"#,
        );
        assert_eq!(parsed.sequences.len(), 2);
        assert!(parsed.sequences.iter().all(|s| s.is_series_child));
        assert_eq!(parsed.sequences[0].duration_in_frames, Some(FrameValue::Dynamic));
        assert_eq!(parsed.sequences[1].duration_in_frames, Some(FrameValue::Literal(30)));
    }

    #[test]
    fn test_recoverable_errors_are_reported_with_lines() {
        let parsed = extract("<AbsoluteFill>\n  <Sequence durationInFrames={10}>\n</AbsoluteFill>\n");
        assert_eq!(parsed.sequences.len(), 1);
        assert_eq!(parsed.errors.len(), 1);
        assert!(parsed.errors[0].starts_with("Line 2:"), "{}", parsed.errors[0]);
    }

    #[test]
    fn test_fatal_error_empties_result() {
        let parsed = extract("<Sequence durationInFrames={10} />\n/* unterminated");
        assert!(parsed.sequences.is_empty());
        assert!(parsed.transitions.is_empty());
        assert_eq!(parsed.errors.len(), 1);
        assert!(parsed.errors[0].contains("Line 2"));
    }

    #[test]
    fn test_escaped_non_ascii_does_not_abort_discovery() {
        let parsed = extract("const s = \"caf\\é\";\n<Sequence durationInFrames={10} />");
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        assert_eq!(parsed.sequences.len(), 1);
        assert_eq!(parsed.sequences[0].source_line, 2);
    }

    #[test]
    fn test_transition_before_any_sequence() {
        let parsed = extract("<TransitionSeries><TransitionSeries.Transition timing={linearTiming({durationInFrames: 5})} /></TransitionSeries>");
        assert_eq!(parsed.transitions[0].after_sequence_index, -1);
    }
}
