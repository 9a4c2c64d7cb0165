//! Syntax layer for scene-module source text.
//!
//! Scene modules are written in a component-description language: script code
//! with embedded element trees (`<Sequence from={10}>...</Sequence>`). Only the
//! element trees and a small literal/call subset of expressions matter for
//! timing analysis, so the parser here is deliberately tolerant: code it does
//! not model is kept as opaque nodes that still carry any nested elements.

pub mod ast;
mod parser;
mod scanner;

pub use parser::{parse_module, Diagnostic, FatalSyntaxError, ParseOutput};
