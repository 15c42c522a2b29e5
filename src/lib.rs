//! Fill ODT document templates with data.
//!
//! Templates are ordinary ODT files where markers are written directly in
//! the document text:
//!
//! - `{expression}` is replaced by the value of the expression,
//! - `{#each iterable as item}` ... `{/each}` repeats the content in
//!   between for every element of a list,
//! - `{#if condition}` ... `{:else}` ... `{/if}` keeps one branch,
//! - `{#image expression}` embeds an image carried by the data.
//!
//! Markers survive the formatting fragmentation word processors produce:
//! a marker partially set in bold still works, the conflicting formatting
//! is simply dropped.
//!
//! # Example
//!
//! ```no_run
//! # fn main() -> odfill::Result<()> {
//! let template = std::fs::read("lettre.odt")?;
//!
//! let data = odfill::value! {{
//!     nom: "David Bruant",
//!     courses: ["Radis", "Pâtes", "Café"],
//! }};
//!
//! let filled = odfill::fill_odt_template(&template, data)?;
//! std::fs::write("lettre-remplie.odt", filled)?;
//! # Ok(()) }
//! ```
//!
//! # Custom expression evaluators
//!
//! Expressions are evaluated by the [`ExprEvaluator`] by default; plug in
//! your own language by implementing [`Evaluator`].
//!
//! ```
//! use odfill::{Engine, Evaluator, Result, Scope, Value};
//!
//! struct NamesOnly;
//!
//! impl Evaluator for NamesOnly {
//!     fn evaluate(&self, expr: &str, scope: &Scope<'_>) -> Result<Value> {
//!         Ok(scope.lookup(expr).cloned().unwrap_or(Value::None))
//!     }
//! }
//!
//! let engine = Engine::with_evaluator(NamesOnly);
//! ```

mod block;
mod error;
mod eval;
mod fill;
mod macros;
mod marker;
mod odf;
mod prepare;
mod tree;
mod value;
mod xml;

pub use crate::error::{Error, ErrorKind, Result};
pub use crate::eval::{Evaluator, ExprEvaluator, Scope};
#[cfg(feature = "serde")]
pub use crate::value::to_value;
pub use crate::value::{Image, List, Map, Value};

/// Fills ODT templates.
///
/// The engine only carries the expression evaluator, so constructing one is
/// cheap and a single engine can fill any number of templates.
#[derive(Debug, Clone)]
pub struct Engine<E = ExprEvaluator> {
    evaluator: E,
}

impl Engine<ExprEvaluator> {
    /// Constructs an engine using the built-in expression evaluator.
    pub fn new() -> Self {
        Self {
            evaluator: ExprEvaluator,
        }
    }
}

impl Default for Engine<ExprEvaluator> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Evaluator> Engine<E> {
    /// Constructs an engine with a custom expression evaluator.
    pub fn with_evaluator(evaluator: E) -> Self {
        Self { evaluator }
    }

    /// Fills the template with the given data and returns the new ODT
    /// file.
    ///
    /// The data is serialized to a [`Value`] first; use
    /// [`fill_from`][Engine::fill_from] to pass a [`Value`] directly.
    #[cfg(feature = "serde")]
    pub fn fill<S>(&self, template: &[u8], data: S) -> Result<Vec<u8>>
    where
        S: serde::Serialize,
    {
        self.fill_from(template, to_value(data)?)
    }

    /// Fills the template with the given data and returns the new ODT
    /// file.
    pub fn fill_from(&self, template: &[u8], data: Value) -> Result<Vec<u8>> {
        odf::fill_template(template, &data, &self.evaluator)
    }
}

/// Fills an ODT template with the given data using the default engine.
pub fn fill_odt_template(template: &[u8], data: Value) -> Result<Vec<u8>> {
    Engine::new().fill_from(template, data)
}

/// Extracts the plain text of an ODT file.
///
/// Paragraphs and headings each produce a line; list items are prefixed
/// with `- `.
pub fn odt_text_content(odt: &[u8]) -> Result<String> {
    odf::text_content(odt)
}
