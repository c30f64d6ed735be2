//! Formula expression engine
//!
//! `Formula::parse` turns text such as `Rank(close / Delay(close, 5))` into
//! an immutable expression tree, resolving every function name up front.
//! `Formula::evaluate` runs it against borrowed field frames and returns a
//! newly owned result frame; committing that result to a panel is left to
//! the lifecycle manager.

pub mod cross_section;
pub mod evaluator;
pub mod functions;
pub mod parser;
pub mod time_series;
pub mod tokenizer;

pub use evaluator::{evaluate, EvalContext, Evaluated, Value};
pub use functions::{Builtin, FunctionKind, FunctionTable, NameStyle};
pub use parser::{BinaryOp, Expr, UnaryOp};

use crate::error::PanelResult;
use crate::panel::Cell;
use std::collections::BTreeSet;

pub(crate) fn finite(v: f64) -> Cell {
    v.is_finite().then_some(v)
}

#[derive(Debug, Clone)]
pub struct Formula {
    source: String,
    expr: Expr,
    variables: BTreeSet<String>,
}

impl Formula {
    pub fn parse(source: &str, functions: &FunctionTable) -> PanelResult<Self> {
        let expr = parser::parse(source, functions)?;
        let variables = expr.variables();
        Ok(Self {
            source: source.to_string(),
            expr,
            variables,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Field names the formula reads.
    pub fn variables(&self) -> &BTreeSet<String> {
        &self.variables
    }

    pub fn render(&self, style: NameStyle) -> String {
        self.expr.render(style)
    }

    pub fn evaluate(&self, ctx: &EvalContext) -> PanelResult<Evaluated> {
        evaluate(&self.expr, ctx)
    }
}
