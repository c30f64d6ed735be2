//! Function catalog
//!
//! Built-in functions are looked up case-insensitively so `Ts_Mean`,
//! `TS_MEAN` and `ts_mean` all resolve to the same implementation. Callers
//! may add their own functions to a [`FunctionTable`] before parsing.

use super::evaluator::Value;
use crate::error::{PanelError, PanelResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Casing used when rendering function names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameStyle {
    #[default]
    Camel,
    Upper,
    Lower,
}

impl NameStyle {
    pub fn apply(self, name: &str) -> String {
        match self {
            NameStyle::Camel => name.to_string(),
            NameStyle::Upper => name.to_uppercase(),
            NameStyle::Lower => name.to_lowercase(),
        }
    }
}

impl std::str::FromStr for NameStyle {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "camel" => Ok(NameStyle::Camel),
            "upper" => Ok(NameStyle::Upper),
            "lower" => Ok(NameStyle::Lower),
            other => Err(PanelError::Configuration(format!(
                "Unknown function name style '{}', expected camel, upper or lower",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// Cell by cell.
    ElementWise,
    /// Per symbol, along the row index.
    TimeSeries,
    /// Per row, across symbols. Honors index membership.
    CrossSection,
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FunctionKind::ElementWise => "element-wise",
            FunctionKind::TimeSeries => "time-series",
            FunctionKind::CrossSection => "cross-section",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Abs,
    Log,
    Exp,
    Sqrt,
    Sign,
    Pow,
    Max,
    Min,
    If,
    IsNan,
    Delay,
    Delta,
    Return,
    TsSum,
    TsMean,
    TsMax,
    TsMin,
    StdDev,
    TsRank,
    Correlation,
    Rank,
    Percentile,
    Standardize,
    Cutoff,
    GroupRank,
    Quantile,
}

impl Builtin {
    pub const ALL: [Builtin; 26] = [
        Builtin::Abs,
        Builtin::Log,
        Builtin::Exp,
        Builtin::Sqrt,
        Builtin::Sign,
        Builtin::Pow,
        Builtin::Max,
        Builtin::Min,
        Builtin::If,
        Builtin::IsNan,
        Builtin::Delay,
        Builtin::Delta,
        Builtin::Return,
        Builtin::TsSum,
        Builtin::TsMean,
        Builtin::TsMax,
        Builtin::TsMin,
        Builtin::StdDev,
        Builtin::TsRank,
        Builtin::Correlation,
        Builtin::Rank,
        Builtin::Percentile,
        Builtin::Standardize,
        Builtin::Cutoff,
        Builtin::GroupRank,
        Builtin::Quantile,
    ];

    /// Canonical (camel) name.
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Abs => "Abs",
            Builtin::Log => "Log",
            Builtin::Exp => "Exp",
            Builtin::Sqrt => "Sqrt",
            Builtin::Sign => "Sign",
            Builtin::Pow => "Pow",
            Builtin::Max => "Max",
            Builtin::Min => "Min",
            Builtin::If => "If",
            Builtin::IsNan => "IsNan",
            Builtin::Delay => "Delay",
            Builtin::Delta => "Delta",
            Builtin::Return => "Return",
            Builtin::TsSum => "Ts_Sum",
            Builtin::TsMean => "Ts_Mean",
            Builtin::TsMax => "Ts_Max",
            Builtin::TsMin => "Ts_Min",
            Builtin::StdDev => "StdDev",
            Builtin::TsRank => "Ts_Rank",
            Builtin::Correlation => "Correlation",
            Builtin::Rank => "Rank",
            Builtin::Percentile => "Percentile",
            Builtin::Standardize => "Standardize",
            Builtin::Cutoff => "Cutoff",
            Builtin::GroupRank => "GroupRank",
            Builtin::Quantile => "Quantile",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Builtin::Abs
            | Builtin::Log
            | Builtin::Exp
            | Builtin::Sqrt
            | Builtin::Sign
            | Builtin::IsNan
            | Builtin::Rank
            | Builtin::Percentile
            | Builtin::Standardize => 1,
            Builtin::If | Builtin::Correlation => 3,
            _ => 2,
        }
    }

    pub fn kind(self) -> FunctionKind {
        match self {
            Builtin::Delay
            | Builtin::Delta
            | Builtin::Return
            | Builtin::TsSum
            | Builtin::TsMean
            | Builtin::TsMax
            | Builtin::TsMin
            | Builtin::StdDev
            | Builtin::TsRank
            | Builtin::Correlation => FunctionKind::TimeSeries,
            Builtin::Rank
            | Builtin::Percentile
            | Builtin::Standardize
            | Builtin::Cutoff
            | Builtin::GroupRank
            | Builtin::Quantile => FunctionKind::CrossSection,
            _ => FunctionKind::ElementWise,
        }
    }

    pub fn lookup(name: &str) -> Option<Builtin> {
        Builtin::ALL
            .into_iter()
            .find(|b| b.name().eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constant {
    Pi,
    E,
}

impl Constant {
    pub const ALL: [Constant; 2] = [Constant::Pi, Constant::E];

    pub fn name(self) -> &'static str {
        match self {
            Constant::Pi => "PI",
            Constant::E => "E",
        }
    }

    pub fn value(self) -> f64 {
        match self {
            Constant::Pi => std::f64::consts::PI,
            Constant::E => std::f64::consts::E,
        }
    }

    /// Constants are matched exactly so that a field may be called `e`.
    pub fn lookup(name: &str) -> Option<Constant> {
        Constant::ALL.into_iter().find(|c| c.name() == name)
    }
}

pub type CustomFn = Arc<dyn Fn(&[Value]) -> PanelResult<Value> + Send + Sync>;

/// A caller-registered function.
#[derive(Clone)]
pub struct CustomFunction {
    name: String,
    arity: Option<usize>,
    func: CustomFn,
}

impl CustomFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `None` accepts any number of arguments.
    pub fn arity(&self) -> Option<usize> {
        self.arity
    }

    pub fn call(&self, args: &[Value]) -> PanelResult<Value> {
        (self.func)(args)
    }
}

impl fmt::Debug for CustomFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// A resolved function reference stored in the expression tree.
#[derive(Debug, Clone)]
pub enum Function {
    Builtin(Builtin),
    Custom(CustomFunction),
}

impl Function {
    pub fn name(&self) -> &str {
        match self {
            Function::Builtin(b) => b.name(),
            Function::Custom(c) => c.name(),
        }
    }

    pub fn arity(&self) -> Option<usize> {
        match self {
            Function::Builtin(b) => Some(b.arity()),
            Function::Custom(c) => c.arity(),
        }
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Function::Builtin(a), Function::Builtin(b)) => a == b,
            (Function::Custom(a), Function::Custom(b)) => a.name == b.name,
            _ => false,
        }
    }
}

/// Name -> implementation table consulted by the parser.
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    custom: BTreeMap<String, CustomFunction>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom function. Names colliding with a built-in function
    /// or constant (in any capitalisation) or an earlier registration are
    /// rejected.
    pub fn register<F>(&mut self, name: &str, arity: Option<usize>, func: F) -> PanelResult<()>
    where
        F: Fn(&[Value]) -> PanelResult<Value> + Send + Sync + 'static,
    {
        let identifier = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")
            .map_err(|e| PanelError::Configuration(format!("Regex error: {}", e)))?;
        if !identifier.is_match(name) {
            return Err(PanelError::Configuration(format!(
                "'{}' is not a valid function name",
                name
            )));
        }
        if Builtin::lookup(name).is_some()
            || Constant::ALL.iter().any(|c| c.name().eq_ignore_ascii_case(name))
        {
            return Err(PanelError::Configuration(format!(
                "Function '{}' collides with a built-in name, pick another name",
                name
            )));
        }
        let key = name.to_lowercase();
        if self.custom.contains_key(&key) {
            return Err(PanelError::Configuration(format!(
                "Function '{}' is already registered",
                name
            )));
        }
        self.custom.insert(
            key,
            CustomFunction {
                name: name.to_string(),
                arity,
                func: Arc::new(func),
            },
        );
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<Function> {
        if let Some(builtin) = Builtin::lookup(name) {
            return Some(Function::Builtin(builtin));
        }
        self.custom
            .get(&name.to_lowercase())
            .cloned()
            .map(Function::Custom)
    }
}
