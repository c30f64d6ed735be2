//! Formula evaluator
//!
//! Evaluates an expression tree over field frames. Scalars broadcast
//! against frames; frames combine only when they share the same dates and
//! symbols. Results that are not finite (division by zero, log of a
//! negative number) become undefined cells.

use super::cross_section;
use super::finite;
use super::functions::{Builtin, Function, FunctionKind};
use super::parser::{BinaryOp, Expr, UnaryOp};
use super::time_series;
use crate::error::{PanelError, PanelResult};
use crate::panel::align::align;
use crate::panel::{Cell, FieldFrame};
use crate::types::{Date, FieldCategory};
use std::collections::BTreeMap;
use tracing::debug;

/// Value type produced while evaluating
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(f64),
    Frame(FieldFrame),
}

impl Value {
    pub fn as_frame(&self) -> Option<&FieldFrame> {
        match self {
            Value::Frame(f) => Some(f),
            Value::Scalar(_) => None,
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(s) => Some(*s),
            Value::Frame(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Variable {
    frame: FieldFrame,
    category: FieldCategory,
}

/// Everything a formula may read: the variable frames, the announcement
/// dates used to expand quarterly variables, the trading calendar and the
/// optional index membership (1.0 member, 0.0 not) for cross-sectional
/// scoping.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    variables: BTreeMap<String, Variable>,
    ann_dates: Option<FieldFrame>,
    trading_dates: Vec<Date>,
    membership: Option<FieldFrame>,
}

impl EvalContext {
    pub fn new(trading_dates: Vec<Date>) -> Self {
        Self {
            trading_dates,
            ..Self::default()
        }
    }

    pub fn with_variable(mut self, name: &str, frame: FieldFrame, category: FieldCategory) -> Self {
        self.insert_variable(name, frame, category);
        self
    }

    pub fn insert_variable(&mut self, name: &str, frame: FieldFrame, category: FieldCategory) {
        self.variables
            .insert(name.to_string(), Variable { frame, category });
    }

    pub fn with_ann_dates(mut self, ann_dates: FieldFrame) -> Self {
        self.ann_dates = Some(ann_dates);
        self
    }

    pub fn with_membership(mut self, membership: FieldFrame) -> Self {
        self.membership = Some(membership);
        self
    }
}

/// Result of a formula evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluated {
    pub frame: FieldFrame,
    /// Quarterly only when every variable was quarterly.
    pub category: FieldCategory,
}

/// Evaluate `expr` against `ctx`.
///
/// When every referenced variable is quarterly the evaluation stays on
/// report dates. Otherwise quarterly variables are first expanded onto the
/// trading calendar by announcement date.
pub fn evaluate(expr: &Expr, ctx: &EvalContext) -> PanelResult<Evaluated> {
    let names = expr.variables();
    if names.is_empty() {
        return Err(PanelError::Eval(
            "Formula does not reference any field".to_string(),
        ));
    }

    let mut variables = Vec::with_capacity(names.len());
    for name in &names {
        let variable = ctx.variables.get(name).ok_or_else(|| {
            PanelError::Resolution(format!("Variable '{}' could not be resolved", name))
        })?;
        variables.push((name, variable));
    }

    let category = if variables
        .iter()
        .all(|(_, v)| v.category == FieldCategory::Quarterly)
    {
        FieldCategory::Quarterly
    } else {
        FieldCategory::Daily
    };

    let mut frames = BTreeMap::new();
    for (name, variable) in variables {
        let frame = if category == FieldCategory::Daily && variable.category == FieldCategory::Quarterly {
            let ann = ctx.ann_dates.as_ref().ok_or_else(|| {
                PanelError::DataUnavailable(format!(
                    "No announcement dates to expand quarterly variable '{}'",
                    name
                ))
            })?;
            debug!(variable = %name, "expanding quarterly variable to daily");
            align(&variable.frame, ann, &ctx.trading_dates)?
        } else {
            variable.frame.clone()
        };
        frames.insert(name.clone(), frame);
    }

    let membership = match category {
        FieldCategory::Daily => ctx.membership.as_ref(),
        FieldCategory::Quarterly => {
            if ctx.membership.is_some() {
                debug!("index membership is daily, ignored for a quarterly formula");
            }
            None
        }
    };

    let scope = Scope { frames, membership };
    match scope.eval(expr)? {
        Value::Frame(frame) => Ok(Evaluated { frame, category }),
        Value::Scalar(_) => Err(PanelError::Eval(
            "Formula evaluated to a scalar, expected a field".to_string(),
        )),
    }
}

struct Scope<'a> {
    frames: BTreeMap<String, FieldFrame>,
    membership: Option<&'a FieldFrame>,
}

impl Scope<'_> {
    fn eval(&self, expr: &Expr) -> PanelResult<Value> {
        match expr {
            Expr::Number(n) => Ok(Value::Scalar(*n)),
            Expr::Constant(c) => Ok(Value::Scalar(c.value())),
            Expr::Variable(name) => self
                .frames
                .get(name)
                .cloned()
                .map(Value::Frame)
                .ok_or_else(|| {
                    PanelError::Resolution(format!("Variable '{}' could not be resolved", name))
                }),
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                let op = *op;
                elementwise(&[value], move |c| unary(op, c[0]))
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                let op = *op;
                elementwise(&[left, right], move |c| binary(op, c[0], c[1]))
            }
            Expr::Call { function, args } => {
                let values = args
                    .iter()
                    .map(|a| self.eval(a))
                    .collect::<PanelResult<Vec<_>>>()?;
                match function {
                    Function::Builtin(builtin) => self.call_builtin(*builtin, &values),
                    Function::Custom(custom) => custom.call(&values),
                }
            }
        }
    }

    fn call_builtin(&self, builtin: Builtin, args: &[Value]) -> PanelResult<Value> {
        match builtin.kind() {
            FunctionKind::ElementWise => element_function(builtin, args),
            FunctionKind::TimeSeries => time_series_function(builtin, args),
            FunctionKind::CrossSection => self.cross_section_function(builtin, args),
        }
    }

    fn cross_section_function(&self, builtin: Builtin, args: &[Value]) -> PanelResult<Value> {
        let frame = frame_arg(builtin, &args[0])?;
        let mask = self
            .membership
            .map(|m| m.reindex(frame.index(), frame.symbols()));
        let groups = match builtin {
            Builtin::GroupRank => {
                let groups = frame_arg(builtin, &args[1])?;
                check_shape(frame, groups)?;
                Some(groups)
            }
            _ => None,
        };
        let z = match builtin {
            Builtin::Cutoff => scalar_arg(builtin, &args[1])?,
            _ => 0.0,
        };
        let buckets = match builtin {
            Builtin::Quantile => window_arg(builtin, &args[1], 1)?,
            _ => 0,
        };

        let (rows, cols) = frame.shape();
        let mut columns = vec![Vec::with_capacity(rows); cols];
        for i in 0..rows {
            let mut row = frame.row(i);
            if let Some(mask) = &mask {
                for (j, cell) in row.iter_mut().enumerate() {
                    if !matches!(mask.columns()[j][i], Some(m) if m != 0.0) {
                        *cell = None;
                    }
                }
            }
            let out = match builtin {
                Builtin::Rank => cross_section::rank(&row),
                Builtin::Percentile => cross_section::percentile(&row),
                Builtin::Standardize => cross_section::standardize(&row),
                Builtin::Cutoff => cross_section::cutoff(&row, z),
                Builtin::Quantile => cross_section::quantile(&row, buckets),
                Builtin::GroupRank => {
                    let group_row = groups.map(|g| g.row(i)).unwrap_or_default();
                    cross_section::group_rank(&row, &group_row)
                }
                other => {
                    return Err(PanelError::Eval(format!(
                        "'{}' is not a cross-sectional function",
                        other.name()
                    )))
                }
            };
            for (column, cell) in columns.iter_mut().zip(out) {
                column.push(cell);
            }
        }
        Ok(Value::Frame(FieldFrame::from_parts(
            frame.index().to_vec(),
            frame.symbols().to_vec(),
            columns,
        )))
    }
}

fn truth(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

fn unary(op: UnaryOp, a: Cell) -> Cell {
    let a = a?;
    Some(match op {
        UnaryOp::Neg => -a,
        UnaryOp::Not => truth(a == 0.0),
    })
}

fn binary(op: BinaryOp, a: Cell, b: Cell) -> Cell {
    let (a, b) = (a?, b?);
    let v = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a % b,
        BinaryOp::Pow => a.powf(b),
        BinaryOp::Eq => truth(a == b),
        BinaryOp::Ne => truth(a != b),
        BinaryOp::Lt => truth(a < b),
        BinaryOp::Gt => truth(a > b),
        BinaryOp::Le => truth(a <= b),
        BinaryOp::Ge => truth(a >= b),
        BinaryOp::And => truth(a != 0.0 && b != 0.0),
        BinaryOp::Or => truth(a != 0.0 || b != 0.0),
    };
    Some(v)
}

fn check_shape(a: &FieldFrame, b: &FieldFrame) -> PanelResult<()> {
    if a.same_shape(b) {
        return Ok(());
    }
    let (ar, ac) = a.shape();
    let (br, bc) = b.shape();
    Err(PanelError::Eval(format!(
        "Dimension mismatch: {} dates x {} symbols vs {} dates x {} symbols",
        ar, ac, br, bc
    )))
}

/// Apply `f` cell by cell across `args`, broadcasting scalars.
fn elementwise<F>(args: &[Value], f: F) -> PanelResult<Value>
where
    F: Fn(&[Cell]) -> Cell,
{
    let template = match args.iter().find_map(Value::as_frame) {
        Some(frame) => frame,
        None => {
            let cells: Vec<Cell> = args.iter().filter_map(Value::as_scalar).map(finite).collect();
            return Ok(Value::Scalar(f(&cells).unwrap_or(f64::NAN)));
        }
    };
    for frame in args.iter().filter_map(Value::as_frame) {
        check_shape(template, frame)?;
    }

    let (rows, cols) = template.shape();
    let mut cells = Vec::with_capacity(args.len());
    let mut columns = Vec::with_capacity(cols);
    for j in 0..cols {
        let mut column = Vec::with_capacity(rows);
        for i in 0..rows {
            cells.clear();
            for arg in args {
                cells.push(match arg {
                    Value::Scalar(s) => finite(*s),
                    Value::Frame(frame) => frame.columns()[j][i],
                });
            }
            column.push(f(&cells).and_then(finite));
        }
        columns.push(column);
    }
    Ok(Value::Frame(FieldFrame::from_parts(
        template.index().to_vec(),
        template.symbols().to_vec(),
        columns,
    )))
}

fn element_function(builtin: Builtin, args: &[Value]) -> PanelResult<Value> {
    match builtin {
        Builtin::Abs => elementwise(args, |c| Some(c[0]?.abs())),
        Builtin::Log => elementwise(args, |c| Some(c[0]?.ln())),
        Builtin::Exp => elementwise(args, |c| Some(c[0]?.exp())),
        Builtin::Sqrt => elementwise(args, |c| Some(c[0]?.sqrt())),
        Builtin::Sign => elementwise(args, |c| {
            let v = c[0]?;
            Some(if v > 0.0 {
                1.0
            } else if v < 0.0 {
                -1.0
            } else {
                0.0
            })
        }),
        Builtin::Pow => elementwise(args, |c| Some(c[0]?.powf(c[1]?))),
        Builtin::Max => elementwise(args, |c| Some(c[0]?.max(c[1]?))),
        Builtin::Min => elementwise(args, |c| Some(c[0]?.min(c[1]?))),
        Builtin::If => elementwise(args, |c| if c[0]? != 0.0 { c[1] } else { c[2] }),
        Builtin::IsNan => elementwise(args, |c| Some(truth(c[0].is_none()))),
        other => Err(PanelError::Eval(format!(
            "'{}' is not an element-wise function",
            other.name()
        ))),
    }
}

fn frame_arg<'v>(builtin: Builtin, value: &'v Value) -> PanelResult<&'v FieldFrame> {
    value.as_frame().ok_or_else(|| {
        PanelError::Eval(format!(
            "{}() expects a field argument, got a scalar",
            builtin.name()
        ))
    })
}

fn scalar_arg(builtin: Builtin, value: &Value) -> PanelResult<f64> {
    value.as_scalar().ok_or_else(|| {
        PanelError::Eval(format!(
            "{}() expects a scalar argument, got a field",
            builtin.name()
        ))
    })
}

/// A non-negative integer argument of at least `min`.
fn window_arg(builtin: Builtin, value: &Value, min: usize) -> PanelResult<usize> {
    let n = scalar_arg(builtin, value)?;
    if n.fract() != 0.0 || n < min as f64 {
        return Err(PanelError::Eval(format!(
            "{}() expects an integer window of at least {}, got {}",
            builtin.name(),
            min,
            n
        )));
    }
    Ok(n as usize)
}

fn map_columns<F>(frame: &FieldFrame, f: F) -> Value
where
    F: Fn(&[Cell]) -> Vec<Cell>,
{
    let columns = frame.columns().iter().map(|c| f(c.as_slice())).collect();
    Value::Frame(FieldFrame::from_parts(
        frame.index().to_vec(),
        frame.symbols().to_vec(),
        columns,
    ))
}

fn time_series_function(builtin: Builtin, args: &[Value]) -> PanelResult<Value> {
    let frame = frame_arg(builtin, &args[0])?;

    if builtin == Builtin::Correlation {
        let other = frame_arg(builtin, &args[1])?;
        check_shape(frame, other)?;
        let n = window_arg(builtin, &args[2], 2)?;
        let columns = frame
            .columns()
            .iter()
            .zip(other.columns())
            .map(|(x, y)| time_series::rolling_correlation(x, y, n))
            .collect();
        return Ok(Value::Frame(FieldFrame::from_parts(
            frame.index().to_vec(),
            frame.symbols().to_vec(),
            columns,
        )));
    }

    let value = match builtin {
        Builtin::Delay => {
            let n = window_arg(builtin, &args[1], 0)?;
            map_columns(frame, |c| time_series::delay(c, n))
        }
        Builtin::Delta => {
            let n = window_arg(builtin, &args[1], 0)?;
            map_columns(frame, |c| time_series::lagged(c, n, |a, b| a - b))
        }
        Builtin::Return => {
            let n = window_arg(builtin, &args[1], 1)?;
            map_columns(frame, |c| time_series::lagged(c, n, |a, b| a / b - 1.0))
        }
        _ => {
            let n = window_arg(builtin, &args[1], 1)?;
            let kernel: fn(&[f64]) -> f64 = match builtin {
                Builtin::TsSum => time_series::sum,
                Builtin::TsMean => time_series::mean,
                Builtin::TsMax => time_series::max,
                Builtin::TsMin => time_series::min,
                Builtin::StdDev => time_series::std_dev,
                Builtin::TsRank => time_series::last_rank,
                other => {
                    return Err(PanelError::Eval(format!(
                        "'{}' is not a time-series function",
                        other.name()
                    )))
                }
            };
            map_columns(frame, |c| time_series::rolling(c, n, kernel))
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::formula::functions::FunctionTable;
    use crate::core::formula::parser::parse;

    fn frame(index: Vec<Date>, symbols: &[&str], rows: Vec<Vec<Cell>>) -> FieldFrame {
        FieldFrame::from_rows(index, symbols.iter().map(|s| s.to_string()).collect(), rows).unwrap()
    }

    fn column(values: &[f64]) -> Vec<Vec<Cell>> {
        values.iter().map(|v| vec![Some(*v)]).collect()
    }

    fn run(formula: &str, ctx: &EvalContext) -> PanelResult<Evaluated> {
        let expr = parse(formula, &FunctionTable::new())?;
        evaluate(&expr, ctx)
    }

    #[test]
    fn test_scalar_broadcast_and_undefined_propagation() {
        let a = frame(vec![1, 2], &["A"], vec![vec![Some(2.0)], vec![None]]);
        let ctx = EvalContext::new(vec![1, 2]).with_variable("a", a, FieldCategory::Daily);
        let out = run("a * 2 + 1", &ctx).unwrap();
        assert_eq!(out.frame.column("A").unwrap(), &[Some(5.0), None]);
        assert_eq!(out.category, FieldCategory::Daily);
    }

    #[test]
    fn test_division_by_zero_is_undefined() {
        let a = frame(vec![1], &["A"], vec![vec![Some(1.0)]]);
        let ctx = EvalContext::new(vec![1]).with_variable("a", a, FieldCategory::Daily);
        let out = run("a / 0", &ctx).unwrap();
        assert_eq!(out.frame.column("A").unwrap(), &[None]);
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = frame(vec![1, 2], &["A"], column(&[1.0, 2.0]));
        let b = frame(vec![1], &["A"], column(&[1.0]));
        let ctx = EvalContext::new(vec![1, 2])
            .with_variable("a", a, FieldCategory::Daily)
            .with_variable("b", b, FieldCategory::Daily);
        let err = run("a + b", &ctx).unwrap_err();
        assert!(matches!(err, PanelError::Eval(_)));
    }

    #[test]
    fn test_unresolved_variable() {
        let ctx = EvalContext::new(vec![1]);
        let err = run("missing + 1", &ctx).unwrap_err();
        assert!(err.to_string().contains("missing"));
        assert!(matches!(err, PanelError::Resolution(_)));
    }

    #[test]
    fn test_if_and_comparison() {
        let a = frame(vec![1, 2, 3], &["A"], column(&[1.0, 5.0, 3.0]));
        let ctx = EvalContext::new(vec![1, 2, 3]).with_variable("a", a, FieldCategory::Daily);
        let out = run("If(a > 2, a, -1)", &ctx).unwrap();
        assert_eq!(
            out.frame.column("A").unwrap(),
            &[Some(-1.0), Some(5.0), Some(3.0)]
        );
        let out = run("IsNan(Delay(a, 1))", &ctx).unwrap();
        assert_eq!(
            out.frame.column("A").unwrap(),
            &[Some(1.0), Some(0.0), Some(0.0)]
        );
    }

    #[test]
    fn test_time_series_window() {
        let a = frame(vec![1, 2, 3, 4], &["A"], column(&[1.0, 2.0, 3.0, 4.0]));
        let ctx = EvalContext::new(vec![1, 2, 3, 4]).with_variable("a", a, FieldCategory::Daily);
        let out = run("Ts_Sum(a, 2)", &ctx).unwrap();
        assert_eq!(
            out.frame.column("A").unwrap(),
            &[None, Some(3.0), Some(5.0), Some(7.0)]
        );
        let err = run("Ts_Mean(a, 1.5)", &ctx).unwrap_err();
        assert!(matches!(err, PanelError::Eval(_)));
    }

    #[test]
    fn test_rank_within_membership() {
        let x = frame(
            vec![1],
            &["A", "B", "C"],
            vec![vec![Some(3.0), Some(1.0), Some(2.0)]],
        );
        let member = frame(
            vec![1],
            &["A", "B", "C"],
            vec![vec![Some(1.0), Some(0.0), Some(1.0)]],
        );
        let ctx = EvalContext::new(vec![1])
            .with_variable("x", x.clone(), FieldCategory::Daily)
            .with_membership(member);
        let out = run("Rank(x)", &ctx).unwrap();
        assert_eq!(out.frame.row(0), vec![Some(2.0), None, Some(1.0)]);

        let ctx = EvalContext::new(vec![1]).with_variable("x", x, FieldCategory::Daily);
        let out = run("Rank(x)", &ctx).unwrap();
        assert_eq!(out.frame.row(0), vec![Some(3.0), Some(1.0), Some(2.0)]);
    }

    #[test]
    fn test_mixed_quarterly_is_expanded() {
        let eps = frame(vec![20200331], &["A"], vec![vec![Some(2.0)]]);
        let ann = frame(vec![20200331], &["A"], vec![vec![Some(20200420.0)]]);
        let close = frame(
            vec![20200419, 20200421],
            &["A"],
            column(&[10.0, 20.0]),
        );
        let ctx = EvalContext::new(vec![20200419, 20200421])
            .with_variable("eps", eps.clone(), FieldCategory::Quarterly)
            .with_variable("close", close, FieldCategory::Daily)
            .with_ann_dates(ann);
        let out = run("close / eps", &ctx).unwrap();
        assert_eq!(out.category, FieldCategory::Daily);
        assert_eq!(out.frame.column("A").unwrap(), &[None, Some(10.0)]);

        let ctx = EvalContext::new(vec![20200419, 20200421])
            .with_variable("eps", eps, FieldCategory::Quarterly);
        let out = run("eps * 2", &ctx).unwrap();
        assert_eq!(out.category, FieldCategory::Quarterly);
        assert_eq!(out.frame.index(), &[20200331]);
    }

    #[test]
    fn test_custom_function() {
        let mut table = FunctionTable::new();
        table
            .register("Twice", Some(1), |args: &[Value]| match &args[0] {
                Value::Frame(f) => Ok(Value::Frame(f.map(|c| c.map(|v| v * 2.0)))),
                Value::Scalar(s) => Ok(Value::Scalar(s * 2.0)),
            })
            .unwrap();
        let a = frame(vec![1], &["A"], vec![vec![Some(4.0)]]);
        let ctx = EvalContext::new(vec![1]).with_variable("a", a, FieldCategory::Daily);
        let expr = parse("twice(a) + 1", &table).unwrap();
        let out = evaluate(&expr, &ctx).unwrap();
        assert_eq!(out.frame.column("A").unwrap(), &[Some(9.0)]);
    }
}
