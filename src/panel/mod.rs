//! Panel data structures
//!
//! A [`Panel`] is a rectangular table keyed by an integer date row index and a
//! composite `(symbol, field)` column key. A [`FieldFrame`] is the slice of a
//! single field: dates × symbols. Frames are what formulas read and what the
//! lifecycle manager appends.

pub mod align;
pub mod merge;

use crate::error::{PanelError, PanelResult};
use crate::types::{ColumnKey, Date};
use std::collections::{BTreeSet, HashMap};

/// A cell value; `None` is an undefined cell.
pub type Cell = Option<f64>;

/// Return the row positions of `index` that fall inside `[start, end]`.
fn row_bounds(index: &[Date], start: Option<Date>, end: Option<Date>) -> (usize, usize) {
    let lo = match start {
        Some(s) => index.partition_point(|d| *d < s),
        None => 0,
    };
    let hi = match end {
        Some(e) => index.partition_point(|d| *d <= e),
        None => index.len(),
    };
    (lo, hi.max(lo))
}

fn check_index(index: &[Date]) -> PanelResult<()> {
    if index.windows(2).any(|w| w[0] >= w[1]) {
        return Err(PanelError::Validation(
            "Row index must be strictly ascending".to_string(),
        ));
    }
    Ok(())
}

/// Position map from `from` into `to`: for each entry of `to`, the row in
/// `from` holding the same date, if any.
pub(crate) fn row_mapping(from: &[Date], to: &[Date]) -> Vec<Option<usize>> {
    to.iter().map(|d| from.binary_search(d).ok()).collect()
}

//==============================================================================
// FieldFrame
//==============================================================================

/// A single-field slice: one column per symbol over a date index.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFrame {
    index: Vec<Date>,
    symbols: Vec<String>,
    columns: Vec<Vec<Cell>>,
}

impl FieldFrame {
    /// Build a frame from one column per symbol.
    pub fn new(index: Vec<Date>, symbols: Vec<String>, columns: Vec<Vec<Cell>>) -> PanelResult<Self> {
        check_index(&index)?;
        if symbols.len() != columns.len() {
            return Err(PanelError::Validation(format!(
                "Frame has {} symbols but {} columns",
                symbols.len(),
                columns.len()
            )));
        }
        let unique: BTreeSet<&String> = symbols.iter().collect();
        if unique.len() != symbols.len() {
            return Err(PanelError::Validation(
                "Frame symbols must be unique".to_string(),
            ));
        }
        for (symbol, column) in symbols.iter().zip(&columns) {
            if column.len() != index.len() {
                return Err(PanelError::Validation(format!(
                    "Column '{}' has {} rows, expected {} rows",
                    symbol,
                    column.len(),
                    index.len()
                )));
            }
        }
        Ok(Self {
            index,
            symbols,
            columns,
        })
    }

    /// Build a frame from row-major values (`rows[i][j]` is date `i`, symbol `j`).
    pub fn from_rows(index: Vec<Date>, symbols: Vec<String>, rows: Vec<Vec<Cell>>) -> PanelResult<Self> {
        if rows.len() != index.len() {
            return Err(PanelError::Validation(format!(
                "Frame has {} dates but {} rows",
                index.len(),
                rows.len()
            )));
        }
        let mut columns = vec![Vec::with_capacity(index.len()); symbols.len()];
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != symbols.len() {
                return Err(PanelError::Validation(format!(
                    "Row {} has {} values, expected {}",
                    i,
                    row.len(),
                    symbols.len()
                )));
            }
            for (column, value) in columns.iter_mut().zip(row) {
                column.push(value);
            }
        }
        Self::new(index, symbols, columns)
    }

    /// A frame with every cell set to `value`.
    pub fn filled(index: Vec<Date>, symbols: Vec<String>, value: Cell) -> Self {
        let columns = vec![vec![value; index.len()]; symbols.len()];
        Self {
            index,
            symbols,
            columns,
        }
    }

    pub(crate) fn from_parts(index: Vec<Date>, symbols: Vec<String>, columns: Vec<Vec<Cell>>) -> Self {
        debug_assert_eq!(symbols.len(), columns.len());
        Self {
            index,
            symbols,
            columns,
        }
    }

    pub fn index(&self) -> &[Date] {
        &self.index
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn columns(&self) -> &[Vec<Cell>] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<Vec<Cell>> {
        self.columns
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// (rows, symbols)
    pub fn shape(&self) -> (usize, usize) {
        (self.index.len(), self.symbols.len())
    }

    pub fn column(&self, symbol: &str) -> Option<&[Cell]> {
        self.symbols
            .iter()
            .position(|s| s == symbol)
            .map(|i| self.columns[i].as_slice())
    }

    /// Value at a date for a symbol; undefined if either is absent.
    pub fn get(&self, date: Date, symbol: &str) -> Cell {
        let row = self.index.binary_search(&date).ok()?;
        self.column(symbol).and_then(|c| c[row])
    }

    /// Values of one row across all symbols.
    pub fn row(&self, row: usize) -> Vec<Cell> {
        self.columns.iter().map(|c| c[row]).collect()
    }

    /// Same index and same symbols in the same order.
    pub fn same_shape(&self, other: &FieldFrame) -> bool {
        self.index == other.index && self.symbols == other.symbols
    }

    /// Apply `f` to every cell.
    pub fn map<F>(&self, f: F) -> FieldFrame
    where
        F: Fn(Cell) -> Cell,
    {
        let columns = self
            .columns
            .iter()
            .map(|c| c.iter().map(|v| f(*v)).collect())
            .collect();
        FieldFrame::from_parts(self.index.clone(), self.symbols.clone(), columns)
    }

    /// Re-address the frame onto another index and symbol set; cells that
    /// have no source become undefined, extra source cells are dropped.
    pub fn reindex(&self, index: &[Date], symbols: &[String]) -> FieldFrame {
        let rows = row_mapping(&self.index, index);
        let positions: HashMap<&str, usize> = self
            .symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), i))
            .collect();
        let columns = symbols
            .iter()
            .map(|symbol| match positions.get(symbol.as_str()) {
                Some(&col) => {
                    let source = &self.columns[col];
                    rows.iter().map(|r| r.and_then(|r| source[r])).collect()
                }
                None => vec![None; index.len()],
            })
            .collect();
        FieldFrame::from_parts(index.to_vec(), symbols.to_vec(), columns)
    }

    /// Restrict to rows inside `[start, end]`.
    pub fn between(&self, start: Option<Date>, end: Option<Date>) -> FieldFrame {
        let (lo, hi) = row_bounds(&self.index, start, end);
        let columns = self.columns.iter().map(|c| c[lo..hi].to_vec()).collect();
        FieldFrame::from_parts(self.index[lo..hi].to_vec(), self.symbols.clone(), columns)
    }

    /// Count of defined cells
    pub fn count_defined(&self) -> usize {
        self.columns
            .iter()
            .map(|c| c.iter().filter(|v| v.is_some()).count())
            .sum()
    }
}

//==============================================================================
// Panel
//==============================================================================

/// Rectangular composite-keyed table.
///
/// Invariants: the row index is strictly ascending, column keys are unique
/// and sorted by `(symbol, field)`, every column has one cell per row.
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    index_name: String,
    index: Vec<Date>,
    columns: Vec<ColumnKey>,
    data: Vec<Vec<Cell>>,
}

impl Panel {
    pub fn new(
        index_name: impl Into<String>,
        index: Vec<Date>,
        columns: Vec<ColumnKey>,
        data: Vec<Vec<Cell>>,
    ) -> PanelResult<Self> {
        check_index(&index)?;
        if columns.windows(2).any(|w| w[0] >= w[1]) {
            return Err(PanelError::Validation(
                "Column keys must be unique and sorted by (symbol, field)".to_string(),
            ));
        }
        if columns.len() != data.len() {
            return Err(PanelError::Validation(format!(
                "Panel has {} column keys but {} columns",
                columns.len(),
                data.len()
            )));
        }
        for (key, column) in columns.iter().zip(&data) {
            if column.len() != index.len() {
                return Err(PanelError::Validation(format!(
                    "Column {} has {} rows, expected {} rows",
                    key,
                    column.len(),
                    index.len()
                )));
            }
        }
        Ok(Self {
            index_name: index_name.into(),
            index,
            columns,
            data,
        })
    }

    /// A panel with rows but no columns.
    pub fn empty(index_name: impl Into<String>, index: Vec<Date>) -> Self {
        Self {
            index_name: index_name.into(),
            index,
            columns: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Assemble from columns that may be in any order; the caller guarantees
    /// keys are unique.
    pub(crate) fn from_unsorted(
        index_name: String,
        index: Vec<Date>,
        columns: Vec<(ColumnKey, Vec<Cell>)>,
    ) -> Self {
        let mut columns = columns;
        columns.sort_by(|a, b| a.0.cmp(&b.0));
        let (keys, data) = columns.into_iter().unzip();
        Self {
            index_name,
            index,
            columns: keys,
            data,
        }
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn index(&self) -> &[Date] {
        &self.index
    }

    pub fn columns(&self) -> &[ColumnKey] {
        &self.columns
    }

    pub fn data(&self) -> &[Vec<Cell>] {
        &self.data
    }

    pub fn n_rows(&self) -> usize {
        self.index.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() || self.index.is_empty()
    }

    /// First and last row key
    pub fn date_range(&self) -> Option<(Date, Date)> {
        Some((*self.index.first()?, *self.index.last()?))
    }

    fn position(&self, key: &ColumnKey) -> Option<usize> {
        self.columns.binary_search(key).ok()
    }

    pub fn column(&self, key: &ColumnKey) -> Option<&[Cell]> {
        self.position(key).map(|i| self.data[i].as_slice())
    }

    pub fn get(&self, date: Date, key: &ColumnKey) -> Cell {
        let row = self.index.binary_search(&date).ok()?;
        self.column(key).and_then(|c| c[row])
    }

    /// Symbols present, in column order (sorted).
    pub fn symbols(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for key in &self.columns {
            if out.last() != Some(&key.symbol) {
                out.push(key.symbol.clone());
            }
        }
        out
    }

    /// Fields present, sorted.
    pub fn fields(&self) -> Vec<String> {
        let set: BTreeSet<&String> = self.columns.iter().map(|k| &k.field).collect();
        set.into_iter().cloned().collect()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.columns.iter().any(|k| k.field == field)
    }

    /// Whether the columns are exactly symbols × fields.
    pub fn is_rectangular(&self) -> bool {
        self.columns.len() == self.symbols().len() * self.fields().len()
    }

    /// Inclusive slice. `None` for symbols or fields means all of them.
    pub fn slice(
        &self,
        symbols: Option<&[String]>,
        fields: Option<&[String]>,
        start: Option<Date>,
        end: Option<Date>,
    ) -> Panel {
        let (lo, hi) = row_bounds(&self.index, start, end);
        let symbol_set: Option<BTreeSet<&str>> =
            symbols.map(|s| s.iter().map(String::as_str).collect());
        let field_set: Option<BTreeSet<&str>> =
            fields.map(|f| f.iter().map(String::as_str).collect());

        let mut columns = Vec::new();
        let mut data = Vec::new();
        for (key, column) in self.columns.iter().zip(&self.data) {
            let keep_symbol = symbol_set
                .as_ref()
                .map_or(true, |s| s.contains(key.symbol.as_str()));
            let keep_field = field_set
                .as_ref()
                .map_or(true, |f| f.contains(key.field.as_str()));
            if keep_symbol && keep_field {
                columns.push(key.clone());
                data.push(column[lo..hi].to_vec());
            }
        }
        Panel {
            index_name: self.index_name.clone(),
            index: self.index[lo..hi].to_vec(),
            columns,
            data,
        }
    }

    /// Extract one field as a dates × symbols frame over all panel symbols.
    /// Symbols without a column for the field get undefined cells.
    pub fn field_frame(&self, field: &str, start: Option<Date>, end: Option<Date>) -> FieldFrame {
        let (lo, hi) = row_bounds(&self.index, start, end);
        let symbols = self.symbols();
        let columns = symbols
            .iter()
            .map(|symbol| {
                let key = ColumnKey::new(symbol.clone(), field);
                match self.column(&key) {
                    Some(col) => col[lo..hi].to_vec(),
                    None => vec![None; hi - lo],
                }
            })
            .collect();
        FieldFrame::from_parts(self.index[lo..hi].to_vec(), symbols, columns)
    }

    /// Copy of the panel without any column of `field`.
    pub fn without_field(&self, field: &str) -> Panel {
        let (columns, data) = self
            .columns
            .iter()
            .zip(&self.data)
            .filter(|(k, _)| k.field != field)
            .map(|(k, c)| (k.clone(), c.clone()))
            .unzip();
        Panel {
            index_name: self.index_name.clone(),
            index: self.index.clone(),
            columns,
            data,
        }
    }

    /// Copy of the panel with `frame` added as `field`. The frame is
    /// re-addressed onto this panel's index and `symbols` first.
    pub fn with_field(&self, field: &str, frame: &FieldFrame, symbols: &[String]) -> Panel {
        let aligned = frame.reindex(&self.index, symbols);
        let mut columns: Vec<(ColumnKey, Vec<Cell>)> = self
            .columns
            .iter()
            .cloned()
            .zip(self.data.iter().cloned())
            .filter(|(k, _)| k.field != field)
            .collect();
        for (symbol, column) in aligned.symbols.into_iter().zip(aligned.columns) {
            columns.push((ColumnKey::new(symbol, field), column));
        }
        Panel::from_unsorted(self.index_name.clone(), self.index.clone(), columns)
    }

    /// Copy of the panel re-addressed onto another row index.
    pub fn reindex_rows(&self, index: &[Date]) -> Panel {
        let rows = row_mapping(&self.index, index);
        let data = self
            .data
            .iter()
            .map(|c| rows.iter().map(|r| r.and_then(|r| c[r])).collect())
            .collect();
        Panel {
            index_name: self.index_name.clone(),
            index: index.to_vec(),
            columns: self.columns.clone(),
            data,
        }
    }
}
