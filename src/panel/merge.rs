//! Panel merge engine
//!
//! Turns long-format provider results into wide composite-keyed panels and
//! concatenates several of them into one.

use super::{row_mapping, Cell, Panel};
use crate::error::{PanelError, PanelResult};
use crate::types::{ColumnKey, Date};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, warn};

/// One long-format row: a date, a symbol and one value per field.
#[derive(Debug, Clone, PartialEq)]
pub struct LongRow {
    pub date: Date,
    pub symbol: String,
    pub values: Vec<Cell>,
}

/// Long-format query result for one field group.
#[derive(Debug, Clone, PartialEq)]
pub struct LongTable {
    index_name: String,
    fields: Vec<String>,
    rows: Vec<LongRow>,
}

impl LongTable {
    pub fn new(index_name: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            index_name: index_name.into(),
            fields,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, date: Date, symbol: impl Into<String>, values: Vec<Cell>) -> PanelResult<()> {
        if values.len() != self.fields.len() {
            return Err(PanelError::Validation(format!(
                "Row has {} values but table declares {} fields",
                values.len(),
                self.fields.len()
            )));
        }
        self.rows.push(LongRow {
            date,
            symbol: symbol.into(),
            values,
        });
        Ok(())
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn rows(&self) -> &[LongRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn symbols(&self) -> BTreeSet<String> {
        self.rows.iter().map(|r| r.symbol.clone()).collect()
    }

    pub fn dates(&self) -> Vec<Date> {
        let set: BTreeSet<Date> = self.rows.iter().map(|r| r.date).collect();
        set.into_iter().collect()
    }

    /// Keep only the named fields (in the given order); unknown names are ignored.
    pub fn select_fields(&self, fields: &[String]) -> LongTable {
        let positions: Vec<usize> = fields
            .iter()
            .filter_map(|f| self.fields.iter().position(|x| x == f))
            .collect();
        LongTable {
            index_name: self.index_name.clone(),
            fields: positions.iter().map(|&i| self.fields[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|r| LongRow {
                    date: r.date,
                    symbol: r.symbol.clone(),
                    values: positions.iter().map(|&i| r.values[i]).collect(),
                })
                .collect(),
        }
    }
}

/// Pivot a long table: dates become rows, `(symbol, field)` become columns.
///
/// Only symbols that appear in the table get columns. Two rows for the same
/// `(date, symbol)` are rejected.
pub fn pivot(table: &LongTable) -> PanelResult<Panel> {
    let index = table.dates();
    let mut columns: BTreeMap<ColumnKey, Vec<Cell>> = BTreeMap::new();
    let mut seen: HashSet<(Date, &str)> = HashSet::new();

    for row in &table.rows {
        if !seen.insert((row.date, row.symbol.as_str())) {
            return Err(PanelError::Validation(format!(
                "Duplicate entries for symbol '{}' at {} {}",
                row.symbol, table.index_name, row.date
            )));
        }
        // index is the sorted set of row dates, so the lookup always succeeds
        let Ok(pos) = index.binary_search(&row.date) else {
            continue;
        };
        for (field, value) in table.fields.iter().zip(&row.values) {
            let column = columns
                .entry(ColumnKey::new(row.symbol.clone(), field.clone()))
                .or_insert_with(|| vec![None; index.len()]);
            column[pos] = *value;
        }
    }

    let (keys, data): (Vec<ColumnKey>, Vec<Vec<Cell>>) = columns.into_iter().unzip();
    Panel::new(table.index_name.clone(), index, keys, data)
}

/// Merge wide panels into one.
///
/// All inputs must share `index_name`. Columns are concatenated onto the
/// sorted union of the row indices; when a composite key appears more than
/// once the first occurrence wins and later ones are silently dropped.
/// Columns are sorted by `(symbol, field)` afterwards. Returns `None` for an
/// empty input list.
pub fn merge(panels: &[Panel], index_name: &str) -> PanelResult<Option<Panel>> {
    if panels.is_empty() {
        return Ok(None);
    }
    if let Some(bad) = panels.iter().find(|p| p.index_name() != index_name) {
        return Err(PanelError::Validation(format!(
            "Row index name mismatch: expected '{}', found '{}'",
            index_name,
            bad.index_name()
        )));
    }

    let union: BTreeSet<Date> = panels.iter().flat_map(|p| p.index().iter().copied()).collect();
    let union: Vec<Date> = union.into_iter().collect();

    // Each input is re-addressed independently; collect keeps input order.
    let blocks: Vec<Vec<(ColumnKey, Vec<Cell>)>> = panels
        .par_iter()
        .map(|panel| {
            let rows = row_mapping(panel.index(), &union);
            panel
                .columns()
                .iter()
                .zip(panel.data())
                .map(|(key, column)| {
                    let values = rows.iter().map(|r| r.and_then(|r| column[r])).collect();
                    (key.clone(), values)
                })
                .collect()
        })
        .collect();

    let mut seen: HashSet<ColumnKey> = HashSet::new();
    let mut columns = Vec::new();
    let mut dropped = 0usize;
    for (key, values) in blocks.into_iter().flatten() {
        if seen.contains(&key) {
            dropped += 1;
            continue;
        }
        seen.insert(key.clone());
        columns.push((key, values));
    }
    if dropped > 0 {
        debug!(dropped, "duplicated columns found during merge, later ones dropped");
    }

    Ok(Some(Panel::from_unsorted(index_name.to_string(), union, columns)))
}

/// Symbols requested but absent from the panel's columns.
pub fn missing_symbols(panel: &Panel, symbols: &[String]) -> Vec<String> {
    let present: BTreeSet<String> = panel.symbols().into_iter().collect();
    let wanted: BTreeSet<&String> = symbols.iter().collect();
    wanted
        .into_iter()
        .filter(|s| !present.contains(*s))
        .cloned()
        .collect()
}

/// Reconcile a merged panel onto the full `symbols × fields` cross product
/// and, when given, onto `index` (e.g. the trading calendar).
///
/// Cells that were never returned become undefined and the symbols with no
/// data at all are reported. A panel already in shape is returned untouched.
pub fn fill_missing_idx_col(panel: Panel, index: Option<&[Date]>, symbols: &[String]) -> Panel {
    let target_index: Vec<Date> = match index {
        Some(idx) => idx.to_vec(),
        None => panel.index().to_vec(),
    };
    let fields = panel.fields();
    let symbol_set: BTreeSet<&String> = symbols.iter().collect();

    if fields.len() * symbol_set.len() == panel.n_columns()
        && panel.symbols().len() == symbol_set.len()
        && target_index.as_slice() == panel.index()
    {
        return panel;
    }

    let missing = missing_symbols(&panel, symbols);
    let rows = row_mapping(panel.index(), &target_index);
    let mut columns = Vec::with_capacity(symbol_set.len() * fields.len());
    for symbol in &symbol_set {
        for field in &fields {
            let key = ColumnKey::new((*symbol).clone(), field.clone());
            let values = match panel.column(&key) {
                Some(source) => rows.iter().map(|r| r.and_then(|r| source[r])).collect(),
                None => vec![None; target_index.len()],
            };
            columns.push((key, values));
        }
    }

    if !missing.is_empty() {
        warn!(
            symbols = %missing.join(", "),
            "some data is unavailable, cells left undefined"
        );
    }

    Panel::from_unsorted(panel.index_name().to_string(), target_index, columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table(index_name: &str, fields: &[&str], rows: &[(Date, &str, Vec<Cell>)]) -> LongTable {
        let mut t = LongTable::new(index_name, fields.iter().map(|s| s.to_string()).collect());
        for (date, symbol, values) in rows {
            t.push_row(*date, *symbol, values.clone()).unwrap();
        }
        t
    }

    #[test]
    fn test_pivot_builds_composite_columns() {
        let t = table(
            "trade_date",
            &["close", "open"],
            &[
                (20200103, "B", vec![Some(2.0), Some(1.5)]),
                (20200102, "A", vec![Some(1.0), Some(0.5)]),
                (20200103, "A", vec![Some(1.1), None]),
            ],
        );
        let panel = pivot(&t).unwrap();
        assert_eq!(panel.index(), &[20200102, 20200103]);
        assert_eq!(
            panel.columns(),
            &[
                ColumnKey::new("A", "close"),
                ColumnKey::new("A", "open"),
                ColumnKey::new("B", "close"),
                ColumnKey::new("B", "open"),
            ]
        );
        assert_eq!(panel.column(&ColumnKey::new("B", "close")).unwrap(), &[None, Some(2.0)]);
        assert_eq!(panel.column(&ColumnKey::new("A", "open")).unwrap(), &[Some(0.5), None]);
    }

    #[test]
    fn test_pivot_rejects_duplicate_rows() {
        let t = table(
            "trade_date",
            &["close"],
            &[(20200102, "A", vec![Some(1.0)]), (20200102, "A", vec![Some(2.0)])],
        );
        assert!(pivot(&t).is_err());
    }

    #[test]
    fn test_merge_drops_later_duplicates() {
        let t1 = pivot(&table("trade_date", &["F1"], &[(1, "S1", vec![Some(1.0)])])).unwrap();
        let t2 = pivot(&table(
            "trade_date",
            &["F1"],
            &[(1, "S1", vec![Some(9.0)]), (1, "S2", vec![Some(2.0)])],
        ))
        .unwrap();
        let merged = merge(&[t1, t2], "trade_date").unwrap().unwrap();
        assert_eq!(
            merged.columns(),
            &[ColumnKey::new("S1", "F1"), ColumnKey::new("S2", "F1")]
        );
        assert_eq!(merged.get(1, &ColumnKey::new("S1", "F1")), Some(1.0));
    }

    #[test]
    fn test_merge_unions_row_index() {
        let t1 = pivot(&table("trade_date", &["a"], &[(2, "S", vec![Some(2.0)])])).unwrap();
        let t2 = pivot(&table("trade_date", &["b"], &[(1, "S", vec![Some(1.0)]), (3, "S", vec![Some(3.0)])]))
            .unwrap();
        let merged = merge(&[t1, t2], "trade_date").unwrap().unwrap();
        assert_eq!(merged.index(), &[1, 2, 3]);
        assert_eq!(merged.column(&ColumnKey::new("S", "a")).unwrap(), &[None, Some(2.0), None]);
    }

    #[test]
    fn test_merge_index_name_mismatch() {
        let t1 = pivot(&table("trade_date", &["a"], &[(1, "S", vec![Some(1.0)])])).unwrap();
        let t2 = pivot(&table("report_date", &["b"], &[(1, "S", vec![Some(1.0)])])).unwrap();
        assert!(merge(&[t1, t2], "trade_date").is_err());
    }

    #[test]
    fn test_merge_empty_input() {
        assert!(merge(&[], "trade_date").unwrap().is_none());
    }

    #[test]
    fn test_fill_missing_idx_col_reindexes() {
        let t = pivot(&table(
            "trade_date",
            &["close", "open"],
            &[(20200102, "A", vec![Some(1.0), Some(0.9)]), (20200104, "A", vec![Some(1.2), None])],
        ))
        .unwrap();
        let symbols = vec!["A".to_string(), "B".to_string()];
        let calendar = [20200102, 20200103];
        let filled = fill_missing_idx_col(t, Some(&calendar), &symbols);
        assert_eq!(filled.index(), &calendar);
        assert_eq!(filled.n_columns(), 4);
        assert!(filled.is_rectangular());
        assert_eq!(filled.column(&ColumnKey::new("B", "open")).unwrap(), &[None, None]);
        assert_eq!(filled.column(&ColumnKey::new("A", "close")).unwrap(), &[Some(1.0), None]);
    }

    #[test]
    fn test_fill_missing_idx_col_noop_when_complete() {
        let t = pivot(&table("trade_date", &["x"], &[(1, "A", vec![Some(1.0)])])).unwrap();
        let before = t.clone();
        let after = fill_missing_idx_col(t, None, &["A".to_string()]);
        assert_eq!(before, after);
    }

    #[test]
    fn test_select_fields() {
        let t = table("trade_date", &["a", "b"], &[(1, "S", vec![Some(1.0), Some(2.0)])]);
        let b = t.select_fields(&["b".to_string(), "zzz".to_string()]);
        assert_eq!(b.fields(), &["b".to_string()]);
        assert_eq!(b.rows()[0].values, vec![Some(2.0)]);
    }
}
