//! Quarterly-to-daily alignment
//!
//! Expands report-date indexed values onto the trading calendar so that on
//! every trading date a symbol shows its latest announced value. Nothing is
//! visible before its announcement date.

use super::{Cell, FieldFrame, Panel};
use crate::error::{PanelError, PanelResult};
use crate::types::{Date, ANN_DATE};
use tracing::warn;

/// Expand `values` (rows = report dates) onto `trading_dates`.
///
/// `ann_dates` carries the announcement date of each report as a
/// `YYYYMMDD` number; it is re-addressed onto the index and symbols of
/// `values`, so a missing announcement makes that report never visible.
/// A report announced before its own report date is never visible either.
/// On each trading date the value of the most recent announced report is
/// shown; an undefined cell there falls back to the closest earlier
/// announced report that has one. Each symbol is processed on its own
/// announcement schedule.
pub fn align(values: &FieldFrame, ann_dates: &FieldFrame, trading_dates: &[Date]) -> PanelResult<FieldFrame> {
    if trading_dates.windows(2).any(|w| w[0] >= w[1]) {
        return Err(PanelError::Validation(
            "Trading calendar must be strictly ascending".to_string(),
        ));
    }
    let ann = ann_dates.reindex(values.index(), values.symbols());

    let columns = values
        .symbols()
        .iter()
        .zip(values.columns())
        .zip(ann.columns())
        .map(|((symbol, column), ann_column)| {
            let events = announcements(symbol, values.index(), ann_column);
            expand_column(column, &events, trading_dates)
        })
        .collect();

    Ok(FieldFrame::from_parts(
        trading_dates.to_vec(),
        values.symbols().to_vec(),
        columns,
    ))
}

/// `(announcement date, report row)` pairs sorted by announcement date.
/// Rows without a usable announcement are left out.
fn announcements(symbol: &str, report_dates: &[Date], ann_column: &[Cell]) -> Vec<(Date, usize)> {
    let mut events: Vec<(Date, usize)> = ann_column
        .iter()
        .zip(report_dates)
        .enumerate()
        .filter_map(|(row, (ann, &report))| {
            let ann = ann.filter(|a| a.is_finite())? as Date;
            if ann < report {
                warn!(
                    symbol,
                    report_date = report,
                    ann_date = ann,
                    "announced before its report date, row ignored"
                );
                return None;
            }
            Some((ann, row))
        })
        .collect();
    events.sort_unstable();
    events
}

/// Forward-fill one symbol keyed by announcement date.
fn expand_column(column: &[Cell], events: &[(Date, usize)], trading_dates: &[Date]) -> Vec<Cell> {
    let mut out = Vec::with_capacity(trading_dates.len());
    let mut cursor = 0;
    // latest visible report row holding a value
    let mut latest: Option<usize> = None;
    for &date in trading_dates {
        while cursor < events.len() && events[cursor].0 <= date {
            let row = events[cursor].1;
            if column[row].is_some() {
                latest = Some(latest.map_or(row, |l| l.max(row)));
            }
            cursor += 1;
        }
        out.push(latest.and_then(|row| column[row]));
    }
    out
}

/// Expand every field of a quarterly panel onto the trading calendar using
/// its `ann_date` field. Returns `(field, expanded frame)` pairs in field
/// order; the announcement date itself is expanded too.
pub fn expand_quarterly(quarterly: &Panel, trading_dates: &[Date]) -> PanelResult<Vec<(String, FieldFrame)>> {
    if !quarterly.has_field(ANN_DATE) {
        return Err(PanelError::DataUnavailable(format!(
            "Quarterly panel has no '{}' field, cannot align to daily",
            ANN_DATE
        )));
    }
    let ann = quarterly.field_frame(ANN_DATE, None, None);
    quarterly
        .fields()
        .into_iter()
        .map(|field| {
            let frame = quarterly.field_frame(&field, None, None);
            align(&frame, &ann, trading_dates).map(|expanded| (field, expanded))
        })
        .collect()
}
