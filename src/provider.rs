//! Interfaces to external collaborators
//!
//! The data view never talks to the network itself. It is handed a
//! [`DataProvider`] for raw queries, a [`TradingCalendar`] and optionally an
//! [`IndexMembership`] service at construction time.

use crate::error::PanelResult;
use crate::panel::merge::LongTable;
use crate::types::{AdjustMode, Date, FieldCategory};
use std::collections::{BTreeMap, BTreeSet};

/// Fields requested from one provider api.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryGroup {
    pub source: String,
    pub category: FieldCategory,
    pub fields: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub symbols: Vec<String>,
    pub start_date: Date,
    pub end_date: Date,
    pub adjust_mode: AdjustMode,
    pub report_type: Option<String>,
    /// One group per provider api, so each api is hit once.
    pub groups: Vec<QueryGroup>,
}

impl QueryRequest {
    /// Every field of every group.
    pub fn fields(&self) -> BTreeSet<String> {
        self.groups
            .iter()
            .flat_map(|g| g.fields.iter().cloned())
            .collect()
    }
}

/// Long-format results, one table per field group. Tables may omit symbols
/// or fields the provider has no data for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResponse {
    /// Indexed by trade date.
    pub daily: Vec<LongTable>,
    /// Indexed by report date, each carrying an `ann_date` value column.
    pub quarterly: Vec<LongTable>,
}

pub trait DataProvider {
    fn query(&self, request: &QueryRequest) -> PanelResult<QueryResponse>;

    /// `api -> parameter names` catalog used for field preparation.
    fn predefined_fields(&self) -> PanelResult<BTreeMap<String, BTreeSet<String>>> {
        Ok(BTreeMap::new())
    }
}

pub trait TradingCalendar {
    /// Ordered trading dates in `[start, end]`.
    fn trading_dates(&self, start: Date, end: Date) -> PanelResult<Vec<Date>>;
}

pub trait IndexMembership {
    /// Member symbols of `index_id` on each date of `[start, end]`.
    fn members(&self, index_id: &str, start: Date, end: Date) -> PanelResult<BTreeMap<Date, BTreeSet<String>>>;
}

/// A calendar backed by a fixed list of dates.
#[derive(Debug, Clone, Default)]
pub struct StaticCalendar {
    dates: Vec<Date>,
}

impl StaticCalendar {
    pub fn new(mut dates: Vec<Date>) -> Self {
        dates.sort_unstable();
        dates.dedup();
        Self { dates }
    }
}

impl TradingCalendar for StaticCalendar {
    fn trading_dates(&self, start: Date, end: Date) -> PanelResult<Vec<Date>> {
        Ok(self
            .dates
            .iter()
            .copied()
            .filter(|d| *d >= start && *d <= end)
            .collect())
    }
}
