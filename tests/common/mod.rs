//! In-memory collaborators shared by the integration tests.
#![allow(dead_code)]

use panelview::config::DataViewConfig;
use panelview::core::DataView;
use panelview::error::{PanelError, PanelResult};
use panelview::panel::merge::LongTable;
use panelview::provider::{DataProvider, IndexMembership, QueryRequest, QueryResponse, StaticCalendar};
use panelview::types::{Date, FieldCategory, ANN_DATE, REPORT_DATE, TRADE_DATE};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const DATES: [Date; 6] = [20200102, 20200103, 20200106, 20200107, 20200108, 20200109];
pub const SYMBOLS: [&str; 3] = ["A", "B", "C"];
pub const INDEX: &str = "000300.SH";

pub const DAILY_FIELDS: [&str; 5] = ["close", "open", "volume", "trade_status", "pe"];
pub const QUARTERLY_FIELDS: [&str; 3] = ["roe", "tot_assets", ANN_DATE];

fn daily_value(field: &str, symbol: usize, row: usize) -> f64 {
    let base = 10.0 * (symbol as f64 + 1.0);
    match field {
        "close" => base + row as f64 * (symbol as f64 - 1.0),
        "open" => base,
        "volume" => 100.0 * (row as f64 + 1.0),
        "trade_status" => 1.0,
        _ => symbol as f64 + 0.5,
    }
}

/// One quarterly record: report date, symbol, then roe, tot_assets, ann_date.
pub type ReportRow = (Date, &'static str, [Option<f64>; 3]);

/// C's year-end report is not announced yet.
fn quarterly_rows() -> Vec<ReportRow> {
    vec![
        (20190930, "A", [Some(1.0), Some(100.0), Some(20191025.0)]),
        (20191231, "A", [Some(2.0), Some(110.0), Some(20200106.0)]),
        (20190930, "B", [Some(3.0), Some(200.0), Some(20191030.0)]),
        (20191231, "B", [Some(4.0), Some(210.0), Some(20200108.0)]),
        (20190930, "C", [Some(5.0), Some(300.0), Some(20191028.0)]),
        (20191231, "C", [Some(6.0), Some(310.0), None]),
    ]
}

/// Serves [`DAILY_FIELDS`] and [`QUARTERLY_FIELDS`] for [`SYMBOLS`].
#[derive(Clone, Default)]
pub struct FakeProvider {
    pub calls: Arc<AtomicUsize>,
    pub requests: Arc<Mutex<Vec<QueryRequest>>>,
    /// Any request touching this field fails.
    pub fail_on: Option<String>,
    pub catalog: BTreeMap<String, BTreeSet<String>>,
    /// Daily tables come back without rows.
    pub empty_daily: bool,
    /// Reports served on top of the fixed ones, see [`FakeProvider::publish`].
    pub late_reports: Arc<Mutex<Vec<ReportRow>>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(field: &str) -> Self {
        Self {
            fail_on: Some(field.to_string()),
            ..Self::default()
        }
    }

    pub fn without_daily_rows() -> Self {
        Self {
            empty_daily: true,
            ..Self::default()
        }
    }

    /// Serve `row` from the next query on.
    pub fn publish(&self, row: ReportRow) {
        self.late_reports.lock().unwrap().push(row);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<QueryRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

impl DataProvider for FakeProvider {
    fn query(&self, request: &QueryRequest) -> PanelResult<QueryResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if let Some(field) = &self.fail_on {
            if request.fields().contains(field) {
                return Err(PanelError::Provider(format!("upstream timeout for {}", field)));
            }
        }

        let mut response = QueryResponse::default();
        for group in &request.groups {
            match group.category {
                FieldCategory::Daily => {
                    let fields: Vec<String> = group
                        .fields
                        .iter()
                        .filter(|f| DAILY_FIELDS.contains(&f.as_str()))
                        .cloned()
                        .collect();
                    let mut table = LongTable::new(TRADE_DATE, fields.clone());
                    for (s, symbol) in SYMBOLS.iter().enumerate() {
                        if self.empty_daily || !request.symbols.iter().any(|r| r == symbol) {
                            continue;
                        }
                        for (row, date) in DATES.iter().enumerate() {
                            if *date < request.start_date || *date > request.end_date {
                                continue;
                            }
                            let values = fields.iter().map(|f| Some(daily_value(f, s, row))).collect();
                            table.push_row(*date, *symbol, values)?;
                        }
                    }
                    response.daily.push(table);
                }
                FieldCategory::Quarterly => {
                    let fields: Vec<String> = group
                        .fields
                        .iter()
                        .filter(|f| QUARTERLY_FIELDS.contains(&f.as_str()))
                        .cloned()
                        .collect();
                    let mut table = LongTable::new(REPORT_DATE, fields.clone());
                    let late = self.late_reports.lock().unwrap().clone();
                    for (report, symbol, values) in quarterly_rows().into_iter().chain(late) {
                        if !request.symbols.iter().any(|r| r == symbol) {
                            continue;
                        }
                        let picked = fields
                            .iter()
                            .map(|f| {
                                let i = QUARTERLY_FIELDS.iter().position(|q| q == f).unwrap();
                                values[i]
                            })
                            .collect();
                        table.push_row(report, symbol, picked)?;
                    }
                    response.quarterly.push(table);
                }
            }
        }
        Ok(response)
    }

    fn predefined_fields(&self) -> PanelResult<BTreeMap<String, BTreeSet<String>>> {
        Ok(self.catalog.clone())
    }
}

/// Members of [`INDEX`]: A and B throughout, C from 20200107.
#[derive(Clone, Default)]
pub struct FakeMembership {
    pub calls: Arc<AtomicUsize>,
}

impl FakeMembership {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl IndexMembership for FakeMembership {
    fn members(&self, index_id: &str, start: Date, end: Date) -> PanelResult<BTreeMap<Date, BTreeSet<String>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if index_id != INDEX {
            return Err(PanelError::Provider(format!("unknown index {}", index_id)));
        }
        Ok(DATES
            .iter()
            .filter(|d| **d >= start && **d <= end)
            .map(|d| {
                let mut members: BTreeSet<String> = ["A", "B"].iter().map(|s| s.to_string()).collect();
                if *d >= 20200107 {
                    members.insert("C".to_string());
                }
                (*d, members)
            })
            .collect())
    }
}

pub fn calendar() -> StaticCalendar {
    StaticCalendar::new(DATES.to_vec())
}

pub fn config(fields: &[&str]) -> DataViewConfig {
    DataViewConfig::new(20200101, 20200110)
        .with_symbols(&SYMBOLS)
        .with_fields(fields)
}

/// A prepared data view over all symbols with `fields`.
pub fn prepared(fields: &[&str]) -> (DataView, FakeProvider) {
    let provider = FakeProvider::new();
    let mut dv = DataView::new(config(fields))
        .unwrap()
        .with_provider(provider.clone())
        .with_calendar(calendar());
    dv.prepare_data().unwrap();
    (dv, provider)
}
