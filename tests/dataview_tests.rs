//! Data view population and field lifecycle against an in-memory provider.

mod common;

use common::*;
use panelview::core::{AppendOutcome, DataView, FormulaOptions};
use panelview::error::PanelError;
use panelview::panel::FieldFrame;
use panelview::types::{FieldCategory, ANN_DATE, INDEX_MEMBER, TRADE_STATUS};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;

// ═══════════════════════════════════════════════════════════════════════════
// POPULATION
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_prepare_data_builds_both_panels() {
    let (dv, provider) = prepared(&["close", "roe"]);
    assert_eq!(provider.call_count(), 1);

    let daily = dv.daily().unwrap();
    assert_eq!(daily.index(), &DATES);
    assert_eq!(daily.symbols(), vec!["A", "B", "C"]);
    assert_eq!(daily.fields(), vec![ANN_DATE, "close", "roe", TRADE_STATUS]);
    assert!(daily.is_rectangular());

    let quarterly = dv.quarterly().unwrap();
    assert_eq!(quarterly.index(), &[20190930, 20191231]);
    assert_eq!(quarterly.fields(), vec![ANN_DATE, "roe"]);
    assert!(quarterly.is_rectangular());
}

#[test]
fn test_quarterly_fields_reach_daily_panel_without_daily_rows() {
    let provider = FakeProvider::without_daily_rows();
    let mut dv = DataView::new(config(&["roe"]))
        .unwrap()
        .with_provider(provider.clone())
        .with_calendar(calendar());
    dv.prepare_data().unwrap();

    let daily = dv.daily().unwrap();
    assert_eq!(daily.index(), &DATES);
    assert_eq!(daily.symbols(), vec!["A", "B", "C"]);
    assert!(daily.is_rectangular());

    let roe = dv.get_ts("roe", None, None, None).unwrap();
    assert_eq!(
        roe.column("A").unwrap(),
        &[Some(1.0), Some(1.0), Some(2.0), Some(2.0), Some(2.0), Some(2.0)]
    );
    assert_eq!(roe.column("C").unwrap(), &[Some(5.0); 6]);

    let doubled = dv
        .add_formula("roe2", "roe * 2", FieldCategory::Daily, &FormulaOptions::default())
        .unwrap();
    assert_eq!(doubled.symbols(), ["A", "B", "C"]);
    assert_eq!(doubled.get(20200109, "B"), Some(8.0));
}

#[test]
fn test_request_groups_and_report_type() {
    let (_, provider) = prepared(&["close", "roe"]);
    let request = provider.last_request().unwrap();
    assert_eq!(request.symbols, vec!["A", "B", "C"]);
    assert_eq!(request.report_type.as_deref(), Some("408001000"));

    let fields = request.fields();
    assert!(fields.contains("close_adj"), "adjusted price requested with close");
    assert!(fields.contains(ANN_DATE));
    assert!(fields.contains(TRADE_STATUS));
}

#[test]
fn test_quarterly_values_not_visible_before_announcement() {
    let (dv, _) = prepared(&["close", "roe"]);
    let roe = dv.get_ts("roe", None, None, None).unwrap();

    // A's year-end report is announced on 20200106
    assert_eq!(
        roe.column("A").unwrap(),
        &[Some(1.0), Some(1.0), Some(2.0), Some(2.0), Some(2.0), Some(2.0)]
    );
    // B's on 20200108
    assert_eq!(
        roe.column("B").unwrap(),
        &[Some(3.0), Some(3.0), Some(3.0), Some(3.0), Some(4.0), Some(4.0)]
    );
    // C's year-end report has no announcement date and never shows
    assert_eq!(roe.column("C").unwrap(), &[Some(5.0); 6]);
}

#[test]
fn test_prepare_data_empty_calendar() {
    let mut dv = DataView::new(common::config(&["close"]).clone())
        .unwrap()
        .with_provider(FakeProvider::new())
        .with_calendar(panelview::provider::StaticCalendar::new(vec![20190102]));
    assert!(matches!(dv.prepare_data(), Err(PanelError::DataUnavailable(_))));
}

#[test]
fn test_prepare_data_provider_failure() {
    let mut dv = DataView::new(common::config(&["close", "pe"]))
        .unwrap()
        .with_provider(FakeProvider::failing_on("pe"))
        .with_calendar(calendar());
    assert!(matches!(dv.prepare_data(), Err(PanelError::Provider(_))));
    assert!(dv.daily().is_none());
}

#[test]
fn test_universe_membership_field() {
    let membership = FakeMembership::default();
    let config = panelview::config::DataViewConfig::new(20200101, 20200110)
        .with_universe(&[INDEX])
        .with_fields(&["close"]);
    let mut dv = DataView::new(config)
        .unwrap()
        .with_provider(FakeProvider::new())
        .with_calendar(calendar())
        .with_membership(membership.clone());
    dv.prepare_data().unwrap();

    assert_eq!(dv.symbols(), &["A", "B", "C"]);
    let member = dv.get_ts(INDEX_MEMBER, None, None, None).unwrap();
    assert_eq!(member.column("A").unwrap(), &[Some(1.0); 6]);
    assert_eq!(
        member.column("C").unwrap(),
        &[Some(0.0), Some(0.0), Some(0.0), Some(1.0), Some(1.0), Some(1.0)]
    );
}

#[test]
fn test_prepare_fields_registers_external_api() {
    let mut provider = FakeProvider::new();
    provider.catalog.insert(
        "lb.consensus".to_string(),
        ["symbol", "trade_date", "eps_forecast"].iter().map(|s| s.to_string()).collect(),
    );
    let mut config = common::config(&["close"]);
    config.prepare_fields = true;
    let mut dv = DataView::new(config)
        .unwrap()
        .with_provider(provider)
        .with_calendar(calendar());
    dv.prepare_data().unwrap();

    assert!(dv.registry().is_prepared());
    assert!(dv.registry().is_predefined("eps_forecast"));
}

// ═══════════════════════════════════════════════════════════════════════════
// FIELD LIFECYCLE
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_add_field_daily() {
    let (mut dv, provider) = prepared(&["close"]);
    assert!(dv.add_field("volume").unwrap());
    assert_eq!(provider.call_count(), 2);
    assert!(dv.daily().unwrap().is_rectangular());
    assert_eq!(
        dv.get_ts("volume", None, None, None).unwrap().column("B").unwrap()[1],
        Some(200.0)
    );

    // already present: no new query
    assert!(!dv.add_field("volume").unwrap());
    assert_eq!(provider.call_count(), 2);

    // nothing serves it
    assert!(!dv.add_field("not_a_field").unwrap());
    assert_eq!(provider.call_count(), 2);
}

#[test]
fn test_add_field_quarterly_starts_quarterly_panel() {
    let (mut dv, _) = prepared(&["close"]);
    assert!(dv.quarterly().is_none());

    assert!(dv.add_field("tot_assets").unwrap());
    let quarterly = dv.quarterly().unwrap();
    assert!(quarterly.has_field(ANN_DATE));
    assert!(quarterly.has_field("tot_assets"));

    let daily = dv.get_ts("tot_assets", None, None, None).unwrap();
    assert_eq!(daily.column("A").unwrap()[1], Some(100.0));
    assert_eq!(daily.column("A").unwrap()[2], Some(110.0));
    assert!(dv.daily().unwrap().has_field(ANN_DATE));
    assert!(dv.daily().unwrap().is_rectangular());
}

#[test]
fn test_add_field_quarterly_into_existing_panel() {
    let (mut dv, _) = prepared(&["close", "roe"]);
    assert!(dv.add_field("tot_assets").unwrap());
    assert_eq!(dv.quarterly().unwrap().fields(), vec![ANN_DATE, "roe", "tot_assets"]);
    let daily = dv.get_ts("tot_assets", None, None, None).unwrap();
    assert_eq!(daily.column("B").unwrap()[4], Some(210.0));
}

#[test]
fn test_add_field_quarterly_brings_new_report_dates() {
    let (mut dv, provider) = prepared(&["close", "roe"]);
    assert_eq!(dv.quarterly().unwrap().index(), &[20190930, 20191231]);

    // a report the first query did not see, roe not filed yet
    provider.publish((20200105, "A", [None, Some(120.0), Some(20200108.0)]));
    assert!(dv.add_field("tot_assets").unwrap());

    let quarterly = dv.quarterly().unwrap();
    assert_eq!(quarterly.index(), &[20190930, 20191231, 20200105]);
    assert!(quarterly.is_rectangular());

    let assets = dv.get_ts("tot_assets", None, None, None).unwrap();
    assert_eq!(
        assets.column("A").unwrap(),
        &[Some(100.0), Some(100.0), Some(110.0), Some(110.0), Some(120.0), Some(120.0)]
    );
    // the newer report has no roe, the previous value stays visible
    let roe = dv.get_ts("roe", None, None, None).unwrap();
    assert_eq!(
        roe.column("A").unwrap(),
        &[Some(1.0), Some(1.0), Some(2.0), Some(2.0), Some(2.0), Some(2.0)]
    );
    let ann = dv.get_ts(ANN_DATE, None, None, None).unwrap();
    assert_eq!(ann.get(20200109, "A"), Some(20200108.0));
    assert!(dv.daily().unwrap().is_rectangular());
}

#[test]
fn test_append_is_idempotent_without_overwrite() {
    let (mut dv, _) = prepared(&["close"]);
    let frame = FieldFrame::filled(DATES.to_vec(), vec!["A".to_string(), "B".to_string()], Some(1.0));

    assert_eq!(
        dv.append_df(&frame, "flag", FieldCategory::Daily, false).unwrap(),
        AppendOutcome::Added
    );
    let once = dv.state().clone();
    assert_eq!(
        dv.append_df(&frame, "flag", FieldCategory::Daily, false).unwrap(),
        AppendOutcome::Skipped
    );
    assert_eq!(dv.state(), &once);

    // C is missing from the frame and gets undefined cells
    let flag = dv.get_ts("flag", None, None, None).unwrap();
    assert_eq!(flag.column("C").unwrap(), &[None::<f64>; 6]);
    assert!(dv.daily().unwrap().is_rectangular());
}

#[test]
fn test_append_quarter_requires_quarterly_panel() {
    let (mut dv, _) = prepared(&["close"]);
    let frame = FieldFrame::filled(vec![20191231], vec!["A".to_string()], Some(1.0));
    let before = dv.state().clone();
    assert!(matches!(
        dv.append_df_quarter(&frame, "q", false),
        Err(PanelError::MissingPanel(FieldCategory::Quarterly))
    ));
    assert_eq!(dv.state(), &before);
}

#[test]
fn test_remove_field_from_both_panels() {
    let (mut dv, _) = prepared(&["close", "roe"]);
    assert!(dv.remove_field("roe"));
    assert!(!dv.daily().unwrap().has_field("roe"));
    assert!(!dv.quarterly().unwrap().has_field("roe"));
    assert!(!dv.remove_field("roe"));
}

// ═══════════════════════════════════════════════════════════════════════════
// FORMULAS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_formula_fetches_missing_variable() {
    let (mut dv, provider) = prepared(&["close"]);
    let result = dv
        .add_formula("vpc", "volume / close", FieldCategory::Daily, &FormulaOptions::default())
        .unwrap();
    assert_eq!(provider.call_count(), 2);
    assert!(dv.has_field("volume"));
    // A: volume 100, close 10 on the first date
    assert_eq!(result.column("A").unwrap()[0], Some(10.0));
    assert!(!dv.has_field("vpc"));
}

#[test]
fn test_formula_provider_failure_propagates() {
    let provider = FakeProvider::failing_on("pe");
    let mut dv = DataView::new(common::config(&["close"]))
        .unwrap()
        .with_provider(provider)
        .with_calendar(calendar());
    dv.prepare_data().unwrap();
    let err = dv
        .add_formula("x", "pe * 2", FieldCategory::Daily, &FormulaOptions::default())
        .unwrap_err();
    assert!(matches!(err, PanelError::Provider(_)));
}

#[test]
fn test_formula_unknown_variable() {
    let (mut dv, _) = prepared(&["close"]);
    let err = dv
        .add_formula("x", "close + nothing_here", FieldCategory::Daily, &FormulaOptions::default())
        .unwrap_err();
    assert!(matches!(err, PanelError::Resolution(ref m) if m.contains("nothing_here")));
}

#[test]
fn test_quarterly_formula_expanded_and_persisted() {
    let (mut dv, _) = prepared(&["close", "roe"]);
    let result = dv
        .add_formula("roe2", "roe * 2", FieldCategory::Quarterly, &FormulaOptions::persisted())
        .unwrap();

    // returned on the daily calendar
    assert_eq!(result.index(), &DATES);
    assert_eq!(
        result.column("A").unwrap(),
        &[Some(2.0), Some(2.0), Some(4.0), Some(4.0), Some(4.0), Some(4.0)]
    );

    let quarterly = dv.get_ts_quarter("roe2", None, None).unwrap();
    assert_eq!(quarterly.column("B").unwrap(), &[Some(6.0), Some(8.0)]);
    assert_eq!(dv.get_ts("roe2", None, None, None).unwrap(), result);
    assert_eq!(dv.registry().classify("roe2"), panelview::types::FieldClass::Quarterly);
}

#[test]
fn test_quarterly_time_series_runs_on_report_dates() {
    let (mut dv, _) = prepared(&["close", "roe"]);
    let result = dv
        .add_formula("roe_chg", "roe - Delay(roe, 1)", FieldCategory::Quarterly, &FormulaOptions::default())
        .unwrap();
    // A: 2 - 1 once the year-end report is public, undefined before
    assert_eq!(
        result.column("A").unwrap(),
        &[None, None, Some(1.0), Some(1.0), Some(1.0), Some(1.0)]
    );
}

#[test]
fn test_mixed_formula_is_daily() {
    let (mut dv, _) = prepared(&["close", "roe"]);
    let result = dv
        .add_formula("cr", "close * roe", FieldCategory::Quarterly, &FormulaOptions::persisted())
        .unwrap();
    // B close is 20 throughout, roe 3 then 4 from 20200108
    assert_eq!(result.column("B").unwrap()[0], Some(60.0));
    assert_eq!(result.column("B").unwrap()[5], Some(80.0));
    assert!(!dv.quarterly().unwrap().has_field("cr"));
    assert!(dv.daily().unwrap().has_field("cr"));
}

#[test]
fn test_cross_section_respects_membership() {
    let config = panelview::config::DataViewConfig::new(20200101, 20200110)
        .with_universe(&[INDEX])
        .with_fields(&["close"]);
    let mut dv = DataView::new(config)
        .unwrap()
        .with_provider(FakeProvider::new())
        .with_calendar(calendar())
        .with_membership(FakeMembership::default());
    dv.prepare_data().unwrap();

    let ranked = dv
        .add_formula("r", "Rank(close)", FieldCategory::Daily, &FormulaOptions::default())
        .unwrap();
    // C joins the index on 20200107
    assert_eq!(ranked.column("C").unwrap()[0], None);
    assert_eq!(ranked.column("C").unwrap()[3], Some(3.0));
    assert_eq!(ranked.column("A").unwrap()[0], Some(1.0));

    let unscoped = dv
        .add_formula(
            "r",
            "Rank(close)",
            FieldCategory::Daily,
            &FormulaOptions {
                within_index: false,
                ..FormulaOptions::default()
            },
        )
        .unwrap();
    assert_eq!(unscoped.column("C").unwrap()[0], Some(3.0));
}

#[test]
fn test_membership_cache() {
    let membership = FakeMembership::default();
    let mut config = panelview::config::DataViewConfig::new(20200101, 20200110)
        .with_universe(&[INDEX])
        .with_fields(&["close"]);
    config.cache_index_membership = true;
    let mut dv = DataView::new(config)
        .unwrap()
        .with_provider(FakeProvider::new())
        .with_calendar(calendar())
        .with_membership(membership.clone());
    dv.prepare_data().unwrap();
    let after_prepare = membership.call_count();

    for _ in 0..3 {
        dv.add_formula("r", "Rank(close)", FieldCategory::Daily, &FormulaOptions::default())
            .unwrap();
    }
    assert_eq!(membership.call_count(), after_prepare);
}

#[test]
fn test_add_formulas_batch() {
    let (mut dv, _) = prepared(&["close"]);
    let results: BTreeMap<String, FieldFrame> = dv
        .add_formulas(
            &[("b", "a + 1"), ("a", "close * 2")],
            FieldCategory::Daily,
            &FormulaOptions::default(),
        )
        .unwrap();
    assert_eq!(results["b"].column("A").unwrap()[0], Some(21.0));
    assert!(dv.has_field("a"));
}

#[test]
fn test_slice_keeps_quarterly_history() {
    let (dv, _) = prepared(&["close", "roe"]);
    let sliced = dv.slice(20200106, 20200108).unwrap();
    assert_eq!(sliced.dates(), &[20200106, 20200107, 20200108]);
    assert_eq!(sliced.quarterly(), dv.quarterly());
    assert_eq!(
        sliced.get_ts("roe", None, None, None).unwrap().column("B").unwrap(),
        &[Some(3.0), Some(3.0), Some(4.0)]
    );
}
