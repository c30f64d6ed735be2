//! Field registry
//!
//! Classifies field names into daily or quarterly, knows which provider api
//! serves each fetchable field and tracks user-declared custom fields.

use crate::error::{PanelError, PanelResult};
use crate::types::{
    AdjustMode, FieldCategory, FieldClass, FieldDescriptor, FieldSource, ANN_DATE, REPORT_DATE,
    TRADE_DATE,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Price fields that come in raw/adjusted pairs.
pub const PRICE_FIELDS: [&str; 5] = ["open", "high", "low", "close", "vwap"];

const ADJ_SUFFIX: &str = "_adj";

/// Predefined field groups of the built-in catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldGroup {
    MarketDaily,
    RefDaily,
    Income,
    BalanceSheet,
    CashFlow,
    FinIndicator,
    Group,
    AdjFactor,
}

impl FieldGroup {
    pub const ALL: [FieldGroup; 8] = [
        FieldGroup::MarketDaily,
        FieldGroup::RefDaily,
        FieldGroup::Income,
        FieldGroup::BalanceSheet,
        FieldGroup::CashFlow,
        FieldGroup::FinIndicator,
        FieldGroup::Group,
        FieldGroup::AdjFactor,
    ];

    /// Provider api serving the group.
    pub fn api(self) -> &'static str {
        match self {
            FieldGroup::MarketDaily => "daily",
            FieldGroup::RefDaily => "lb.secDailyIndicator",
            FieldGroup::Income => "lb.income",
            FieldGroup::BalanceSheet => "lb.balanceSheet",
            FieldGroup::CashFlow => "lb.cashFlow",
            FieldGroup::FinIndicator => "lb.finIndicator",
            FieldGroup::Group => "lb.secIndustry",
            FieldGroup::AdjFactor => "lb.secAdjFactor",
        }
    }

    pub fn from_api(api: &str) -> Option<FieldGroup> {
        FieldGroup::ALL.into_iter().find(|g| g.api() == api)
    }

    pub fn category(self) -> FieldCategory {
        match self {
            FieldGroup::Income
            | FieldGroup::BalanceSheet
            | FieldGroup::CashFlow
            | FieldGroup::FinIndicator => FieldCategory::Quarterly,
            _ => FieldCategory::Daily,
        }
    }

    fn default_fields(self) -> &'static [&'static str] {
        match self {
            FieldGroup::MarketDaily => &[
                "open", "high", "low", "close", "vwap", "open_adj", "high_adj", "low_adj",
                "close_adj", "vwap_adj", "volume", "turnover", "trade_status", "oi", "settle",
            ],
            FieldGroup::RefDaily => &[
                "total_mv", "float_mv", "pe", "pe_ttm", "pb", "ps", "ps_ttm", "pcf_ocf",
                "turnover_ratio", "free_turnover_ratio", "total_share", "float_share",
            ],
            FieldGroup::Income => &[
                "total_oper_rev", "oper_rev", "oper_profit", "tot_profit",
                "net_profit_incl_min_int_inc", "net_profit_excl_min_int_inc", "less_oper_cost",
            ],
            FieldGroup::BalanceSheet => &[
                "tot_assets", "tot_liab", "tot_shrhldr_eqy_excl_min_int", "monetary_cap",
                "tot_cur_assets", "tot_cur_liab",
            ],
            FieldGroup::CashFlow => &[
                "net_cash_flows_oper_act", "net_cash_flows_inv_act", "net_cash_flows_fnc_act",
                "cash_recp_sg_and_rs",
            ],
            FieldGroup::FinIndicator => &[
                "roe", "roa", "eps_basic", "bps", "grossprofit_margin", "netprofit_margin",
            ],
            FieldGroup::Group => &["sw1", "sw2", "sw3", "sw4", "zz1", "zz2"],
            FieldGroup::AdjFactor => &["adjust_factor"],
        }
    }
}

/// An api of the provider catalog is quarterly when it is keyed by
/// announcement date, report date and symbol.
fn is_quarterly_api(params: &BTreeSet<String>) -> bool {
    [ANN_DATE, REPORT_DATE, "symbol"]
        .iter()
        .all(|p| params.contains(*p))
}

/// Serializable view of the user-declared part of the registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub custom_daily: BTreeSet<String>,
    pub custom_quarterly: BTreeSet<String>,
    pub external: BTreeMap<String, ExternalField>,
    pub prepared: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalField {
    pub source: String,
    pub category: FieldCategory,
}

#[derive(Debug, Clone)]
pub struct FieldRegistry {
    groups: BTreeMap<FieldGroup, BTreeSet<String>>,
    custom_daily: BTreeSet<String>,
    custom_quarterly: BTreeSet<String>,
    external: BTreeMap<String, ExternalField>,
    prepared: bool,
}

impl Default for FieldRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldRegistry {
    /// Registry with the built-in catalog.
    pub fn new() -> Self {
        let groups = FieldGroup::ALL
            .into_iter()
            .map(|g| (g, g.default_fields().iter().map(|s| s.to_string()).collect()))
            .collect();
        Self {
            groups,
            custom_daily: BTreeSet::new(),
            custom_quarterly: BTreeSet::new(),
            external: BTreeMap::new(),
            prepared: false,
        }
    }

    /// Registry with no catalog at all.
    pub fn empty() -> Self {
        Self {
            groups: FieldGroup::ALL.into_iter().map(|g| (g, BTreeSet::new())).collect(),
            custom_daily: BTreeSet::new(),
            custom_quarterly: BTreeSet::new(),
            external: BTreeMap::new(),
            prepared: false,
        }
    }

    fn group_of(&self, name: &str) -> Option<FieldGroup> {
        self.groups
            .iter()
            .find(|(_, fields)| fields.contains(name))
            .map(|(g, _)| *g)
    }

    /// Daily, quarterly or unknown. Catalog groups are consulted first, then
    /// custom declarations, then external registrations.
    pub fn classify(&self, name: &str) -> FieldClass {
        if let Some(group) = self.group_of(name) {
            return group.category().into();
        }
        if self.custom_daily.contains(name) {
            return FieldClass::Daily;
        }
        if self.custom_quarterly.contains(name) {
            return FieldClass::Quarterly;
        }
        match self.external.get(name) {
            Some(ext) => ext.category.into(),
            None => FieldClass::Unknown,
        }
    }

    /// Served by a provider (catalog group or external api).
    pub fn is_predefined(&self, name: &str) -> bool {
        self.group_of(name).is_some() || self.external.contains_key(name)
    }

    pub fn is_custom(&self, name: &str) -> bool {
        self.custom_daily.contains(name) || self.custom_quarterly.contains(name)
    }

    pub fn descriptor(&self, name: &str) -> Option<FieldDescriptor> {
        if let Some(group) = self.group_of(name) {
            return Some(FieldDescriptor::new(name, group.category(), FieldSource::Predefined));
        }
        if let Some(category) = self.classify(name).category() {
            if self.is_custom(name) {
                return Some(FieldDescriptor::new(name, category, FieldSource::Custom));
            }
        }
        self.external.get(name).map(|ext| {
            FieldDescriptor::new(name, ext.category, FieldSource::External(ext.source.clone()))
        })
    }

    fn check_category(&self, name: &str, category: FieldCategory) -> PanelResult<()> {
        match self.classify(name).category() {
            Some(existing) if existing != category => Err(PanelError::Configuration(format!(
                "Field '{}' is already registered as {}, cannot register it as {}",
                name, existing, category
            ))),
            _ => Ok(()),
        }
    }

    /// Record a field as served by an external provider api.
    pub fn register_external(
        &mut self,
        name: &str,
        source: &str,
        category: FieldCategory,
    ) -> PanelResult<()> {
        self.check_category(name, category)?;
        if self.group_of(name).is_some() {
            debug!(field = name, "field already in the catalog, external mapping ignored");
            return Ok(());
        }
        self.external.insert(
            name.to_string(),
            ExternalField {
                source: source.to_string(),
                category,
            },
        );
        Ok(())
    }

    /// Declare a custom (user-produced) field.
    pub fn declare(&mut self, name: &str, category: FieldCategory) -> PanelResult<()> {
        self.check_category(name, category)?;
        if self.is_predefined(name) {
            return Ok(());
        }
        match category {
            FieldCategory::Daily => self.custom_daily.insert(name.to_string()),
            FieldCategory::Quarterly => self.custom_quarterly.insert(name.to_string()),
        };
        Ok(())
    }

    /// Forget a custom or external field. Catalog entries stay.
    pub fn remove(&mut self, name: &str) -> bool {
        let custom = self.custom_daily.remove(name) | self.custom_quarterly.remove(name);
        let external = self.external.remove(name).is_some();
        custom || external
    }

    /// Partition fields by the provider api that serves them. Fields with
    /// no provider are dropped with a warning.
    pub fn resolve_providers<S: AsRef<str>>(&self, fields: &[S]) -> BTreeMap<String, BTreeSet<String>> {
        let mut out: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for field in fields {
            let field = field.as_ref();
            let source = match self.group_of(field) {
                Some(group) => Some(group.api().to_string()),
                None => self.external.get(field).map(|e| e.source.clone()),
            };
            match source {
                Some(api) => {
                    out.entry(api).or_default().insert(field.to_string());
                }
                None => warn!(field, "no provider registered for field, dropped from query"),
            }
        }
        out
    }

    /// Fields of `fields` that belong to `group`, sorted. With an active
    /// adjustment mode, market prices are returned with their counterpart
    /// (`close` brings `close_adj` and vice versa).
    pub fn select<S: AsRef<str>>(&self, group: FieldGroup, fields: &[S], adjust_mode: AdjustMode) -> Vec<String> {
        let pool = match self.groups.get(&group) {
            Some(pool) => pool,
            None => return Vec::new(),
        };
        let mut selected: BTreeSet<String> = fields
            .iter()
            .map(|f| f.as_ref())
            .filter(|f| pool.contains(*f))
            .map(str::to_string)
            .collect();

        if group == FieldGroup::MarketDaily && adjust_mode.is_active() {
            let pairs: Vec<String> = selected
                .iter()
                .filter_map(|f| price_counterpart(f))
                .collect();
            selected.extend(pairs);
        }
        selected.into_iter().collect()
    }

    /// Every field known for a category.
    pub fn fields_of(&self, category: FieldCategory) -> BTreeSet<String> {
        let mut out: BTreeSet<String> = self
            .groups
            .iter()
            .filter(|(g, _)| g.category() == category)
            .flat_map(|(_, f)| f.iter().cloned())
            .collect();
        match category {
            FieldCategory::Daily => out.extend(self.custom_daily.iter().cloned()),
            FieldCategory::Quarterly => out.extend(self.custom_quarterly.iter().cloned()),
        }
        out.extend(
            self.external
                .iter()
                .filter(|(_, e)| e.category == category)
                .map(|(n, _)| n.clone()),
        );
        out
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    /// Absorb the provider's `api -> parameters` catalog.
    ///
    /// Known apis extend their catalog group. Other apis become external
    /// sources, quarterly when keyed by announcement/report date. Fields
    /// already in a group are not registered twice. Safe to call again.
    pub fn prepare_fields(&mut self, catalog: &BTreeMap<String, BTreeSet<String>>) -> PanelResult<()> {
        let key_params = [TRADE_DATE, "symbol", ANN_DATE, REPORT_DATE];

        for (api, params) in catalog {
            if let Some(group) = FieldGroup::from_api(api) {
                let fields = params.iter().filter(|p| !key_params.contains(&p.as_str())).cloned();
                self.groups.entry(group).or_default().extend(fields);
            }
        }

        for (api, params) in catalog {
            if FieldGroup::from_api(api).is_some() {
                continue;
            }
            let category = if is_quarterly_api(params) {
                FieldCategory::Quarterly
            } else {
                FieldCategory::Daily
            };
            for param in params.iter().filter(|p| !key_params.contains(&p.as_str())) {
                if self.group_of(param).is_some() {
                    continue;
                }
                if let Err(e) = self.register_external(param, api, category) {
                    warn!(field = %param, api = %api, error = %e, "skipping conflicting provider field");
                }
            }
        }
        self.prepared = true;
        Ok(())
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            custom_daily: self.custom_daily.clone(),
            custom_quarterly: self.custom_quarterly.clone(),
            external: self.external.clone(),
            prepared: self.prepared,
        }
    }

    pub fn restore(&mut self, snapshot: RegistrySnapshot) {
        self.custom_daily = snapshot.custom_daily;
        self.custom_quarterly = snapshot.custom_quarterly;
        self.external = snapshot.external;
        self.prepared = snapshot.prepared;
    }
}

/// `close` <-> `close_adj`, for the paired price fields only.
fn price_counterpart(field: &str) -> Option<String> {
    if let Some(raw) = field.strip_suffix(ADJ_SUFFIX) {
        if PRICE_FIELDS.contains(&raw) {
            return Some(raw.to_string());
        }
    } else if PRICE_FIELDS.contains(&field) {
        return Some(format!("{}{}", field, ADJ_SUFFIX));
    }
    None
}
