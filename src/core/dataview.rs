//! Data view
//!
//! Owns the daily and quarterly panels of one research universe. Raw data
//! comes from an injected [`DataProvider`], the trading calendar from a
//! [`TradingCalendar`] and index membership from an optional
//! [`IndexMembership`] service. Mutations go through the field lifecycle
//! manager; formulas borrow panel slices and hand their results back to it.

use super::formula::{EvalContext, Formula, FunctionTable, NameStyle};
use super::lifecycle::{AppendOutcome, FieldLifecycle, PanelState};
use crate::config::DataViewConfig;
use crate::error::{PanelError, PanelResult};
use crate::panel::align::align;
use crate::panel::merge::{fill_missing_idx_col, merge, pivot, LongTable};
use crate::panel::{FieldFrame, Panel};
use crate::provider::{DataProvider, IndexMembership, QueryGroup, QueryRequest, TradingCalendar};
use crate::registry::{FieldGroup, FieldRegistry};
use crate::types::{
    to_naive_date, Date, FieldCategory, FieldClass, ANN_DATE, INDEX_MEMBER, TRADE_DATE,
    TRADE_STATUS,
};
use chrono::NaiveDate;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// Options of [`DataView::add_formula`].
#[derive(Debug, Clone)]
pub struct FormulaOptions {
    /// Commit the result as a field of the data view.
    pub persist: bool,
    /// Replace an existing field of the same name when persisting.
    pub overwrite: bool,
    /// Casing used when echoing the formula in diagnostics.
    pub name_style: NameStyle,
    /// Extra functions available to the formula.
    pub functions: FunctionTable,
    /// Restrict cross-sectional functions to index members.
    pub within_index: bool,
}

impl Default for FormulaOptions {
    fn default() -> Self {
        Self {
            persist: false,
            overwrite: true,
            name_style: NameStyle::default(),
            functions: FunctionTable::new(),
            within_index: true,
        }
    }
}

impl FormulaOptions {
    pub fn persisted() -> Self {
        Self {
            persist: true,
            ..Self::default()
        }
    }
}

pub struct DataView {
    config: DataViewConfig,
    lifecycle: FieldLifecycle,
    symbols: Vec<String>,
    dates: Vec<Date>,
    provider: Option<Box<dyn DataProvider>>,
    calendar: Option<Box<dyn TradingCalendar>>,
    membership: Option<Box<dyn IndexMembership>>,
    membership_cache: Option<FieldFrame>,
}

impl std::fmt::Debug for DataView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataView")
            .field("config", &self.config)
            .field("symbols", &self.symbols)
            .field("dates", &self.dates.len())
            .field("fields", &self.fields())
            .finish_non_exhaustive()
    }
}

impl DataView {
    pub fn new(config: DataViewConfig) -> PanelResult<Self> {
        config.validate()?;
        Ok(Self::with_registry(config, FieldRegistry::new()))
    }

    fn with_registry(config: DataViewConfig, registry: FieldRegistry) -> Self {
        let symbols = config.sorted_symbols();
        let mut lifecycle = FieldLifecycle::new(registry);
        lifecycle.set_symbols(&symbols);
        Self {
            config,
            lifecycle,
            symbols,
            dates: Vec::new(),
            provider: None,
            calendar: None,
            membership: None,
            membership_cache: None,
        }
    }

    pub fn with_provider(mut self, provider: impl DataProvider + 'static) -> Self {
        self.provider = Some(Box::new(provider));
        self
    }

    pub fn with_calendar(mut self, calendar: impl TradingCalendar + 'static) -> Self {
        self.calendar = Some(Box::new(calendar));
        self
    }

    pub fn with_membership(mut self, membership: impl IndexMembership + 'static) -> Self {
        self.membership = Some(Box::new(membership));
        self
    }

    /// Assemble a data view from stored parts, without collaborators.
    pub(crate) fn from_parts(
        config: DataViewConfig,
        registry: FieldRegistry,
        symbols: Vec<String>,
        dates: Vec<Date>,
        state: PanelState,
    ) -> Self {
        let mut dv = Self::with_registry(config, registry);
        dv.lifecycle.set_symbols(&symbols);
        dv.symbols = symbols;
        dv.dates = dates;
        dv.lifecycle.install(state);
        dv
    }

    /// Build a daily-only data view straight from one long-format table.
    /// Dates, symbols and fields are taken from the table itself.
    pub fn from_long_table(table: &LongTable) -> PanelResult<Self> {
        if table.index_name() != TRADE_DATE {
            return Err(PanelError::Validation(format!(
                "Long table must be indexed by '{}', found '{}'",
                TRADE_DATE,
                table.index_name()
            )));
        }
        let dates = table.dates();
        let (Some(&start), Some(&end)) = (dates.first(), dates.last()) else {
            return Err(PanelError::DataUnavailable(
                "Long table has no rows".to_string(),
            ));
        };
        let symbols: Vec<String> = table.symbols().into_iter().collect();
        let config = DataViewConfig::new(start, end)
            .with_symbols(&symbols)
            .with_fields(table.fields());
        config.validate()?;

        let mut registry = FieldRegistry::new();
        for field in table.fields() {
            if !registry.is_predefined(field) {
                registry.declare(field, FieldCategory::Daily)?;
            }
        }
        let panel = fill_missing_idx_col(pivot(table)?, None, &symbols);
        info!(
            symbols = symbols.len(),
            dates = dates.len(),
            "data view initialised from long table"
        );
        Ok(Self::from_parts(
            config,
            registry,
            symbols,
            dates,
            PanelState::new(Some(panel), None),
        ))
    }

    //==========================================================================
    // Accessors
    //==========================================================================

    pub fn config(&self) -> &DataViewConfig {
        &self.config
    }

    pub fn start_date(&self) -> Date {
        self.config.start_date
    }

    pub fn end_date(&self) -> Date {
        self.config.end_date
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Trading dates of the daily panel.
    pub fn dates(&self) -> &[Date] {
        &self.dates
    }

    pub fn naive_dates(&self) -> PanelResult<Vec<NaiveDate>> {
        self.dates
            .iter()
            .map(|d| {
                to_naive_date(*d).ok_or_else(|| {
                    PanelError::Validation(format!("{} is not a valid YYYYMMDD date", d))
                })
            })
            .collect()
    }

    /// Every field held by either panel.
    pub fn fields(&self) -> BTreeSet<String> {
        self.lifecycle.state().fields()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.lifecycle.state().has_field(field)
    }

    pub fn registry(&self) -> &FieldRegistry {
        self.lifecycle.registry()
    }

    pub fn daily(&self) -> Option<&Panel> {
        self.lifecycle.daily()
    }

    pub fn quarterly(&self) -> Option<&Panel> {
        self.lifecycle.quarterly()
    }

    pub fn state(&self) -> &PanelState {
        self.lifecycle.state()
    }

    fn provider(&self) -> PanelResult<&dyn DataProvider> {
        self.provider.as_deref().ok_or_else(|| {
            PanelError::Configuration("No data provider attached to the data view".to_string())
        })
    }

    fn calendar(&self) -> PanelResult<&dyn TradingCalendar> {
        self.calendar.as_deref().ok_or_else(|| {
            PanelError::Configuration("No trading calendar attached to the data view".to_string())
        })
    }

    fn require_daily(&self) -> PanelResult<&Panel> {
        self.daily()
            .ok_or(PanelError::MissingPanel(FieldCategory::Daily))
    }

    //==========================================================================
    // Population
    //==========================================================================

    /// Query every configured field plus `trade_status`, build both panels,
    /// fold quarterly fields into the daily panel and, with a universe,
    /// store index membership as the `index_member` field.
    pub fn prepare_data(&mut self) -> PanelResult<()> {
        let (start, end) = (self.config.start_date, self.config.end_date);
        self.membership_cache = None;
        self.dates = self.calendar()?.trading_dates(start, end)?;
        if self.dates.is_empty() {
            return Err(PanelError::DataUnavailable(format!(
                "No trading dates between {} and {}",
                start, end
            )));
        }

        if self.config.prepare_fields && !self.registry().is_prepared() {
            let catalog = self.provider()?.predefined_fields()?;
            self.lifecycle.registry_mut().prepare_fields(&catalog)?;
        }

        self.symbols = self.resolve_symbols()?;
        self.lifecycle.set_symbols(&self.symbols);

        let mut fields = self.config.fields.clone();
        if !fields.iter().any(|f| f == TRADE_STATUS) {
            fields.push(TRADE_STATUS.to_string());
        }
        let (daily, quarterly) = self.fetch(&fields)?;
        let daily = daily
            .unwrap_or_else(|| Panel::empty(FieldCategory::Daily.index_name(), self.dates.clone()));

        self.lifecycle.install(PanelState::new(Some(daily), quarterly));
        self.lifecycle.expand_quarterly_into_daily()?;

        if !self.config.universe.is_empty() {
            let membership = self.membership_frame()?;
            self.lifecycle
                .append(&membership, INDEX_MEMBER, FieldCategory::Daily, true)?;
        }

        info!(
            symbols = self.symbols.len(),
            dates = self.dates.len(),
            fields = self.fields().len(),
            "data prepared"
        );
        Ok(())
    }

    fn resolve_symbols(&mut self) -> PanelResult<Vec<String>> {
        if !self.config.symbol.is_empty() {
            return Ok(self.config.sorted_symbols());
        }
        let members = self.universe_members()?;
        let symbols: BTreeSet<String> = members.into_values().flatten().collect();
        if symbols.is_empty() {
            return Err(PanelError::DataUnavailable(format!(
                "Universe {} has no members",
                self.config.universe.join(",")
            )));
        }
        Ok(symbols.into_iter().collect())
    }

    /// Union of the members of every universe index, per date.
    fn universe_members(&self) -> PanelResult<BTreeMap<Date, BTreeSet<String>>> {
        let service = self.membership.as_deref().ok_or_else(|| {
            PanelError::Configuration(
                "A universe is configured but no index membership service is attached".to_string(),
            )
        })?;
        let mut out: BTreeMap<Date, BTreeSet<String>> = BTreeMap::new();
        for index_id in &self.config.universe {
            let members =
                service.members(index_id, self.config.start_date, self.config.end_date)?;
            for (date, symbols) in members {
                out.entry(date).or_default().extend(symbols);
            }
        }
        Ok(out)
    }

    /// Membership as a dates × symbols frame of 1.0 / 0.0.
    fn membership_frame(&mut self) -> PanelResult<FieldFrame> {
        if let Some(cached) = &self.membership_cache {
            return Ok(cached.clone());
        }
        let members = self.universe_members()?;
        let columns = self
            .symbols
            .iter()
            .map(|symbol| {
                self.dates
                    .iter()
                    .map(|d| {
                        let member = members.get(d).is_some_and(|m| m.contains(symbol));
                        Some(if member { 1.0 } else { 0.0 })
                    })
                    .collect()
            })
            .collect();
        let frame = FieldFrame::new(self.dates.clone(), self.symbols.clone(), columns)?;
        if self.config.cache_index_membership {
            self.membership_cache = Some(frame.clone());
        }
        Ok(frame)
    }

    fn build_request(&self, fields: &[String]) -> QueryRequest {
        let registry = self.registry();
        let mut groups = Vec::new();
        for (api, requested) in registry.resolve_providers(fields) {
            let requested: Vec<String> = requested.into_iter().collect();
            let (category, mut selected): (FieldCategory, BTreeSet<String>) =
                match FieldGroup::from_api(&api) {
                    Some(group) => (
                        group.category(),
                        registry
                            .select(group, &requested, self.config.adjust_mode)
                            .into_iter()
                            .collect(),
                    ),
                    None => (
                        requested
                            .first()
                            .and_then(|f| registry.classify(f).category())
                            .unwrap_or(FieldCategory::Daily),
                        requested.into_iter().collect(),
                    ),
                };
            if category == FieldCategory::Quarterly {
                selected.insert(ANN_DATE.to_string());
            }
            groups.push(QueryGroup {
                source: api,
                category,
                fields: selected,
            });
        }
        let has_quarterly = groups.iter().any(|g| g.category == FieldCategory::Quarterly);
        QueryRequest {
            symbols: self.symbols.clone(),
            start_date: self.config.start_date,
            end_date: self.config.end_date,
            adjust_mode: self.config.adjust_mode,
            report_type: has_quarterly.then(|| self.config.report_type.clone()),
            groups,
        }
    }

    /// Query `fields` and reconcile the results into a daily panel on the
    /// trading calendar and a quarterly panel on report dates.
    fn fetch(&self, fields: &[String]) -> PanelResult<(Option<Panel>, Option<Panel>)> {
        let request = self.build_request(fields);
        if request.groups.is_empty() {
            return Ok((None, None));
        }
        debug!(fields = ?request.fields(), "querying provider");
        let response = self.provider()?.query(&request)?;

        let daily = Self::merge_tables(&response.daily, FieldCategory::Daily)?
            .map(|p| fill_missing_idx_col(p, Some(&self.dates), &self.symbols));
        let quarterly = Self::merge_tables(&response.quarterly, FieldCategory::Quarterly)?
            .map(|p| fill_missing_idx_col(p, None, &self.symbols));
        Ok((daily, quarterly))
    }

    fn merge_tables(tables: &[LongTable], category: FieldCategory) -> PanelResult<Option<Panel>> {
        let panels = tables
            .iter()
            .map(pivot)
            .collect::<PanelResult<Vec<_>>>()?;
        merge(&panels, category.index_name())
    }

    //==========================================================================
    // Field lifecycle
    //==========================================================================

    /// Fetch one predefined field from the provider and append it.
    ///
    /// Returns `Ok(false)` when the field already exists or no provider
    /// serves it. Provider failures are returned as they are.
    pub fn add_field(&mut self, name: &str) -> PanelResult<bool> {
        if self.has_field(name) {
            info!(field = name, "field already exists");
            return Ok(false);
        }
        if !self.registry().is_predefined(name) {
            warn!(field = name, "field name not valid, ignored");
            return Ok(false);
        }
        if self.daily().is_none() {
            self.prepare_data()?;
            if self.has_field(name) {
                return Ok(true);
            }
        }

        let fields = [name.to_string()];
        match self.registry().classify(name) {
            FieldClass::Quarterly => {
                let (_, quarterly) = self.fetch(&fields)?;
                let quarterly = quarterly.ok_or_else(|| {
                    PanelError::DataUnavailable(format!("No quarterly data returned for '{}'", name))
                })?;
                if self.quarterly().is_none() {
                    self.install_quarterly_base(&quarterly)?;
                }
                warn_if_empty(name, &quarterly.field_frame(name, None, None));
                self.lifecycle.append_quarterly_fetched(&quarterly, name, false)?;
            }
            _ => {
                let (daily, _) = self.fetch(&fields)?;
                let daily = daily.ok_or_else(|| {
                    PanelError::DataUnavailable(format!("No daily data returned for '{}'", name))
                })?;
                let frame = daily.field_frame(name, None, None);
                warn_if_empty(name, &frame);
                self.lifecycle
                    .append(&frame, name, FieldCategory::Daily, false)?;
            }
        }
        info!(field = name, "field added");
        Ok(true)
    }

    /// Start the quarterly panel from the announcement dates of a first
    /// quarterly fetch and expand them into the daily panel.
    fn install_quarterly_base(&mut self, fetched: &Panel) -> PanelResult<()> {
        if !fetched.has_field(ANN_DATE) {
            return Err(PanelError::DataUnavailable(format!(
                "Quarterly result has no '{}' field",
                ANN_DATE
            )));
        }
        let base = fetched.slice(None, Some(&[ANN_DATE.to_string()][..]), None, None);
        let daily = self.require_daily()?.clone();
        let mut staged = FieldLifecycle::new(self.registry().clone());
        staged.set_symbols(&self.symbols);
        staged.install(PanelState::new(Some(daily), Some(base)));
        staged.expand_quarterly_into_daily()?;
        self.lifecycle.install(staged.state().clone());
        Ok(())
    }

    /// Append a dates × symbols frame as `name`.
    pub fn append_df(
        &mut self,
        frame: &FieldFrame,
        name: &str,
        category: FieldCategory,
        overwrite: bool,
    ) -> PanelResult<AppendOutcome> {
        self.lifecycle.append(frame, name, category, overwrite)
    }

    /// Append a report-date frame to the quarterly panel together with its
    /// daily expansion.
    pub fn append_df_quarter(
        &mut self,
        frame: &FieldFrame,
        name: &str,
        overwrite: bool,
    ) -> PanelResult<AppendOutcome> {
        self.lifecycle.append_quarterly_expanded(frame, name, overwrite)
    }

    /// Remove a field from both panels. Unknown fields are ignored.
    pub fn remove_field(&mut self, name: &str) -> bool {
        self.lifecycle.remove(name)
    }

    //==========================================================================
    // Formulas
    //==========================================================================

    /// Evaluate `formula` and return the daily result over
    /// `[start_date, end_date]`.
    ///
    /// With `category` quarterly, quarterly variables are read on report
    /// dates; if every variable is quarterly the result is computed there
    /// and expanded to daily afterwards. Variables missing from the view
    /// are fetched first.
    pub fn add_formula(
        &mut self,
        name: &str,
        formula: &str,
        category: FieldCategory,
        options: &FormulaOptions,
    ) -> PanelResult<FieldFrame> {
        let parsed = Formula::parse(formula, &options.functions)?;
        self.evaluate_formula(name, &parsed, category, options)
    }

    /// Evaluate several named formulas, each of which may read fields
    /// produced by the others. Every result is persisted.
    pub fn add_formulas(
        &mut self,
        formulas: &[(&str, &str)],
        category: FieldCategory,
        options: &FormulaOptions,
    ) -> PanelResult<BTreeMap<String, FieldFrame>> {
        let mut graph = DiGraph::new();
        let mut nodes = HashMap::new();
        let mut parsed = Vec::with_capacity(formulas.len());
        for (name, text) in formulas {
            if nodes.contains_key(*name) {
                return Err(PanelError::Configuration(format!(
                    "Formula '{}' is defined twice",
                    name
                )));
            }
            nodes.insert(name.to_string(), graph.add_node(parsed.len()));
            parsed.push((name.to_string(), Formula::parse(text, &options.functions)?));
        }
        for (name, formula) in &parsed {
            for var in formula.variables() {
                if let (Some(&from), Some(&to)) = (nodes.get(var), nodes.get(name)) {
                    graph.add_edge(from, to, ());
                }
            }
        }
        let order = toposort(&graph, None).map_err(|cycle| {
            let name = &parsed[graph[cycle.node_id()]].0;
            PanelError::Configuration(format!(
                "Circular dependency between formulas involving '{}'",
                name
            ))
        })?;

        let options = FormulaOptions {
            persist: true,
            ..options.clone()
        };
        let mut results = BTreeMap::new();
        for node in order {
            let (name, formula) = &parsed[graph[node]];
            let frame = self.evaluate_formula(name, formula, category, &options)?;
            results.insert(name.clone(), frame);
        }
        Ok(results)
    }

    fn evaluate_formula(
        &mut self,
        name: &str,
        formula: &Formula,
        category: FieldCategory,
        options: &FormulaOptions,
    ) -> PanelResult<FieldFrame> {
        if options.persist {
            if self.has_field(name) {
                if !options.overwrite {
                    return Err(PanelError::Configuration(format!(
                        "Field '{}' already exists, pick another name",
                        name
                    )));
                }
            } else if self.registry().is_predefined(name) {
                return Err(PanelError::Configuration(format!(
                    "'{}' is a predefined field, pick another name",
                    name
                )));
            }
        }
        debug!(field = name, formula = %formula.render(options.name_style), "evaluating formula");

        if self.daily().is_none() {
            self.prepare_data()?;
        }
        for var in formula.variables() {
            if !self.has_field(var) {
                self.resolve_variable(var)?;
            }
        }

        let ctx = self.eval_context(formula, category, options.within_index)?;
        let evaluated = formula.evaluate(&ctx)?;

        let daily_index = self.require_daily()?.index().to_vec();
        let daily = match evaluated.category {
            FieldCategory::Quarterly => {
                let ann = self.ann_dates()?;
                align(&evaluated.frame, &ann, &daily_index)?
            }
            FieldCategory::Daily => evaluated.frame.clone(),
        };

        if options.persist {
            match evaluated.category {
                FieldCategory::Quarterly => {
                    self.lifecycle
                        .append_quarterly_expanded(&evaluated.frame, name, true)?;
                }
                FieldCategory::Daily => {
                    self.lifecycle
                        .append(&evaluated.frame, name, FieldCategory::Daily, true)?;
                }
            }
            info!(field = name, category = %evaluated.category, "formula result stored");
        }
        Ok(daily.between(Some(self.config.start_date), Some(self.config.end_date)))
    }

    /// Fetch a variable the view does not hold yet.
    fn resolve_variable(&mut self, var: &str) -> PanelResult<()> {
        info!(variable = var, "variable not in the data view, fetching it");
        match self.add_field(var) {
            Ok(true) => Ok(()),
            Ok(false) => Err(PanelError::Resolution(format!(
                "Variable '{}' is not a known field",
                var
            ))),
            Err(e) if e.is_provider_failure() => Err(e),
            Err(e) => Err(PanelError::Resolution(format!(
                "Variable '{}' could not be resolved: {}",
                var, e
            ))),
        }
    }

    fn ann_dates(&self) -> PanelResult<FieldFrame> {
        let quarterly = self
            .quarterly()
            .ok_or(PanelError::MissingPanel(FieldCategory::Quarterly))?;
        Ok(quarterly.field_frame(ANN_DATE, None, None))
    }

    fn eval_context(
        &mut self,
        formula: &Formula,
        category: FieldCategory,
        within_index: bool,
    ) -> PanelResult<EvalContext> {
        let daily = self.require_daily()?;
        let mut ctx = EvalContext::new(daily.index().to_vec());

        for var in formula.variables() {
            let quarterly = match (category, self.quarterly()) {
                (FieldCategory::Quarterly, Some(q))
                    if q.has_field(var)
                        && self.registry().classify(var) == FieldClass::Quarterly =>
                {
                    Some(q)
                }
                _ => None,
            };
            match quarterly {
                Some(q) => ctx.insert_variable(
                    var,
                    q.field_frame(var, None, None),
                    FieldCategory::Quarterly,
                ),
                None => ctx.insert_variable(
                    var,
                    daily.field_frame(var, None, None),
                    FieldCategory::Daily,
                ),
            }
        }
        if self.quarterly().is_some() {
            ctx = ctx.with_ann_dates(self.ann_dates()?);
        }

        if within_index {
            if let Some(membership) = self.scoping_membership()? {
                ctx = ctx.with_membership(membership);
            }
        }
        Ok(ctx)
    }

    /// Membership used to scope cross-sectional functions: from the
    /// membership service when a universe is configured, otherwise the
    /// stored `index_member` field if any.
    fn scoping_membership(&mut self) -> PanelResult<Option<FieldFrame>> {
        if !self.config.universe.is_empty() && self.membership.is_some() {
            return self.membership_frame().map(Some);
        }
        Ok(self
            .daily()
            .filter(|d| d.has_field(INDEX_MEMBER))
            .map(|d| d.field_frame(INDEX_MEMBER, None, None)))
    }

    //==========================================================================
    // Queries
    //==========================================================================

    /// Inclusive slice of the daily panel. Missing bounds default to the
    /// configured date range, missing symbols or fields mean all of them.
    pub fn get(
        &self,
        symbols: Option<&[String]>,
        fields: Option<&[String]>,
        start: Option<Date>,
        end: Option<Date>,
    ) -> PanelResult<Panel> {
        let daily = self.require_daily()?;
        Ok(daily.slice(
            symbols,
            fields,
            Some(start.unwrap_or(self.config.start_date)),
            Some(end.unwrap_or(self.config.end_date)),
        ))
    }

    /// All (or the given) fields of one symbol.
    pub fn get_symbol(
        &self,
        symbol: &str,
        fields: Option<&[String]>,
        start: Option<Date>,
        end: Option<Date>,
    ) -> PanelResult<Panel> {
        let panel = self.get(Some(&[symbol.to_string()][..]), fields, start, end)?;
        if panel.n_columns() == 0 {
            return Err(PanelError::DataUnavailable(format!(
                "No data for symbol '{}'",
                symbol
            )));
        }
        Ok(panel)
    }

    /// One daily field as dates × symbols.
    pub fn get_ts(
        &self,
        field: &str,
        symbols: Option<&[String]>,
        start: Option<Date>,
        end: Option<Date>,
    ) -> PanelResult<FieldFrame> {
        let daily = self.require_daily()?;
        if !daily.has_field(field) {
            return Err(PanelError::DataUnavailable(format!(
                "Field '{}' is not in the daily panel",
                field
            )));
        }
        let frame = daily.field_frame(
            field,
            Some(start.unwrap_or(self.config.start_date)),
            Some(end.unwrap_or(self.config.end_date)),
        );
        Ok(match symbols {
            Some(symbols) => frame.reindex(&frame.index().to_vec(), symbols),
            None => frame,
        })
    }

    /// One quarterly field as report dates × symbols.
    pub fn get_ts_quarter(&self, field: &str, start: Option<Date>, end: Option<Date>) -> PanelResult<FieldFrame> {
        let quarterly = self
            .quarterly()
            .ok_or(PanelError::MissingPanel(FieldCategory::Quarterly))?;
        if !quarterly.has_field(field) {
            return Err(PanelError::DataUnavailable(format!(
                "Field '{}' is not in the quarterly panel",
                field
            )));
        }
        Ok(quarterly.field_frame(field, start, end))
    }

    /// Copy of the view restricted to `[start, end]` on the daily panel.
    /// The quarterly panel is kept whole so earlier reports stay visible.
    pub fn slice(&self, start: Date, end: Date) -> PanelResult<DataView> {
        if start < self.config.start_date || end > self.config.end_date || start > end {
            return Err(PanelError::Validation(format!(
                "Slice [{}, {}] is outside the data view range [{}, {}]",
                start, end, self.config.start_date, self.config.end_date
            )));
        }
        let daily = self
            .require_daily()?
            .slice(None, None, Some(start), Some(end));
        let dates = daily.index().to_vec();
        let mut config = self.config.clone();
        config.start_date = start;
        config.end_date = end;
        Ok(DataView::from_parts(
            config,
            self.registry().clone(),
            self.symbols.clone(),
            dates,
            PanelState::new(Some(daily), self.quarterly().cloned()),
        ))
    }
}

fn warn_if_empty(field: &str, frame: &FieldFrame) {
    if frame.count_defined() == 0 {
        warn!(field, "provider returned no data for field, cells left undefined");
    }
}
