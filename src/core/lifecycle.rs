//! Field lifecycle manager
//!
//! Adds, overwrites and removes fields of the daily and quarterly panels.
//! Every mutation builds the next [`PanelState`] from a copy of the current
//! one and swaps it in at a single commit point, so a failed operation
//! leaves the previous state untouched.

use crate::error::{PanelError, PanelResult};
use crate::panel::align::{align, expand_quarterly};
use crate::panel::{FieldFrame, Panel};
use crate::registry::FieldRegistry;
use crate::types::{Date, FieldCategory, ANN_DATE};
use std::collections::BTreeSet;
use tracing::{info, warn};

/// The daily and quarterly panels of a data view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PanelState {
    pub daily: Option<Panel>,
    pub quarterly: Option<Panel>,
}

impl PanelState {
    pub fn new(daily: Option<Panel>, quarterly: Option<Panel>) -> Self {
        Self { daily, quarterly }
    }

    pub fn panel(&self, category: FieldCategory) -> Option<&Panel> {
        match category {
            FieldCategory::Daily => self.daily.as_ref(),
            FieldCategory::Quarterly => self.quarterly.as_ref(),
        }
    }

    fn set(&mut self, category: FieldCategory, panel: Panel) {
        match category {
            FieldCategory::Daily => self.daily = Some(panel),
            FieldCategory::Quarterly => self.quarterly = Some(panel),
        }
    }

    fn require(&self, category: FieldCategory) -> PanelResult<&Panel> {
        self.panel(category).ok_or(PanelError::MissingPanel(category))
    }

    /// Whether either panel holds the field.
    pub fn has_field(&self, field: &str) -> bool {
        self.daily.as_ref().is_some_and(|p| p.has_field(field))
            || self.quarterly.as_ref().is_some_and(|p| p.has_field(field))
    }

    /// Union of both panels' fields.
    pub fn fields(&self) -> BTreeSet<String> {
        self.daily
            .iter()
            .chain(self.quarterly.iter())
            .flat_map(|p| p.fields())
            .collect()
    }

    /// Copy without any column of `field` in either panel.
    fn without_field(&self, field: &str) -> PanelState {
        PanelState {
            daily: self.daily.as_ref().map(|p| p.without_field(field)),
            quarterly: self.quarterly.as_ref().map(|p| p.without_field(field)),
        }
    }
}

/// What an append did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Added,
    /// The field existed and was replaced.
    Overwritten,
    /// The field existed and overwrite was off; nothing changed.
    Skipped,
}

#[derive(Debug, Clone, Default)]
pub struct FieldLifecycle {
    state: PanelState,
    registry: FieldRegistry,
    /// Symbol set every appended frame is re-addressed onto. When empty the
    /// target panel's own symbols are used.
    symbols: Vec<String>,
}

impl FieldLifecycle {
    pub fn new(registry: FieldRegistry) -> Self {
        Self {
            state: PanelState::default(),
            registry,
            symbols: Vec::new(),
        }
    }

    pub fn state(&self) -> &PanelState {
        &self.state
    }

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut FieldRegistry {
        &mut self.registry
    }

    pub fn daily(&self) -> Option<&Panel> {
        self.state.daily.as_ref()
    }

    pub fn quarterly(&self) -> Option<&Panel> {
        self.state.quarterly.as_ref()
    }

    /// Fix the symbol set of both panels.
    pub fn set_symbols(&mut self, symbols: &[String]) {
        let mut symbols = symbols.to_vec();
        symbols.sort();
        symbols.dedup();
        self.symbols = symbols;
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Replace both panels wholesale (initial population, loading).
    pub fn install(&mut self, state: PanelState) {
        self.state = state;
    }

    fn target_symbols(&self, panel: &Panel, frame: &FieldFrame) -> Vec<String> {
        if !self.symbols.is_empty() {
            return self.symbols.clone();
        }
        if panel.n_columns() == 0 {
            let mut symbols = frame.symbols().to_vec();
            symbols.sort();
            return symbols;
        }
        panel.symbols()
    }

    /// Append `frame` as `field` to the panel of `category`.
    ///
    /// The frame is re-addressed onto the target panel's rows and the
    /// symbol set: missing symbols become undefined, extra symbols are
    /// dropped.
    pub fn append(
        &mut self,
        frame: &FieldFrame,
        field: &str,
        category: FieldCategory,
        overwrite: bool,
    ) -> PanelResult<AppendOutcome> {
        let (state, registry, outcome) =
            self.stage_append(&self.state, frame, field, category, overwrite)?;
        self.state = state;
        self.registry = registry;
        Ok(outcome)
    }

    fn stage_append(
        &self,
        base: &PanelState,
        frame: &FieldFrame,
        field: &str,
        category: FieldCategory,
        overwrite: bool,
    ) -> PanelResult<(PanelState, FieldRegistry, AppendOutcome)> {
        let target = base.require(category)?;
        let mut next = base.clone();
        let mut registry = self.registry.clone();
        let mut outcome = AppendOutcome::Added;

        if target.has_field(field) {
            if !overwrite {
                info!(field, "append skipped: field already exists, pick another name");
                return Ok((next, registry, AppendOutcome::Skipped));
            }
            next = next.without_field(field);
            if registry.is_custom(field) {
                registry.remove(field);
            }
            outcome = AppendOutcome::Overwritten;
            warn!(field, "field is overwritten");
        }

        let panel = next.require(category)?;
        let symbols = self.target_symbols(panel, frame);
        let updated = panel.with_field(field, frame, &symbols);
        next.set(category, updated);

        registry.declare(field, category)?;
        Ok((next, registry, outcome))
    }

    /// Append a quarterly field and, in the same commit, its daily
    /// expansion aligned on announcement dates.
    pub fn append_quarterly_expanded(
        &mut self,
        frame: &FieldFrame,
        field: &str,
        overwrite: bool,
    ) -> PanelResult<AppendOutcome> {
        let base = self.state.clone();
        self.commit_quarterly(&base, frame, field, overwrite)
    }

    /// Append `field` from a freshly fetched quarterly panel.
    ///
    /// Report dates the quarterly panel does not hold yet are added first,
    /// with the fetched announcement dates, and every quarterly field is
    /// re-expanded before `field` itself is appended. One commit.
    pub fn append_quarterly_fetched(
        &mut self,
        fetched: &Panel,
        field: &str,
        overwrite: bool,
    ) -> PanelResult<AppendOutcome> {
        let mut base = self.state.clone();
        let current = base.require(FieldCategory::Quarterly)?;
        let extended = self.with_report_rows(current, fetched)?;
        if extended != *current {
            base.quarterly = Some(extended);
            base.daily = Some(self.expanded_daily(&base)?);
        }
        let frame = fetched.field_frame(field, None, None);
        self.commit_quarterly(&base, &frame, field, overwrite)
    }

    /// `quarterly` on the union of both report-date indexes, with
    /// announcement dates taken from `fetched` where it has them.
    fn with_report_rows(&self, quarterly: &Panel, fetched: &Panel) -> PanelResult<Panel> {
        let union: BTreeSet<Date> = quarterly
            .index()
            .iter()
            .chain(fetched.index())
            .copied()
            .collect();
        let union: Vec<Date> = union.into_iter().collect();
        let extended = quarterly.reindex_rows(&union);
        if !fetched.has_field(ANN_DATE) {
            return Ok(extended);
        }

        let symbols = if self.symbols.is_empty() {
            extended.symbols()
        } else {
            self.symbols.clone()
        };
        let known = extended.field_frame(ANN_DATE, None, None).reindex(&union, &symbols);
        let fresh = fetched.field_frame(ANN_DATE, None, None).reindex(&union, &symbols);
        let columns = known
            .columns()
            .iter()
            .zip(fresh.columns())
            .map(|(old, new)| old.iter().zip(new).map(|(o, n)| n.or(*o)).collect())
            .collect();
        let ann = FieldFrame::new(union, symbols.clone(), columns)?;
        Ok(extended.with_field(ANN_DATE, &ann, &symbols))
    }

    fn commit_quarterly(
        &mut self,
        base: &PanelState,
        frame: &FieldFrame,
        field: &str,
        overwrite: bool,
    ) -> PanelResult<AppendOutcome> {
        let calendar = base.require(FieldCategory::Daily)?.index().to_vec();

        let (mut state, registry, outcome) =
            self.stage_append(base, frame, field, FieldCategory::Quarterly, overwrite)?;
        if outcome == AppendOutcome::Skipped {
            return Ok(outcome);
        }

        let quarterly = state.require(FieldCategory::Quarterly)?;
        if !quarterly.has_field(ANN_DATE) {
            return Err(PanelError::DataUnavailable(format!(
                "Quarterly panel has no '{}' field, cannot expand '{}'",
                ANN_DATE, field
            )));
        }
        let values = quarterly.field_frame(field, None, None);
        let ann = quarterly.field_frame(ANN_DATE, None, None);
        let expanded = align(&values, &ann, &calendar)?;

        let daily = state.require(FieldCategory::Daily)?;
        let symbols = self.target_symbols(daily, &expanded);
        let updated = daily.with_field(field, &expanded, &symbols);
        state.set(FieldCategory::Daily, updated);

        self.state = state;
        self.registry = registry;
        Ok(outcome)
    }

    /// The daily panel of `state` with every quarterly field re-expanded.
    fn expanded_daily(&self, state: &PanelState) -> PanelResult<Panel> {
        let daily = state.require(FieldCategory::Daily)?;
        let quarterly = state.require(FieldCategory::Quarterly)?;
        let expanded = expand_quarterly(quarterly, daily.index())?;
        let mut updated = daily.clone();
        for (field, frame) in &expanded {
            let symbols = self.target_symbols(&updated, frame);
            updated = updated.with_field(field, frame, &symbols);
        }
        Ok(updated)
    }

    /// Fold every quarterly field into the daily panel.
    pub fn expand_quarterly_into_daily(&mut self) -> PanelResult<()> {
        if self.state.daily.is_none() || self.state.quarterly.is_none() {
            return Ok(());
        }
        let updated = self.expanded_daily(&self.state)?;
        self.state.daily = Some(updated);
        Ok(())
    }

    /// Drop every column of `field` from both panels and forget its
    /// registry entry. Returns false when there was nothing to remove.
    pub fn remove(&mut self, field: &str) -> bool {
        let in_panels = self.state.has_field(field);
        let next = self.state.without_field(field);
        let in_registry = self.registry.remove(field);
        if !in_panels && !in_registry {
            info!(field, "remove skipped: field does not exist");
            return false;
        }
        self.state = next;
        true
    }
}
