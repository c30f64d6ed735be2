//! Data view configuration
//!
//! Loaded from YAML:
//!
//! ```yaml
//! start_date: 20200101
//! end_date: 20200630
//! symbol: 000001.SZ,600000.SH   # or a YAML list
//! fields: [close, pb, roe]
//! adjust_mode: post
//! ```

use crate::error::{PanelError, PanelResult};
use crate::types::{is_valid_date, AdjustMode, Date};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Default financial statement report type (consolidated statements).
pub const DEFAULT_REPORT_TYPE: &str = "408001000";

fn default_report_type() -> String {
    DEFAULT_REPORT_TYPE.to_string()
}

/// Accept either a YAML list or a comma separated string.
fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        One(String),
        Many(Vec<String>),
    }

    let items = match Raw::deserialize(deserializer)? {
        Raw::One(s) => s.split(',').map(str::to_string).collect(),
        Raw::Many(v) => v,
    };
    Ok(items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataViewConfig {
    pub start_date: Date,
    pub end_date: Date,
    #[serde(default, deserialize_with = "string_or_list")]
    pub symbol: Vec<String>,
    /// Index ids whose members make up the symbol set.
    #[serde(default, deserialize_with = "string_or_list")]
    pub universe: Vec<String>,
    #[serde(default)]
    pub benchmark: Option<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub fields: Vec<String>,
    #[serde(default)]
    pub adjust_mode: AdjustMode,
    #[serde(default = "default_report_type")]
    pub report_type: String,
    /// Pull the provider's field catalog before the first query.
    #[serde(default)]
    pub prepare_fields: bool,
    /// Reuse index membership across formula evaluations instead of
    /// querying it for every call.
    #[serde(default)]
    pub cache_index_membership: bool,
}

impl DataViewConfig {
    pub fn new(start_date: Date, end_date: Date) -> Self {
        Self {
            start_date,
            end_date,
            symbol: Vec::new(),
            universe: Vec::new(),
            benchmark: None,
            fields: Vec::new(),
            adjust_mode: AdjustMode::default(),
            report_type: default_report_type(),
            prepare_fields: false,
            cache_index_membership: false,
        }
    }

    pub fn with_symbols<S: AsRef<str>>(mut self, symbols: &[S]) -> Self {
        self.symbol = symbols.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    pub fn with_fields<S: AsRef<str>>(mut self, fields: &[S]) -> Self {
        self.fields = fields.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    pub fn with_universe<S: AsRef<str>>(mut self, universe: &[S]) -> Self {
        self.universe = universe.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    pub fn with_adjust_mode(mut self, adjust_mode: AdjustMode) -> Self {
        self.adjust_mode = adjust_mode;
        self
    }

    pub fn from_yaml_str(yaml: &str) -> PanelResult<Self> {
        let config: DataViewConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> PanelResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn validate(&self) -> PanelResult<()> {
        for (name, date) in [("start_date", self.start_date), ("end_date", self.end_date)] {
            if !is_valid_date(date) {
                return Err(PanelError::Configuration(format!(
                    "{} {} is not a valid YYYYMMDD date",
                    name, date
                )));
            }
        }
        if self.start_date > self.end_date {
            return Err(PanelError::Configuration(format!(
                "start_date {} is after end_date {}",
                self.start_date, self.end_date
            )));
        }
        if self.symbol.is_empty() && self.universe.is_empty() {
            return Err(PanelError::Configuration(
                "Either symbol or universe must be given".to_string(),
            ));
        }
        let unique: BTreeSet<&String> = self.symbol.iter().collect();
        if unique.len() != self.symbol.len() {
            return Err(PanelError::Configuration(
                "symbol contains duplicates".to_string(),
            ));
        }
        Ok(())
    }

    /// Configured symbols, sorted and deduplicated.
    pub fn sorted_symbols(&self) -> Vec<String> {
        let set: BTreeSet<&String> = self.symbol.iter().collect();
        set.into_iter().cloned().collect()
    }
}
