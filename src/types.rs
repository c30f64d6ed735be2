use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer calendar date in `YYYYMMDD` form (e.g. 20200331).
pub type Date = i64;

/// Row index name of daily panels.
pub const TRADE_DATE: &str = "trade_date";
/// Row index name of quarterly panels.
pub const REPORT_DATE: &str = "report_date";
/// Quarterly field recording when a report became public.
pub const ANN_DATE: &str = "ann_date";
/// Daily field carried by every populated daily panel.
pub const TRADE_STATUS: &str = "trade_status";
/// Daily field holding index membership (1.0 member, 0.0 not).
pub const INDEX_MEMBER: &str = "index_member";

//==============================================================================
// Field vocabulary
//==============================================================================

/// Which panel a field lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldCategory {
    Daily,
    Quarterly,
}

impl FieldCategory {
    /// Name of the row index for panels of this category.
    pub fn index_name(self) -> &'static str {
        match self {
            FieldCategory::Daily => TRADE_DATE,
            FieldCategory::Quarterly => REPORT_DATE,
        }
    }
}

impl fmt::Display for FieldCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldCategory::Daily => write!(f, "daily"),
            FieldCategory::Quarterly => write!(f, "quarterly"),
        }
    }
}

/// Result of classifying a field name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldClass {
    Daily,
    Quarterly,
    Unknown,
}

impl FieldClass {
    pub fn category(self) -> Option<FieldCategory> {
        match self {
            FieldClass::Daily => Some(FieldCategory::Daily),
            FieldClass::Quarterly => Some(FieldCategory::Quarterly),
            FieldClass::Unknown => None,
        }
    }
}

impl From<FieldCategory> for FieldClass {
    fn from(category: FieldCategory) -> Self {
        match category {
            FieldCategory::Daily => FieldClass::Daily,
            FieldCategory::Quarterly => FieldClass::Quarterly,
        }
    }
}

/// Where a field's data comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    /// Part of the built-in catalog, served by the default provider groups.
    Predefined,
    /// Declared by the user (appended frame or formula result).
    Custom,
    /// Served by the named external provider api.
    External(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub category: FieldCategory,
    pub source: FieldSource,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, category: FieldCategory, source: FieldSource) -> Self {
        Self {
            name: name.into(),
            category,
            source,
        }
    }
}

/// Composite column key of a panel: (symbol, field).
///
/// Ordering is lexicographic by symbol, then field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnKey {
    pub symbol: String,
    pub field: String,
}

impl ColumnKey {
    pub fn new(symbol: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            field: field.into(),
        }
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.symbol, self.field)
    }
}

/// Price adjustment mode for the market-daily field group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustMode {
    #[default]
    Post,
    Pre,
    None,
}

impl AdjustMode {
    pub fn is_active(self) -> bool {
        !matches!(self, AdjustMode::None)
    }
}

//==============================================================================
// Integer dates
//==============================================================================

/// Convert a `YYYYMMDD` integer into a calendar date.
pub fn to_naive_date(date: Date) -> Option<NaiveDate> {
    if date <= 0 {
        return None;
    }
    let year = (date / 10_000) as i32;
    let month = ((date / 100) % 100) as u32;
    let day = (date % 100) as u32;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Check that an integer is a real `YYYYMMDD` date.
pub fn is_valid_date(date: Date) -> bool {
    to_naive_date(date).is_some()
}
