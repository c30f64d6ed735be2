//! panelview - point-in-time financial panel data
//!
//! A [`DataView`] reconciles heterogeneous provider results into two
//! composite-keyed panels:
//!
//! - a daily panel indexed by trade date, one column per `(symbol, field)`
//! - a quarterly panel indexed by report date, carrying `ann_date`
//!
//! Quarterly fields are expanded onto the trading calendar by announcement
//! date so no report is visible before it was published. Derived fields are
//! written in a small formula language with time-series and
//! cross-sectional functions.
//!
//! # Example
//!
//! ```no_run
//! use panelview::config::DataViewConfig;
//! use panelview::core::{DataView, FormulaOptions};
//! use panelview::provider::StaticCalendar;
//! use panelview::types::FieldCategory;
//! # use panelview::provider::{DataProvider, QueryRequest, QueryResponse};
//! # struct Warehouse;
//! # impl DataProvider for Warehouse {
//! #     fn query(&self, _: &QueryRequest) -> panelview::PanelResult<QueryResponse> {
//! #         Ok(QueryResponse::default())
//! #     }
//! # }
//! # fn provider() -> Warehouse { Warehouse }
//!
//! let config = DataViewConfig::new(20200101, 20200630)
//!     .with_symbols(&["000001.SZ", "600000.SH"])
//!     .with_fields(&["close", "roe"]);
//! let mut dv = DataView::new(config)?
//!     .with_provider(provider())
//!     .with_calendar(StaticCalendar::new(vec![20200102, 20200103]));
//! dv.prepare_data()?;
//!
//! let momentum = dv.add_formula(
//!     "mom",
//!     "Rank(close / Delay(close, 1))",
//!     FieldCategory::Daily,
//!     &FormulaOptions::persisted(),
//! )?;
//! println!("{} dates", momentum.len());
//! # Ok::<(), panelview::error::PanelError>(())
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod panel;
pub mod persist;
pub mod provider;
pub mod registry;
pub mod types;

// Re-export commonly used types
pub use crate::core::{DataView, FormulaOptions};
pub use error::{PanelError, PanelResult};
pub use panel::{FieldFrame, Panel};
pub use types::{Date, FieldCategory};
