//! Data view persistence
//!
//! Layout of a stored data view:
//!
//! ```text
//! {dir}/meta_data.json   configuration, registry, symbols, dates, column keys
//! {dir}/data_d.parquet   daily panel, one column per (symbol, field)
//! {dir}/data_q.parquet   quarterly panel, only when one exists
//! ```
//!
//! Parquet columns are named `symbol|field`; the ordered keys in the
//! metadata are authoritative. Files are written to `.tmp` and renamed
//! into place.

use crate::config::DataViewConfig;
use crate::core::dataview::DataView;
use crate::core::lifecycle::PanelState;
use crate::error::{PanelError, PanelResult};
use crate::panel::{Cell, Panel};
use crate::registry::{FieldRegistry, RegistrySnapshot};
use crate::types::{ColumnKey, Date, FieldCategory, REPORT_DATE, TRADE_DATE};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

pub const META_FILE: &str = "meta_data.json";
pub const DAILY_FILE: &str = "data_d.parquet";
pub const QUARTERLY_FILE: &str = "data_q.parquet";

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMeta {
    pub format_version: u32,
    pub config: DataViewConfig,
    pub registry: RegistrySnapshot,
    pub symbols: Vec<String>,
    pub dates: Vec<Date>,
    pub daily_columns: Vec<ColumnKey>,
    #[serde(default)]
    pub quarterly_columns: Option<Vec<ColumnKey>>,
}

fn column_name(key: &ColumnKey) -> String {
    format!("{}|{}", key.symbol, key.field)
}

/// Write `dv` under `dir`, creating the directory if needed.
pub fn save_dataview(dv: &DataView, dir: &Path) -> PanelResult<()> {
    let daily = dv
        .daily()
        .ok_or(PanelError::MissingPanel(FieldCategory::Daily))?;
    fs::create_dir_all(dir)?;

    write_parquet(&panel_to_dataframe(daily)?, &dir.join(DAILY_FILE))?;
    let quarterly_path = dir.join(QUARTERLY_FILE);
    match dv.quarterly() {
        Some(quarterly) => write_parquet(&panel_to_dataframe(quarterly)?, &quarterly_path)?,
        None if quarterly_path.exists() => fs::remove_file(&quarterly_path)?,
        None => {}
    }

    let meta = StoredMeta {
        format_version: FORMAT_VERSION,
        config: dv.config().clone(),
        registry: dv.registry().snapshot(),
        symbols: dv.symbols().to_vec(),
        dates: dv.dates().to_vec(),
        daily_columns: daily.columns().to_vec(),
        quarterly_columns: dv.quarterly().map(|q| q.columns().to_vec()),
    };
    let json = serde_json::to_string_pretty(&meta)?;
    fs::write(dir.join(META_FILE), json)?;

    info!(path = %dir.display(), fields = dv.fields().len(), "data view saved");
    Ok(())
}

/// Read a data view written by [`save_dataview`]. The result has no
/// provider, calendar or membership service attached.
pub fn load_dataview(dir: &Path) -> PanelResult<DataView> {
    let meta_path = dir.join(META_FILE);
    let daily_path = dir.join(DAILY_FILE);
    if !meta_path.exists() || !daily_path.exists() {
        return Err(PanelError::DataUnavailable(format!(
            "No stored data view under {}",
            dir.display()
        )));
    }

    let meta = read_meta(&meta_path)?;
    if meta.format_version != FORMAT_VERSION {
        return Err(PanelError::Persistence(format!(
            "Unsupported data view format version {}",
            meta.format_version
        )));
    }

    let daily = dataframe_to_panel(&read_parquet(&daily_path)?, TRADE_DATE, meta.daily_columns)?;
    let quarterly = match meta.quarterly_columns {
        Some(columns) => {
            let path = dir.join(QUARTERLY_FILE);
            if !path.exists() {
                return Err(PanelError::Persistence(format!(
                    "{} lists a quarterly panel but {} is missing",
                    META_FILE, QUARTERLY_FILE
                )));
            }
            Some(dataframe_to_panel(&read_parquet(&path)?, REPORT_DATE, columns)?)
        }
        None => None,
    };

    let mut registry = FieldRegistry::new();
    registry.restore(meta.registry);

    info!(path = %dir.display(), symbols = meta.symbols.len(), "data view loaded");
    Ok(DataView::from_parts(
        meta.config,
        registry,
        meta.symbols,
        meta.dates,
        PanelState::new(Some(daily), quarterly),
    ))
}

/// Metadata only, without touching the parquet files.
pub fn read_meta(path: &Path) -> PanelResult<StoredMeta> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

impl DataView {
    pub fn save(&self, dir: &Path) -> PanelResult<()> {
        save_dataview(self, dir)
    }

    pub fn load(dir: &Path) -> PanelResult<DataView> {
        load_dataview(dir)
    }
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn panel_to_dataframe(panel: &Panel) -> PanelResult<DataFrame> {
    let mut columns = Vec::with_capacity(panel.n_columns() + 1);
    columns.push(Column::new(
        panel.index_name().into(),
        panel.index().to_vec(),
    ));
    for (key, data) in panel.columns().iter().zip(panel.data()) {
        columns.push(Column::new(column_name(key).into(), data.clone()));
    }
    Ok(DataFrame::new(columns)?)
}

fn dataframe_to_panel(df: &DataFrame, index_name: &str, keys: Vec<ColumnKey>) -> PanelResult<Panel> {
    let index_ca = df.column(index_name)?.i64()?;
    let index = (0..df.height())
        .map(|i| {
            index_ca.get(i).ok_or_else(|| {
                PanelError::Persistence(format!("null {} at row {}", index_name, i))
            })
        })
        .collect::<PanelResult<Vec<Date>>>()?;

    let mut data: Vec<Vec<Cell>> = Vec::with_capacity(keys.len());
    for key in &keys {
        let name = column_name(key);
        let column = df.column(&name).map_err(|_| {
            PanelError::Persistence(format!("Stored panel has no column '{}'", name))
        })?;
        let ca = column.f64()?;
        data.push(ca.into_iter().collect());
    }
    Panel::new(index_name, index, keys, data)
}

fn write_parquet(df: &DataFrame, path: &Path) -> PanelResult<()> {
    let tmp_path = path.with_extension("parquet.tmp");
    let file = fs::File::create(&tmp_path)?;
    ParquetWriter::new(file).finish(&mut df.clone())?;
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        PanelError::Persistence(format!("atomic rename failed: {}", e))
    })
}

fn read_parquet(path: &Path) -> PanelResult<DataFrame> {
    let file = fs::File::open(path)?;
    Ok(ParquetReader::new(file).finish()?)
}
