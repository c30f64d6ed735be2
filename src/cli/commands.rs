use crate::config::DataViewConfig;
use crate::core::{DataView, FormulaOptions, NameStyle};
use crate::error::{PanelError, PanelResult};
use crate::panel::FieldFrame;
use crate::registry::FieldRegistry;
use crate::types::{FieldCategory, FieldSource};
use colored::Colorize;
use std::path::{Path, PathBuf};

/// Format a cell for display, removing unnecessary decimal places
fn format_cell(cell: Option<f64>) -> String {
    match cell {
        Some(n) => {
            let rounded = (n * 1e6).round() / 1e6;
            let text = format!("{:.6}", rounded);
            text.trim_end_matches('0').trim_end_matches('.').to_string()
        }
        None => "-".to_string(),
    }
}

/// Print the last `tail` rows of a frame as a dates × symbols table.
fn print_frame(frame: &FieldFrame, tail: usize) {
    let width = frame
        .symbols()
        .iter()
        .map(String::len)
        .max()
        .unwrap_or(0)
        .max(12);

    let mut header = format!("   {:<10}", "date");
    for symbol in frame.symbols() {
        header.push_str(&format!(" {:>width$}", symbol, width = width));
    }
    println!("{}", header.bold());

    let skip = frame.len().saturating_sub(tail);
    for (i, date) in frame.index().iter().enumerate().skip(skip) {
        let mut line = format!("   {:<10}", date);
        for cell in frame.row(i) {
            line.push_str(&format!(" {:>width$}", format_cell(cell), width = width));
        }
        println!("{}", line);
    }
    if skip > 0 {
        println!("   {}", format!("... {} earlier rows", skip).dimmed());
    }
}

fn load(dir: &Path) -> PanelResult<DataView> {
    DataView::load(dir)
}

/// Execute the info command
pub fn info(dir: PathBuf) -> PanelResult<()> {
    let dv = load(&dir)?;
    println!("{}", "📊 Data view".bold().green());
    println!("   Path: {}", dir.display());
    println!(
        "   Range: {} .. {} ({} trading dates)",
        dv.start_date(),
        dv.end_date(),
        dv.dates().len()
    );
    println!("   Symbols: {}", dv.symbols().len());
    if !dv.config().universe.is_empty() {
        println!("   Universe: {}", dv.config().universe.join(",").cyan());
    }

    if let Some(benchmark) = &dv.config().benchmark {
        println!("   Benchmark: {}", benchmark.cyan());
    }

    let quarterly = dv
        .quarterly()
        .map(|q| q.fields())
        .unwrap_or_default();
    println!("\n   {}", "Fields:".bold().cyan());
    for field in dv.fields() {
        let descriptor = dv.registry().descriptor(&field);
        let category = match &descriptor {
            Some(d) => d.category,
            None if quarterly.contains(&field) => FieldCategory::Quarterly,
            None => FieldCategory::Daily,
        };
        let tag = match category {
            FieldCategory::Quarterly => "quarterly".yellow(),
            FieldCategory::Daily => "daily".normal(),
        };
        let source = match descriptor.map(|d| d.source) {
            Some(FieldSource::Custom) => " (custom)".to_string(),
            Some(FieldSource::External(api)) => format!(" ({})", api),
            _ => String::new(),
        };
        println!("      {} [{}]{}", field.bright_blue(), tag, source.dimmed());
    }
    Ok(())
}

/// Execute the get command
pub fn get(
    dir: PathBuf,
    field: String,
    symbols: Vec<String>,
    start: Option<i64>,
    end: Option<i64>,
    tail: usize,
) -> PanelResult<()> {
    let dv = load(&dir)?;
    let symbols = (!symbols.is_empty()).then_some(symbols);
    let frame = dv.get_ts(&field, symbols.as_deref(), start, end)?;
    println!("{} {}", "📈".bold(), field.bright_blue().bold());
    print_frame(&frame, tail);
    Ok(())
}

/// Execute the formula command
#[allow(clippy::too_many_arguments)]
pub fn formula(
    dir: PathBuf,
    name: String,
    expr: String,
    quarterly: bool,
    save: bool,
    overwrite: bool,
    name_style: NameStyle,
    tail: usize,
) -> PanelResult<()> {
    let mut dv = load(&dir)?;
    let options = FormulaOptions {
        persist: save,
        overwrite,
        name_style,
        ..FormulaOptions::default()
    };
    let category = if quarterly {
        FieldCategory::Quarterly
    } else {
        FieldCategory::Daily
    };

    let parsed = crate::core::Formula::parse(&expr, &options.functions)?;
    println!("{}", "🧮 Formula".bold().green());
    println!("   {} = {}", name.bright_blue().bold(), parsed.render(name_style).bright_yellow());

    let result = dv.add_formula(&name, &expr, category, &options)?;
    print_frame(&result, tail);

    if save {
        dv.save(&dir)?;
        println!("\n{}", format!("✅ Field '{}' saved to {}", name, dir.display()).green());
    }
    Ok(())
}

/// Execute the remove command
pub fn remove(dir: PathBuf, field: String) -> PanelResult<()> {
    let mut dv = load(&dir)?;
    if !dv.remove_field(&field) {
        println!("{}", format!("⚠️  Field '{}' does not exist", field).yellow());
        return Ok(());
    }
    dv.save(&dir)?;
    println!("{}", format!("✅ Field '{}' removed", field).green());
    Ok(())
}

/// Execute the fields command - list the built-in catalog
pub fn fields(category: Option<FieldCategory>) -> PanelResult<()> {
    let registry = FieldRegistry::new();
    let categories = match category {
        Some(c) => vec![c],
        None => vec![FieldCategory::Daily, FieldCategory::Quarterly],
    };
    for category in categories {
        println!("{}", format!("📋 {} fields", category).bold().cyan());
        for field in registry.fields_of(category) {
            println!("   {}", field);
        }
        println!();
    }
    Ok(())
}

/// Execute the validate command - check a data view configuration file
pub fn validate(file: PathBuf) -> PanelResult<()> {
    println!("{}", "✅ Validating configuration".bold().green());
    println!("   File: {}\n", file.display());

    let config = DataViewConfig::from_path(&file)?;
    let registry = FieldRegistry::new();
    let unknown: Vec<&String> = config
        .fields
        .iter()
        .filter(|f| !registry.is_predefined(f))
        .collect();

    println!(
        "   Range: {} .. {}, adjust mode {:?}",
        config.start_date, config.end_date, config.adjust_mode
    );
    if config.symbol.is_empty() {
        println!("   Universe: {}", config.universe.join(","));
    } else {
        println!("   Symbols: {}", config.symbol.len());
    }
    if let Some(benchmark) = &config.benchmark {
        println!("   Benchmark: {}", benchmark);
    }
    println!("   Fields: {}", config.fields.len());

    if !unknown.is_empty() {
        let names: Vec<&str> = unknown.iter().map(|s| s.as_str()).collect();
        println!(
            "\n{}",
            format!("❌ Unknown fields: {}", names.join(", ")).bold().red()
        );
        return Err(PanelError::Configuration(format!(
            "No provider serves: {}",
            names.join(", ")
        )));
    }
    println!("\n{}", "✅ Configuration is valid".bold().green());
    Ok(())
}
