use clap::{Parser, Subcommand};
use panelview::cli;
use panelview::core::NameStyle;
use panelview::types::FieldCategory;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "panelview")]
#[command(about = "Inspect stored data views and evaluate panel formulas.")]
#[command(long_about = "panelview - point-in-time financial panels

A data view holds a daily panel (trade date x symbol x field) and a
quarterly panel (report date x symbol x field). Quarterly values become
visible on the daily calendar only from their announcement date.

COMMANDS:
  info      - Summarise a stored data view
  get       - Print one field as dates x symbols
  formula   - Evaluate a formula, optionally saving it as a field
  remove    - Drop a field from a stored data view
  fields    - List the built-in field catalog
  validate  - Check a data view configuration file

EXAMPLES:
  panelview info ./dv
  panelview get ./dv --field close --symbol 600000.SH --start 20200301
  panelview formula ./dv --name mom --expr \"Rank(close / Delay(close, 20))\" --save
  panelview formula ./dv --name roe_chg --expr \"roe - Delay(roe, 1)\" --quarterly

Set RUST_LOG to control log output (default: panelview=info).")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarise a stored data view
    Info {
        /// Data view directory
        dir: PathBuf,
    },

    /// Print one daily field as dates x symbols
    Get {
        dir: PathBuf,

        #[arg(short, long)]
        field: String,

        /// Restrict to these symbols (repeat or comma separate)
        #[arg(short, long, value_delimiter = ',')]
        symbol: Vec<String>,

        #[arg(long)]
        start: Option<i64>,

        #[arg(long)]
        end: Option<i64>,

        /// Number of trailing rows to print
        #[arg(long, default_value = "10")]
        tail: usize,
    },

    #[command(long_about = "Evaluate a formula against a stored data view.

Variables are field names of the data view. Functions are matched
case-insensitively: Delay, Delta, Return, Ts_Sum, Ts_Mean, Ts_Max,
Ts_Min, StdDev, Ts_Rank, Correlation, Rank, Percentile, Standardize,
Cutoff, GroupRank, Quantile, Abs, Log, Exp, Sqrt, Sign, Pow, Max, Min,
If, IsNan. Constants: PI, E.

With --quarterly, quarterly variables are read on report dates. If
every variable is quarterly the result is computed there and expanded
to the daily calendar by announcement date.

With --save the result is stored as a new field and the data view is
written back.")]
    /// Evaluate a formula, optionally saving it as a field
    Formula {
        dir: PathBuf,

        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        expr: String,

        #[arg(short, long)]
        quarterly: bool,

        /// Store the result in the data view
        #[arg(long)]
        save: bool,

        /// Fail instead of replacing an existing field
        #[arg(long)]
        no_overwrite: bool,

        /// Function name casing used when echoing the formula
        #[arg(long, default_value = "camel")]
        name_style: NameStyle,

        #[arg(long, default_value = "10")]
        tail: usize,
    },

    /// Drop a field from a stored data view
    Remove { dir: PathBuf, field: String },

    /// List the built-in field catalog
    Fields {
        /// daily or quarterly
        #[arg(short, long, value_parser = parse_category)]
        category: Option<FieldCategory>,
    },

    /// Check a data view configuration file
    Validate { file: PathBuf },
}

fn parse_category(s: &str) -> Result<FieldCategory, String> {
    match s.to_lowercase().as_str() {
        "daily" => Ok(FieldCategory::Daily),
        "quarterly" => Ok(FieldCategory::Quarterly),
        other => Err(format!("unknown category '{}', expected daily or quarterly", other)),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "panelview=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Info { dir } => cli::info(dir)?,

        Commands::Get {
            dir,
            field,
            symbol,
            start,
            end,
            tail,
        } => cli::get(dir, field, symbol, start, end, tail)?,

        Commands::Formula {
            dir,
            name,
            expr,
            quarterly,
            save,
            no_overwrite,
            name_style,
            tail,
        } => cli::formula(dir, name, expr, quarterly, save, !no_overwrite, name_style, tail)?,

        Commands::Remove { dir, field } => cli::remove(dir, field)?,

        Commands::Fields { category } => cli::fields(category)?,

        Commands::Validate { file } => cli::validate(file)?,
    }
    Ok(())
}
