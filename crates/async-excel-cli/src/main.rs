//! async-excel CLI - watch and edit live Excel workbooks

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_excel::{AsyncWorkbook, CellValue, OpenOptions, Snapshot, WatchState};
use async_excel_com::{ExcelCom, ExcelComConfig};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "async-excel")]
#[command(author, version, about = "Watch and edit live Excel workbooks")]
struct Cli {
    #[command(flatten)]
    bridge: BridgeArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct BridgeArgs {
    /// Path to excel-com-bridge.exe (default: search next to this binary)
    #[arg(long, global = true)]
    bridge_exe: Option<PathBuf>,

    /// WINE executable used to run the bridge on non-Windows hosts
    #[arg(long, global = true, default_value = "wine")]
    wine: PathBuf,

    /// WINEPREFIX for the bridge process
    #[arg(long, global = true)]
    wine_prefix: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the sheet every time its contents are refreshed, until Ctrl-C
    Watch {
        /// Workbook file (xlsx, xls)
        file: PathBuf,

        /// Sheet name
        #[arg(short, long)]
        sheet: String,

        /// Seconds between refreshes
        #[arg(short, long, default_value = "1.0")]
        interval: f64,

        /// Keep the Excel window hidden
        #[arg(long)]
        hidden: bool,

        /// Discard changes when closing
        #[arg(long)]
        no_save_on_close: bool,

        /// Number of rows to print per refresh
        #[arg(short, long, default_value = "5")]
        rows: usize,

        /// Print rows as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write one cell (0-based row and column) and save the workbook
    Set {
        /// Workbook file (xlsx, xls)
        file: PathBuf,

        /// Sheet name
        #[arg(short, long)]
        sheet: String,

        #[arg(long)]
        row: u32,

        #[arg(long)]
        column: u32,

        /// New value: a number, TRUE/FALSE, or text. Empty clears the cell.
        value: String,

        /// Keep the Excel window hidden
        #[arg(long)]
        hidden: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let excel = ExcelCom::new(bridge_config(cli.bridge));

    match cli.command {
        Commands::Watch {
            file,
            sheet,
            interval,
            hidden,
            no_save_on_close,
            rows,
            json,
        } => {
            let options = OpenOptions {
                visible: !hidden,
                save_on_close: !no_save_on_close,
                update_interval: parse_interval(interval)?,
                ..Default::default()
            };
            watch(excel, file, sheet, options, rows, json).await
        }
        Commands::Set {
            file,
            sheet,
            row,
            column,
            value,
            hidden,
        } => {
            let options = OpenOptions {
                visible: !hidden,
                ..Default::default()
            };
            set(excel, file, sheet, options, row, column, parse_value(&value)).await
        }
    }
}

fn bridge_config(args: BridgeArgs) -> ExcelComConfig {
    ExcelComConfig {
        bridge_exe_path: args.bridge_exe,
        wine_path: args.wine,
        wine_prefix: args.wine_prefix,
    }
}

async fn watch(
    excel: ExcelCom,
    file: PathBuf,
    sheet: String,
    options: OpenOptions,
    rows: usize,
    json: bool,
) -> Result<()> {
    let workbook = AsyncWorkbook::open(excel, &file, sheet, options)
        .await
        .with_context(|| format!("Failed to open '{}'", file.display()))?;

    let mut updates = workbook.subscribe();
    let mut states = workbook.subscribe_state();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let outcome = loop {
        tokio::select! {
            _ = &mut ctrl_c => break Ok(()),
            changed = updates.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let snapshot = updates.borrow_and_update().clone();
                if let Some(snapshot) = snapshot {
                    if let Err(e) = print_snapshot(&snapshot, rows, json) {
                        break Err(e);
                    }
                }
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let state = *states.borrow_and_update();
                if state == WatchState::Failed {
                    break Err(anyhow::anyhow!(
                        "Gave up connecting to '{}' after {} attempts",
                        workbook.sheet_name(),
                        workbook.options().max_retries
                    ));
                }
            }
        }
    };

    workbook.close().await;
    outcome
}

async fn set(
    excel: ExcelCom,
    file: PathBuf,
    sheet: String,
    options: OpenOptions,
    row: u32,
    column: u32,
    value: CellValue,
) -> Result<()> {
    let workbook = AsyncWorkbook::open(excel, &file, sheet, options)
        .await
        .with_context(|| format!("Failed to open '{}'", file.display()))?;

    let result = async {
        workbook
            .wait_until_connected()
            .await
            .context("Could not connect to the sheet")?;
        workbook
            .write_cell(row, column, value)
            .await
            .with_context(|| format!("Failed to write cell ({row}, {column})"))?;
        workbook.save().await.context("Failed to save workbook")?;
        anyhow::Ok(())
    }
    .await;

    workbook.close().await;
    result
}

fn print_snapshot(snapshot: &Snapshot, rows: usize, json: bool) -> Result<()> {
    let head = snapshot.head(rows);
    if json {
        println!("{}", serde_json::to_string(head)?);
        return Ok(());
    }

    println!(
        "--- {} rows x {} columns ---",
        snapshot.row_count(),
        snapshot.column_count()
    );
    for row in head {
        let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
        println!("{}", cells.join("\t"));
    }
    Ok(())
}

/// Convert `--interval` seconds into a non-zero duration.
fn parse_interval(secs: f64) -> Result<Duration> {
    let interval = Duration::try_from_secs_f64(secs)
        .with_context(|| format!("invalid --interval {secs}"))?;
    if interval.is_zero() {
        bail!("--interval must be a positive number of seconds");
    }
    Ok(interval)
}

/// Interpret a command-line value the way Excel would interpret typed input.
fn parse_value(raw: &str) -> CellValue {
    if raw.is_empty() {
        return CellValue::Empty;
    }
    if raw.eq_ignore_ascii_case("true") {
        return CellValue::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return CellValue::Bool(false);
    }
    match raw.parse::<f64>() {
        Ok(n) if n.is_finite() => CellValue::Number(n),
        _ => CellValue::from(raw),
    }
}
