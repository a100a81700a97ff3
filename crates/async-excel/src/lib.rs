//! # async-excel
//!
//! Treat a live spreadsheet document as an asynchronously refreshed data source.
//!
//! [`AsyncWorkbook::open`] validates the file, then spawns a watch loop that
//! connects to the spreadsheet application (retrying a bounded number of
//! times) and re-reads the sheet's used range every interval into a cache.
//! Reads come from that cache and never block on the application; writes and
//! saves go to the live document under the same lock the loop uses for its
//! reads.
//!
//! The application itself is reached through the [`Automation`] and
//! [`Session`] traits. The `async-excel-com` crate implements them for
//! Microsoft Excel.
//!
//! ## Example
//!
//! ```rust,ignore
//! use async_excel::{AsyncWorkbook, OpenOptions};
//! use async_excel_com::{ExcelCom, ExcelComConfig};
//!
//! # async fn example() -> async_excel::Result<()> {
//! let excel = ExcelCom::new(ExcelComConfig::default());
//! let workbook =
//!     AsyncWorkbook::open(excel, "report.xlsx", "Sheet1", OpenOptions::default()).await?;
//!
//! workbook.wait_until_connected().await?;
//! if let Some(snapshot) = workbook.read_data() {
//!     println!("{} rows", snapshot.row_count());
//! }
//!
//! workbook.write_cell(0, 0, 42).await?;
//! workbook.save().await?;
//! workbook.close().await;
//! # Ok(())
//! # }
//! ```

pub mod automation;
pub mod connection;
pub mod error;
pub mod options;
pub mod snapshot;
pub mod value;
pub mod watch;
pub mod workbook;

pub use automation::{AppHandle, Automation, DocumentHandle, Session, SheetHandle};
pub use connection::ConnectionManager;
pub use error::{AutomationError, Error, Result};
pub use options::{validate_document_path, OpenOptions, SUPPORTED_EXTENSIONS};
pub use snapshot::{Snapshot, SnapshotCache};
pub use value::CellValue;
pub use watch::WatchState;
pub use workbook::AsyncWorkbook;
