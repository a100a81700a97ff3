//! Excel COM automation backend for `async-excel`.
//!
//! This crate spawns a Windows `.exe` that automates Excel through COM (under
//! WINE when running on Linux), communicating over JSON-over-stdio. [`ExcelCom`]
//! implements [`async_excel::Automation`], so it plugs straight into
//! [`async_excel::AsyncWorkbook`].
//!
//! # Architecture
//!
//! ```text
//! AsyncWorkbook watch task
//!     └── ExcelComSession (this crate)
//!           └── spawns: [wine] excel-com-bridge.exe
//!                 └── COM: Excel.Application
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use async_excel::{AsyncWorkbook, OpenOptions};
//! use async_excel_com::{ExcelCom, ExcelComConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let excel = ExcelCom::new(ExcelComConfig::default());
//! let workbook =
//!     AsyncWorkbook::open(excel, "report.xlsx", "Sheet1", OpenOptions::default()).await?;
//! workbook.wait_until_connected().await?;
//! workbook.write_cell(0, 0, "Hello").await?;
//! workbook.save().await?;
//! workbook.close().await;
//! # Ok(())
//! # }
//! ```

mod bridge;
mod session;

pub use bridge::{bridge_path, linux_to_wine_path, BridgeError, ExcelBridge, ExcelComConfig};
pub use session::{ExcelCom, ExcelComSession};
