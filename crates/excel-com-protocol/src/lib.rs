//! Shared protocol types for communication between the native client and the
//! Windows COM bridge process (run directly on Windows, or under WINE).
//!
//! The protocol is JSON-over-stdio: one JSON object per line in each direction.
//! Cell rows and columns are 1-based, as in Excel.

use serde::{Deserialize, Serialize};

/// A command sent from the client to the bridge process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Monotonically increasing request ID for correlating responses.
    pub id: u64,
    /// The command to execute.
    #[serde(flatten)]
    pub command: Command,
}

/// Commands the client can send to the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "params")]
pub enum Command {
    /// Initialize COM on the bridge's automation thread.
    Init,

    /// Create an `Excel.Application` instance. Returns an app handle.
    Launch { visible: bool },

    /// Open an existing workbook from a file path (Windows path). Returns a workbook handle.
    OpenWorkbook { app: u64, path: String },

    /// Look a worksheet up by name. Returns a sheet handle.
    GetSheet { workbook: u64, name: String },

    /// Read `UsedRange.Value` of a sheet as rows of values.
    ReadUsedRange { sheet: u64 },

    /// Set a cell's value (number, string, bool or empty) at a 1-based position.
    SetCellValue {
        sheet: u64,
        row: u32,
        column: u32,
        value: CellValue,
    },

    /// Save the workbook in place.
    SaveWorkbook { workbook: u64 },

    /// Close a workbook, optionally saving changes.
    CloseWorkbook { workbook: u64, save_changes: bool },

    /// Quit an application instance.
    Quit { app: u64 },

    /// Shut down the bridge: close all workbooks, quit Excel, uninitialize COM.
    Shutdown,
}

/// A cell value that can be sent to/from Excel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Error(CellError),
}

/// Excel error values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellError {
    pub code: String,
}

/// A response sent from the bridge back to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// The request ID this response corresponds to.
    pub id: u64,
    /// The result of the command.
    #[serde(flatten)]
    pub result: ResponseResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum ResponseResult {
    #[serde(rename = "ok")]
    Ok {
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<ResponseData>,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

/// Data returned in successful responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseData {
    /// Handle to a newly created application instance.
    AppHandle { app: u64 },
    /// Handle to a newly opened workbook.
    WorkbookHandle { workbook: u64 },
    /// Handle to a worksheet.
    SheetHandle { sheet: u64 },
    /// The values of a range, row by row.
    Range { values: Vec<Vec<CellValue>> },
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Null => write!(f, "<empty>"),
            CellValue::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::String(s) => write!(f, "{s}"),
            CellValue::Error(e) => write!(f, "{}", e.code),
        }
    }
}
