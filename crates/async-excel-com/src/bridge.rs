//! Subprocess management and JSON IPC for the bridge process.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Stdio};

use excel_com_protocol::{
    CellValue, Command as BridgeCommand, Request, Response, ResponseData, ResponseResult,
};

/// Errors from the Excel COM bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Failed to spawn bridge process: {0}")]
    SpawnFailed(#[from] std::io::Error),

    #[error("Bridge process not running")]
    NotRunning,

    #[error("Failed to send command to bridge: {0}")]
    SendFailed(String),

    #[error("Failed to read response from bridge: {0}")]
    ReadFailed(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Bridge returned error: {0}")]
    BridgeError(String),

    #[error("Unexpected response data")]
    UnexpectedResponse,

    #[error("WINE not found. Install WINE and ensure 'wine' is in PATH.")]
    WineNotFound,

    #[error("Bridge executable not found at: {0}")]
    BridgeExeNotFound(String),
}

/// Configuration for the Excel COM bridge.
#[derive(Debug, Clone)]
pub struct ExcelComConfig {
    /// Path to the `excel-com-bridge.exe` Windows executable.
    /// If None, will search in common locations relative to the current binary.
    pub bridge_exe_path: Option<PathBuf>,

    /// Path to the WINE executable. Defaults to "wine". Ignored on Windows,
    /// where the bridge runs natively.
    pub wine_path: PathBuf,

    /// Optional WINEPREFIX to use (for isolating the WINE environment).
    pub wine_prefix: Option<PathBuf>,
}

impl Default for ExcelComConfig {
    fn default() -> Self {
        Self {
            bridge_exe_path: None,
            wine_path: PathBuf::from("wine"),
            wine_prefix: None,
        }
    }
}

/// A running bridge process with COM initialized on its automation thread.
///
/// Dropping the bridge shuts it down: workbooks are closed, Excel quits and
/// COM is uninitialized.
pub struct ExcelBridge {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    next_id: u64,
    shut_down: bool,
}

impl ExcelBridge {
    /// Start the bridge process and initialize COM.
    pub fn start(config: &ExcelComConfig) -> Result<Self, BridgeError> {
        let exe_path = config
            .bridge_exe_path
            .clone()
            .unwrap_or_else(find_bridge_exe);

        if !exe_path.exists() {
            return Err(BridgeError::BridgeExeNotFound(exe_path.display().to_string()));
        }

        let mut cmd = if cfg!(windows) {
            std::process::Command::new(&exe_path)
        } else {
            let mut cmd = std::process::Command::new(&config.wine_path);
            if let Some(prefix) = &config.wine_prefix {
                cmd.env("WINEPREFIX", prefix);
            }
            cmd.arg(&exe_path);
            cmd
        };
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::inherit()); // Bridge diagnostics go to our stderr

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound && !cfg!(windows) {
                BridgeError::WineNotFound
            } else {
                BridgeError::SpawnFailed(e)
            }
        })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            return Err(BridgeError::NotRunning);
        };

        let mut bridge = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            next_id: 1,
            shut_down: false,
        };

        tracing::info!("Started Excel COM bridge: {}", exe_path.display());
        bridge.send_command(BridgeCommand::Init)?;

        Ok(bridge)
    }

    /// Send a command to the bridge and wait for the response.
    fn send_command(
        &mut self,
        command: BridgeCommand,
    ) -> Result<Option<ResponseData>, BridgeError> {
        let id = self.next_id;
        self.next_id += 1;

        let request = Request { id, command };
        let json = serde_json::to_string(&request)?;
        tracing::trace!("-> {json}");

        writeln!(self.stdin, "{json}").map_err(|e| BridgeError::SendFailed(e.to_string()))?;
        self.stdin
            .flush()
            .map_err(|e| BridgeError::SendFailed(e.to_string()))?;

        let mut line = String::new();
        self.stdout
            .read_line(&mut line)
            .map_err(|e| BridgeError::ReadFailed(e.to_string()))?;
        if line.is_empty() {
            return Err(BridgeError::NotRunning);
        }

        let response: Response = serde_json::from_str(&line)?;
        if response.id != id {
            return Err(BridgeError::UnexpectedResponse);
        }

        match response.result {
            ResponseResult::Ok { data } => Ok(data),
            ResponseResult::Error { message } => Err(BridgeError::BridgeError(message)),
        }
    }

    /// Create an `Excel.Application` instance.
    pub fn launch(&mut self, visible: bool) -> Result<u64, BridgeError> {
        match self.send_command(BridgeCommand::Launch { visible })? {
            Some(ResponseData::AppHandle { app }) => Ok(app),
            _ => Err(BridgeError::UnexpectedResponse),
        }
    }

    /// Open an existing workbook.
    ///
    /// The path should be a path as seen by the bridge; see [`bridge_path`].
    pub fn open_workbook(&mut self, app: u64, path: &str) -> Result<u64, BridgeError> {
        let data = self.send_command(BridgeCommand::OpenWorkbook {
            app,
            path: path.to_string(),
        })?;
        match data {
            Some(ResponseData::WorkbookHandle { workbook }) => Ok(workbook),
            _ => Err(BridgeError::UnexpectedResponse),
        }
    }

    pub fn get_sheet(&mut self, workbook: u64, name: &str) -> Result<u64, BridgeError> {
        let data = self.send_command(BridgeCommand::GetSheet {
            workbook,
            name: name.to_string(),
        })?;
        match data {
            Some(ResponseData::SheetHandle { sheet }) => Ok(sheet),
            _ => Err(BridgeError::UnexpectedResponse),
        }
    }

    /// Read the sheet's used range, row by row.
    pub fn read_used_range(&mut self, sheet: u64) -> Result<Vec<Vec<CellValue>>, BridgeError> {
        match self.send_command(BridgeCommand::ReadUsedRange { sheet })? {
            Some(ResponseData::Range { values }) => Ok(values),
            _ => Err(BridgeError::UnexpectedResponse),
        }
    }

    /// Set a cell at a 1-based position.
    pub fn set_cell_value(
        &mut self,
        sheet: u64,
        row: u32,
        column: u32,
        value: CellValue,
    ) -> Result<(), BridgeError> {
        self.send_command(BridgeCommand::SetCellValue {
            sheet,
            row,
            column,
            value,
        })?;
        Ok(())
    }

    pub fn save_workbook(&mut self, workbook: u64) -> Result<(), BridgeError> {
        self.send_command(BridgeCommand::SaveWorkbook { workbook })?;
        Ok(())
    }

    pub fn close_workbook(&mut self, workbook: u64, save_changes: bool) -> Result<(), BridgeError> {
        self.send_command(BridgeCommand::CloseWorkbook {
            workbook,
            save_changes,
        })?;
        Ok(())
    }

    pub fn quit(&mut self, app: u64) -> Result<(), BridgeError> {
        self.send_command(BridgeCommand::Quit { app })?;
        Ok(())
    }

    /// Shut down the bridge: close all workbooks, quit Excel, and terminate the process.
    pub fn shutdown(mut self) -> Result<(), BridgeError> {
        self.shutdown_inner()
    }

    fn shutdown_inner(&mut self) -> Result<(), BridgeError> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;

        let result = self.send_command(BridgeCommand::Shutdown).map(|_| ());
        // Wait for the child process to exit
        let _ = self.child.wait();
        tracing::info!("Excel COM bridge stopped");
        result
    }
}

impl Drop for ExcelBridge {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown_inner() {
            tracing::error!("Error shutting down Excel COM bridge: {e}");
            let _ = self.child.kill();
        }
    }
}

/// Translate a local path into the path the bridge process sees.
pub fn bridge_path(path: &Path) -> String {
    if cfg!(windows) {
        path.display().to_string()
    } else {
        linux_to_wine_path(path)
    }
}

/// Convert a Linux filesystem path to a WINE (Windows) path.
///
/// WINE maps `/` to `Z:\`, so `/home/user/file.xlsx` becomes `Z:\home\user\file.xlsx`.
/// The WINE prefix's `drive_c` maps to `C:\`.
pub fn linux_to_wine_path(linux_path: &Path) -> String {
    let abs = if linux_path.is_absolute() {
        linux_path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(linux_path)
    };

    // WINE maps the root filesystem to Z:
    format!("Z:{}", abs.display()).replace('/', "\\")
}

/// Attempt to locate the bridge exe relative to the current executable or in common paths.
fn find_bridge_exe() -> PathBuf {
    // Check next to the current executable
    if let Ok(mut exe) = std::env::current_exe() {
        exe.pop();
        let candidate = exe.join("excel-com-bridge.exe");
        if candidate.exists() {
            return candidate;
        }
    }

    // Check in the target directory (for development)
    for profile in ["release", "debug"] {
        let target_path =
            PathBuf::from(format!("target/x86_64-pc-windows-gnu/{profile}/excel-com-bridge.exe"));
        if target_path.exists() {
            return target_path;
        }
    }

    // Default: assume it's in the current directory
    PathBuf::from("excel-com-bridge.exe")
}
