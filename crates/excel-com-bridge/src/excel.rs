//! Excel-specific COM automation layer built on top of the generic IDispatch wrapper.

#![cfg(windows)]

use std::collections::HashMap;

use windows::Win32::System::Variant::VARIANT;

use excel_com_protocol::{CellError, CellValue};

use crate::dispatch::{
    variant_bool, variant_empty, variant_f64, variant_get_bool, variant_get_error_code,
    variant_get_f64, variant_get_rows, variant_get_string, variant_i32, variant_is_empty,
    variant_str, DispatchObject,
};
use crate::grid::scalar_rows;

struct Workbook {
    object: DispatchObject,
    app: u64,
}

struct Sheet {
    object: DispatchObject,
    workbook: u64,
}

/// Every COM object handed out to the client, keyed by handle.
///
/// Handles are never reused within one bridge process.
pub struct ExcelSession {
    apps: HashMap<u64, DispatchObject>,
    workbooks: HashMap<u64, Workbook>,
    sheets: HashMap<u64, Sheet>,
    next_handle: u64,
}

impl ExcelSession {
    pub fn new() -> Self {
        Self {
            apps: HashMap::new(),
            workbooks: HashMap::new(),
            sheets: HashMap::new(),
            next_handle: 1,
        }
    }

    fn allocate(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    /// Create a new Excel.Application instance. Returns the handle ID.
    pub fn launch(&mut self, visible: bool) -> Result<u64, String> {
        let app = DispatchObject::create_from_progid("Excel.Application")?;

        app.set_property("Visible", variant_bool(visible))?;
        // No modal prompts while automated
        app.set_property("DisplayAlerts", variant_bool(false))?;

        let handle = self.allocate();
        self.apps.insert(handle, app);
        Ok(handle)
    }

    /// Open a workbook from a file path. Returns the handle ID.
    pub fn open_workbook(&mut self, app_handle: u64, path: &str) -> Result<u64, String> {
        let app = self
            .apps
            .get(&app_handle)
            .ok_or_else(|| format!("Unknown app handle: {app_handle}"))?;
        let object = app
            .get_child("Workbooks")?
            .invoke_child("Open", &[variant_str(path)])?;
        let handle = self.allocate();
        self.workbooks.insert(
            handle,
            Workbook {
                object,
                app: app_handle,
            },
        );
        Ok(handle)
    }

    /// Look a worksheet up by name. Returns the handle ID.
    pub fn get_sheet(&mut self, wb_handle: u64, name: &str) -> Result<u64, String> {
        let wb = self.workbook(wb_handle)?;
        let object = wb
            .object
            .get_child("Worksheets")?
            .get_indexed("Item", &[variant_str(name)])
            .map_err(|e| format!("Worksheet '{name}' not found: {e}"))?;
        let handle = self.allocate();
        self.sheets.insert(
            handle,
            Sheet {
                object,
                workbook: wb_handle,
            },
        );
        Ok(handle)
    }

    /// Read `UsedRange.Value`. A single-cell used range comes back as a
    /// scalar; see [`scalar_rows`].
    pub fn read_used_range(&self, sheet_handle: u64) -> Result<Vec<Vec<CellValue>>, String> {
        let sheet = self.sheet(sheet_handle)?;
        let value = sheet.get_child("UsedRange")?.get_property("Value")?;

        match variant_get_rows(&value)? {
            Some(rows) => Ok(rows
                .iter()
                .map(|row| row.iter().map(variant_to_cell_value).collect())
                .collect()),
            None => Ok(scalar_rows(variant_to_cell_value(&value))),
        }
    }

    /// Set a cell's value at a 1-based position.
    pub fn set_cell_value(
        &self,
        sheet_handle: u64,
        row: u32,
        column: u32,
        value: &CellValue,
    ) -> Result<(), String> {
        let row = i32::try_from(row).map_err(|_| format!("Row out of range: {row}"))?;
        let column = i32::try_from(column).map_err(|_| format!("Column out of range: {column}"))?;
        let cell = self
            .sheet(sheet_handle)?
            .get_indexed("Cells", &[variant_i32(row), variant_i32(column)])?;
        cell.set_property("Value", cell_value_to_variant(value))
    }

    /// Save a workbook in place.
    pub fn save_workbook(&self, wb_handle: u64) -> Result<(), String> {
        self.workbook(wb_handle)?
            .object
            .invoke_method("Save", &[])?;
        Ok(())
    }

    /// Close a workbook and forget its sheets.
    pub fn close_workbook(&mut self, wb_handle: u64, save_changes: bool) -> Result<(), String> {
        let wb = self
            .workbooks
            .remove(&wb_handle)
            .ok_or_else(|| format!("Unknown workbook handle: {wb_handle}"))?;
        self.sheets.retain(|_, sheet| sheet.workbook != wb_handle);
        wb.object
            .invoke_method("Close", &[variant_bool(save_changes)])?;
        Ok(())
    }

    /// Quit an application instance, dropping every handle that belongs to it.
    pub fn quit(&mut self, app_handle: u64) -> Result<(), String> {
        let app = self
            .apps
            .remove(&app_handle)
            .ok_or_else(|| format!("Unknown app handle: {app_handle}"))?;
        let orphaned: Vec<u64> = self
            .workbooks
            .iter()
            .filter(|(_, wb)| wb.app == app_handle)
            .map(|(handle, _)| *handle)
            .collect();
        for handle in orphaned {
            self.workbooks.remove(&handle);
            self.sheets.retain(|_, sheet| sheet.workbook != handle);
        }
        app.invoke_method("Quit", &[])?;
        Ok(())
    }

    /// Shut down: close all workbooks without saving and quit every instance.
    pub fn shutdown(mut self) -> Result<(), String> {
        let workbooks: Vec<u64> = self.workbooks.keys().copied().collect();
        for handle in workbooks {
            if let Err(e) = self.close_workbook(handle, false) {
                eprintln!("[excel-com-bridge] close workbook {handle} failed: {e}");
            }
        }

        let mut result = Ok(());
        let apps: Vec<u64> = self.apps.keys().copied().collect();
        for handle in apps {
            if let Err(e) = self.quit(handle) {
                result = Err(e);
            }
        }
        result
    }

    fn workbook(&self, handle: u64) -> Result<&Workbook, String> {
        self.workbooks
            .get(&handle)
            .ok_or_else(|| format!("Unknown workbook handle: {handle}"))
    }

    fn sheet(&self, handle: u64) -> Result<&DispatchObject, String> {
        self.sheets
            .get(&handle)
            .map(|sheet| &sheet.object)
            .ok_or_else(|| format!("Unknown sheet handle: {handle}"))
    }
}

/// Convert our protocol CellValue to a COM VARIANT.
fn cell_value_to_variant(value: &CellValue) -> VARIANT {
    match value {
        CellValue::Null => variant_empty(),
        CellValue::Bool(b) => variant_bool(*b),
        CellValue::Number(n) => variant_f64(*n),
        CellValue::String(s) => variant_str(s),
        // Error values can't be assigned; write their text instead
        CellValue::Error(e) => variant_str(&e.code),
    }
}

/// Convert a COM VARIANT to our protocol CellValue.
fn variant_to_cell_value(variant: &VARIANT) -> CellValue {
    if variant_is_empty(variant) {
        CellValue::Null
    } else if let Some(b) = variant_get_bool(variant) {
        CellValue::Bool(b)
    } else if let Some(n) = variant_get_f64(variant) {
        CellValue::Number(n)
    } else if let Some(s) = variant_get_string(variant) {
        CellValue::String(s)
    } else if let Some(code) = variant_get_error_code(variant) {
        CellValue::Error(CellError {
            code: error_code_text(code),
        })
    } else {
        CellValue::Null
    }
}

/// Excel's `CVErr` codes.
fn error_code_text(code: u16) -> String {
    match code {
        2000 => "#NULL!".to_string(),
        2007 => "#DIV/0!".to_string(),
        2015 => "#VALUE!".to_string(),
        2023 => "#REF!".to_string(),
        2029 => "#NAME?".to_string(),
        2036 => "#NUM!".to_string(),
        2042 => "#N/A".to_string(),
        other => format!("#ERR({other})"),
    }
}
