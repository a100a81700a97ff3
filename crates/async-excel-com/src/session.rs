//! `async_excel` automation backend over the bridge process.

use std::path::Path;

use async_excel::{
    AppHandle, Automation, AutomationError, CellValue, DocumentHandle, Session, SheetHandle,
};
use excel_com_protocol::{CellError, CellValue as WireValue};

use crate::bridge::{bridge_path, ExcelBridge, ExcelComConfig};

/// Excel automation through the COM bridge.
///
/// Each [`Automation::initialize`] starts a dedicated bridge process, so every
/// watch task owns its own COM apartment.
#[derive(Debug, Clone, Default)]
pub struct ExcelCom {
    config: ExcelComConfig,
}

impl ExcelCom {
    pub fn new(config: ExcelComConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExcelComConfig {
        &self.config
    }
}

impl Automation for ExcelCom {
    type Session = ExcelComSession;

    fn initialize(&self) -> Result<ExcelComSession, AutomationError> {
        let bridge = ExcelBridge::start(&self.config).map_err(AutomationError::new)?;
        Ok(ExcelComSession { bridge })
    }
}

/// A live bridge process. Dropping it uninitializes COM and ends the process.
pub struct ExcelComSession {
    bridge: ExcelBridge,
}

impl Session for ExcelComSession {
    fn launch(&mut self, visible: bool) -> Result<AppHandle, AutomationError> {
        self.bridge
            .launch(visible)
            .map(AppHandle::new)
            .map_err(AutomationError::new)
    }

    fn open_document(
        &mut self,
        app: AppHandle,
        path: &Path,
    ) -> Result<DocumentHandle, AutomationError> {
        self.bridge
            .open_workbook(app.raw(), &bridge_path(path))
            .map(DocumentHandle::new)
            .map_err(AutomationError::new)
    }

    fn sheet_by_name(
        &mut self,
        document: DocumentHandle,
        name: &str,
    ) -> Result<SheetHandle, AutomationError> {
        self.bridge
            .get_sheet(document.raw(), name)
            .map(SheetHandle::new)
            .map_err(AutomationError::new)
    }

    fn read_used_range(
        &mut self,
        sheet: SheetHandle,
    ) -> Result<Vec<Vec<CellValue>>, AutomationError> {
        let rows = self
            .bridge
            .read_used_range(sheet.raw())
            .map_err(AutomationError::new)?;
        Ok(rows
            .into_iter()
            .map(|row| row.into_iter().map(from_wire).collect())
            .collect())
    }

    fn write_cell(
        &mut self,
        sheet: SheetHandle,
        row: u32,
        column: u32,
        value: &CellValue,
    ) -> Result<(), AutomationError> {
        self.bridge
            .set_cell_value(sheet.raw(), row, column, to_wire(value))
            .map_err(AutomationError::new)
    }

    fn save(&mut self, document: DocumentHandle) -> Result<(), AutomationError> {
        self.bridge
            .save_workbook(document.raw())
            .map_err(AutomationError::new)
    }

    fn close_document(
        &mut self,
        document: DocumentHandle,
        save_changes: bool,
    ) -> Result<(), AutomationError> {
        self.bridge
            .close_workbook(document.raw(), save_changes)
            .map_err(AutomationError::new)
    }

    fn quit(&mut self, app: AppHandle) -> Result<(), AutomationError> {
        self.bridge.quit(app.raw()).map_err(AutomationError::new)
    }
}

fn from_wire(value: WireValue) -> CellValue {
    match value {
        WireValue::Null => CellValue::Empty,
        WireValue::Bool(b) => CellValue::Bool(b),
        WireValue::Number(n) => CellValue::Number(n),
        WireValue::String(s) => CellValue::String(s),
        WireValue::Error(e) => CellValue::Error(e.code),
    }
}

fn to_wire(value: &CellValue) -> WireValue {
    match value {
        CellValue::Empty => WireValue::Null,
        CellValue::Bool(b) => WireValue::Bool(*b),
        CellValue::Number(n) => WireValue::Number(*n),
        CellValue::String(s) => WireValue::String(s.clone()),
        CellValue::Error(code) => WireValue::Error(CellError { code: code.clone() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_moves_between_threads() {
        fn assert_send<T: Send + 'static>() {}
        assert_send::<ExcelComSession>();
    }

    #[test]
    fn test_wire_values_map_to_cell_values() {
        assert_eq!(from_wire(WireValue::Null), CellValue::Empty);
        assert_eq!(from_wire(WireValue::Number(1.5)), CellValue::Number(1.5));
        assert_eq!(
            from_wire(WireValue::Error(CellError { code: "#DIV/0!".into() })),
            CellValue::Error("#DIV/0!".into())
        );
    }

    #[test]
    fn test_cell_values_map_to_wire_values() {
        assert_eq!(to_wire(&CellValue::Empty), WireValue::Null);
        assert_eq!(to_wire(&CellValue::from(true)), WireValue::Bool(true));
        assert_eq!(to_wire(&CellValue::from("x")), WireValue::String("x".into()));
    }
}
