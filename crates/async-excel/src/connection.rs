//! Connection manager: owns the application, document and sheet handles.

use std::path::{Path, PathBuf};

use crate::automation::{AppHandle, DocumentHandle, Session, SheetHandle};
use crate::error::{Error, Result};
use crate::snapshot::Snapshot;
use crate::value::CellValue;

/// Establishes and tears down the connection to one document's sheet.
///
/// Every method here talks to the application synchronously. Callers hold
/// the workbook lock around them so no two automation calls overlap.
pub struct ConnectionManager<S: Session> {
    path: PathBuf,
    visible: bool,
    session: Option<S>,
    app: Option<AppHandle>,
    document: Option<DocumentHandle>,
    sheet: Option<SheetHandle>,
}

impl<S: Session> ConnectionManager<S> {
    pub fn new(path: impl Into<PathBuf>, visible: bool) -> Self {
        Self {
            path: path.into(),
            visible,
            session: None,
            app: None,
            document: None,
            sheet: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hand over the platform context acquired by the watch loop.
    pub fn attach(&mut self, session: S) {
        self.session = Some(session);
    }

    /// Take the platform context back. Handles must already be released.
    pub fn detach(&mut self) -> Option<S> {
        self.session.take()
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_connected(&self) -> bool {
        self.document.is_some() && self.sheet.is_some()
    }

    /// Launch the application, open the document and resolve `sheet_name`.
    ///
    /// Returns `false` on any failure, after undoing whatever was opened.
    pub fn connect(&mut self, sheet_name: &str) -> bool {
        if self.is_connected() {
            return true;
        }
        let Some(session) = self.session.as_mut() else {
            tracing::warn!("Cannot connect: automation is not initialized");
            return false;
        };

        let app = match session.launch(self.visible) {
            Ok(app) => app,
            Err(e) => {
                tracing::warn!("Failed to launch spreadsheet application: {e}");
                return false;
            }
        };

        let document = match session.open_document(app, &self.path) {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!("Failed to open {}: {e}", self.path.display());
                quit_quietly(session, app);
                return false;
            }
        };

        match session.sheet_by_name(document, sheet_name) {
            Ok(sheet) => {
                tracing::info!("Connected to sheet '{sheet_name}' in {}", self.path.display());
                self.app = Some(app);
                self.document = Some(document);
                self.sheet = Some(sheet);
                true
            }
            Err(e) => {
                tracing::warn!("Sheet '{sheet_name}' not available: {e}");
                if let Err(e) = session.close_document(document, false) {
                    tracing::warn!("Failed to close document after connect error: {e}");
                }
                quit_quietly(session, app);
                false
            }
        }
    }

    /// Close the document and quit the application. Always clears the handles.
    pub fn disconnect(&mut self, save_changes: bool) {
        let app = self.app.take();
        let document = self.document.take();
        self.sheet = None;

        let Some(session) = self.session.as_mut() else {
            return;
        };

        if let Some(document) = document {
            if let Err(e) = session.close_document(document, save_changes) {
                tracing::error!("Error closing document: {e}");
            }
        }
        if let Some(app) = app {
            if let Err(e) = session.quit(app) {
                tracing::error!("Error quitting spreadsheet application: {e}");
            }
        }
    }

    /// Read the sheet's used range.
    pub fn read_snapshot(&mut self) -> Result<Snapshot> {
        let (session, sheet) = self.connected_sheet()?;
        let rows = session.read_used_range(sheet)?;
        Ok(Snapshot::from_rows(rows))
    }

    /// Write `value` at a 0-based position.
    pub fn write_cell(&mut self, row: u32, column: u32, value: &CellValue) -> Result<()> {
        let (session, sheet) = self.connected_sheet()?;
        let (Some(excel_row), Some(excel_column)) = (row.checked_add(1), column.checked_add(1))
        else {
            return Err(Error::InvalidCell { row, column });
        };
        session.write_cell(sheet, excel_row, excel_column, value)?;
        Ok(())
    }

    /// Save the document. Does nothing when not connected.
    pub fn save(&mut self) -> Result<()> {
        let (Some(session), Some(document)) = (self.session.as_mut(), self.document) else {
            return Ok(());
        };
        session.save(document)?;
        Ok(())
    }

    fn connected_sheet(&mut self) -> Result<(&mut S, SheetHandle)> {
        match (self.session.as_mut(), self.sheet) {
            (Some(session), Some(sheet)) => Ok((session, sheet)),
            _ => Err(Error::NotConnected),
        }
    }
}

fn quit_quietly<S: Session>(session: &mut S, app: AppHandle) {
    if let Err(e) = session.quit(app) {
        tracing::warn!("Failed to quit application after connect error: {e}");
    }
}
