//! The automation boundary: what this crate needs from a spreadsheet application.
//!
//! Backends (Excel over COM, a test fake, ...) implement [`Automation`] to
//! acquire a per-task platform context, and [`Session`] for the calls made
//! inside it. All `Session` methods are synchronous and may block; the watch
//! loop and the workbook facade run them off the async executor while holding
//! the document lock.

use std::path::Path;

use crate::error::AutomationError;
use crate::value::CellValue;

macro_rules! opaque_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a backend-assigned identifier.
            pub fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// The backend-assigned identifier.
            pub fn raw(self) -> u64 {
                self.0
            }
        }
    };
}

opaque_handle!(
    /// A running application instance.
    AppHandle
);
opaque_handle!(
    /// An open document inside an application instance.
    DocumentHandle
);
opaque_handle!(
    /// One sheet of an open document, resolved by name.
    SheetHandle
);

/// Entry point of an automation backend.
pub trait Automation: Send + Sync + 'static {
    type Session: Session;

    /// Acquire the platform context for one watch loop.
    ///
    /// The returned session releases the context when dropped. `initialize`,
    /// every `Session` call and the session's `Drop` run on the blocking pool
    /// and may land on different OS threads; a backend whose context is
    /// thread-affine (a COM apartment, say) must own a dedicated thread and
    /// forward calls to it, as the Excel bridge process does.
    fn initialize(&self) -> Result<Self::Session, AutomationError>;
}

/// Calls available while a platform context is held.
///
/// Row and column arguments are 1-based, matching the application's own
/// addressing.
pub trait Session: Send + 'static {
    /// Launch a new application instance.
    fn launch(&mut self, visible: bool) -> Result<AppHandle, AutomationError>;

    /// Open a document by absolute path.
    fn open_document(
        &mut self,
        app: AppHandle,
        path: &Path,
    ) -> Result<DocumentHandle, AutomationError>;

    /// Look a sheet up by name.
    fn sheet_by_name(
        &mut self,
        document: DocumentHandle,
        name: &str,
    ) -> Result<SheetHandle, AutomationError>;

    /// Read the sheet's whole used range as rows of values.
    fn read_used_range(
        &mut self,
        sheet: SheetHandle,
    ) -> Result<Vec<Vec<CellValue>>, AutomationError>;

    /// Write a scalar value to a 1-based cell address.
    fn write_cell(
        &mut self,
        sheet: SheetHandle,
        row: u32,
        column: u32,
        value: &CellValue,
    ) -> Result<(), AutomationError>;

    fn save(&mut self, document: DocumentHandle) -> Result<(), AutomationError>;

    fn close_document(
        &mut self,
        document: DocumentHandle,
        save_changes: bool,
    ) -> Result<(), AutomationError>;

    /// Terminate an application instance.
    fn quit(&mut self, app: AppHandle) -> Result<(), AutomationError>;
}
