//! In-memory automation backend for driving the watch loop in tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_excel::{
    AppHandle, Automation, AutomationError, CellValue, DocumentHandle, OpenOptions, Session,
    SheetHandle,
};

/// Everything the fake application knows, plus call counters.
#[derive(Debug, Default)]
pub struct FakeState {
    /// Live sheet contents by name.
    pub sheets: HashMap<String, Vec<Vec<CellValue>>>,
    /// Sheet contents as of the last save.
    pub saved: HashMap<String, Vec<Vec<CellValue>>>,

    pub fail_initialize: bool,
    /// Number of upcoming launches that fail. `u32::MAX` fails forever.
    pub launch_failures: u32,
    /// Number of upcoming used-range reads that fail.
    pub read_failures: u32,
    pub fail_writes: bool,
    /// How long each used-range read and cell write takes.
    pub call_delay: Duration,

    pub initializations: u32,
    pub releases: u32,
    pub launches: u32,
    pub quits: u32,
    pub opened: Vec<PathBuf>,
    /// `save_changes` flag of every document close.
    pub closes: Vec<bool>,
    pub reads: u32,
    pub visible: Option<bool>,

    next_handle: u64,
    open_sheets: HashMap<u64, String>,
}

impl FakeState {
    fn next_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

/// Counts session calls that are executing right now.
#[derive(Debug, Default)]
struct CallTracker {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

struct InFlight<'a>(&'a CallTracker);

impl CallTracker {
    fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlight(self)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeExcel {
    state: Arc<Mutex<FakeState>>,
    calls: Arc<CallTracker>,
}

impl FakeExcel {
    pub fn with_sheet(name: &str, rows: Vec<Vec<CellValue>>) -> Self {
        let fake = Self::default();
        fake.state().sheets.insert(name.to_string(), rows);
        fake
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Most session calls ever observed executing at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.calls.peak.load(Ordering::SeqCst)
    }
}

impl Automation for FakeExcel {
    type Session = FakeSession;

    fn initialize(&self) -> Result<FakeSession, AutomationError> {
        let mut state = self.state();
        if state.fail_initialize {
            return Err(AutomationError::new("platform unavailable"));
        }
        state.initializations += 1;
        Ok(FakeSession {
            state: Arc::clone(&self.state),
            calls: Arc::clone(&self.calls),
        })
    }
}

pub struct FakeSession {
    state: Arc<Mutex<FakeState>>,
    calls: Arc<CallTracker>,
}

impl FakeSession {
    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Sleep for the configured call delay without holding the state lock.
    fn work(&self) {
        let delay = self.state().call_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.state().releases += 1;
    }
}

impl Session for FakeSession {
    fn launch(&mut self, visible: bool) -> Result<AppHandle, AutomationError> {
        let _call = self.calls.enter();
        let mut state = self.state();
        state.launches += 1;
        if state.launch_failures > 0 {
            if state.launch_failures != u32::MAX {
                state.launch_failures -= 1;
            }
            return Err(AutomationError::new("application failed to start"));
        }
        state.visible = Some(visible);
        Ok(AppHandle::new(state.next_handle()))
    }

    fn open_document(
        &mut self,
        _app: AppHandle,
        path: &Path,
    ) -> Result<DocumentHandle, AutomationError> {
        let _call = self.calls.enter();
        let mut state = self.state();
        state.opened.push(path.to_path_buf());
        Ok(DocumentHandle::new(state.next_handle()))
    }

    fn sheet_by_name(
        &mut self,
        _document: DocumentHandle,
        name: &str,
    ) -> Result<SheetHandle, AutomationError> {
        let _call = self.calls.enter();
        let mut state = self.state();
        if !state.sheets.contains_key(name) {
            return Err(AutomationError::new(format!("no sheet named {name}")));
        }
        let handle = state.next_handle();
        state.open_sheets.insert(handle, name.to_string());
        Ok(SheetHandle::new(handle))
    }

    fn read_used_range(
        &mut self,
        sheet: SheetHandle,
    ) -> Result<Vec<Vec<CellValue>>, AutomationError> {
        let _call = self.calls.enter();
        self.work();
        let mut state = self.state();
        state.reads += 1;
        if state.read_failures > 0 {
            state.read_failures -= 1;
            return Err(AutomationError::new("used range unavailable"));
        }
        let name = state
            .open_sheets
            .get(&sheet.raw())
            .cloned()
            .ok_or_else(|| AutomationError::new("stale sheet handle"))?;
        Ok(state.sheets[&name].clone())
    }

    fn write_cell(
        &mut self,
        sheet: SheetHandle,
        row: u32,
        column: u32,
        value: &CellValue,
    ) -> Result<(), AutomationError> {
        let _call = self.calls.enter();
        if row == 0 || column == 0 {
            return Err(AutomationError::new("cell addresses are 1-based"));
        }
        self.work();
        let mut state = self.state();
        if state.fail_writes {
            return Err(AutomationError::new("write rejected"));
        }
        let name = state
            .open_sheets
            .get(&sheet.raw())
            .cloned()
            .ok_or_else(|| AutomationError::new("stale sheet handle"))?;
        let rows = state.sheets.get_mut(&name).expect("sheet exists");
        let (r, c) = ((row - 1) as usize, (column - 1) as usize);
        if rows.len() <= r {
            rows.resize(r + 1, Vec::new());
        }
        if rows[r].len() <= c {
            rows[r].resize(c + 1, CellValue::Empty);
        }
        rows[r][c] = value.clone();
        Ok(())
    }

    fn save(&mut self, _document: DocumentHandle) -> Result<(), AutomationError> {
        let _call = self.calls.enter();
        let mut state = self.state();
        state.saved = state.sheets.clone();
        Ok(())
    }

    fn close_document(
        &mut self,
        _document: DocumentHandle,
        save_changes: bool,
    ) -> Result<(), AutomationError> {
        let _call = self.calls.enter();
        let mut state = self.state();
        state.closes.push(save_changes);
        if save_changes {
            state.saved = state.sheets.clone();
        }
        state.open_sheets.clear();
        Ok(())
    }

    fn quit(&mut self, _app: AppHandle) -> Result<(), AutomationError> {
        let _call = self.calls.enter();
        self.state().quits += 1;
        Ok(())
    }
}

/// Options with a short interval so tests run quickly.
pub fn fast_options() -> OpenOptions {
    OpenOptions {
        update_interval: Duration::from_millis(10),
        ..Default::default()
    }
}

/// Create an empty file with the given name in a fresh temp dir.
pub fn document(name: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    std::fs::write(&path, b"").unwrap();
    (dir, path)
}

pub fn grid_3x2() -> Vec<Vec<CellValue>> {
    vec![
        vec![1.into(), "a".into()],
        vec![2.into(), "b".into()],
        vec![3.into(), "c".into()],
    ]
}
