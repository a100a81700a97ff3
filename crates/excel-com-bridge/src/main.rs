//! Excel COM Bridge: a Windows process that automates Excel via COM,
//! controlled by JSON commands over stdin/stdout.
//!
//! Runs natively on Windows, or cross-compiled from Linux and run under WINE.
//! One process holds one COM apartment; the client owns its lifetime.
//!
//! Protocol: one JSON object per line (newline-delimited JSON).
//! - Reads `Request` objects from stdin
//! - Writes `Response` objects to stdout
//! - Diagnostic/log messages go to stderr (never stdout)

#[cfg(windows)]
mod dispatch;
#[cfg(windows)]
mod excel;
mod grid;

#[cfg(not(windows))]
fn main() {
    eprintln!("excel-com-bridge must be compiled for Windows (--target x86_64-pc-windows-gnu)");
    eprintln!("and run natively or under WINE on Linux.");
    std::process::exit(1);
}

#[cfg(windows)]
fn main() {
    use std::io::{self, BufRead};

    use excel_com_protocol::*;

    // Use stderr for all diagnostic output so stdout stays clean for protocol
    eprintln!("[excel-com-bridge] Starting up...");

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let mut excel: Option<excel::ExcelSession> = None;

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("[excel-com-bridge] stdin read error: {e}");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("[excel-com-bridge] JSON parse error: {e}");
                eprintln!("[excel-com-bridge] Line was: {line}");
                // Send an error response with id=0 since we couldn't parse the request
                let resp = Response {
                    id: 0,
                    result: ResponseResult::Error {
                        message: format!("JSON parse error: {e}"),
                    },
                };
                write_response(&mut out, &resp);
                continue;
            }
        };

        let response = handle_command(&mut excel, &request);
        write_response(&mut out, &response);

        if matches!(request.command, Command::Shutdown) {
            eprintln!("[excel-com-bridge] Shutdown complete, exiting.");
            break;
        }
    }

    // If the client went away without a Shutdown, still release Excel and COM
    if let Some(session) = excel.take() {
        eprintln!("[excel-com-bridge] stdin closed, shutting down Excel...");
        if let Err(e) = session.shutdown() {
            eprintln!("[excel-com-bridge] {e}");
        }
        uninit_com();
    }

    eprintln!("[excel-com-bridge] Process exiting.");
}

#[cfg(windows)]
fn write_response(out: &mut impl std::io::Write, response: &excel_com_protocol::Response) {
    match serde_json::to_string(response) {
        Ok(json) => {
            let _ = writeln!(out, "{json}");
            let _ = out.flush();
        }
        Err(e) => eprintln!("[excel-com-bridge] Failed to encode response: {e}"),
    }
}

#[cfg(windows)]
fn handle_command(
    excel: &mut Option<excel::ExcelSession>,
    request: &excel_com_protocol::Request,
) -> excel_com_protocol::Response {
    use excel_com_protocol::*;

    let id = request.id;

    let result = match &request.command {
        Command::Init => init_com(excel),
        Command::Launch { visible } => with_excel(excel, |session| {
            let app = session.launch(*visible)?;
            Ok(ResponseResult::Ok {
                data: Some(ResponseData::AppHandle { app }),
            })
        }),
        Command::OpenWorkbook { app, path } => with_excel(excel, |session| {
            let workbook = session.open_workbook(*app, path)?;
            Ok(ResponseResult::Ok {
                data: Some(ResponseData::WorkbookHandle { workbook }),
            })
        }),
        Command::GetSheet { workbook, name } => with_excel(excel, |session| {
            let sheet = session.get_sheet(*workbook, name)?;
            Ok(ResponseResult::Ok {
                data: Some(ResponseData::SheetHandle { sheet }),
            })
        }),
        Command::ReadUsedRange { sheet } => with_excel(excel, |session| {
            let values = session.read_used_range(*sheet)?;
            Ok(ResponseResult::Ok {
                data: Some(ResponseData::Range { values }),
            })
        }),
        Command::SetCellValue {
            sheet,
            row,
            column,
            value,
        } => with_excel(excel, |session| {
            session.set_cell_value(*sheet, *row, *column, value)?;
            Ok(ResponseResult::Ok { data: None })
        }),
        Command::SaveWorkbook { workbook } => with_excel(excel, |session| {
            session.save_workbook(*workbook)?;
            Ok(ResponseResult::Ok { data: None })
        }),
        Command::CloseWorkbook {
            workbook,
            save_changes,
        } => with_excel(excel, |session| {
            session.close_workbook(*workbook, *save_changes)?;
            Ok(ResponseResult::Ok { data: None })
        }),
        Command::Quit { app } => with_excel(excel, |session| {
            session.quit(*app)?;
            Ok(ResponseResult::Ok { data: None })
        }),
        Command::Shutdown => match excel.take() {
            Some(session) => {
                let result = session.shutdown();
                uninit_com();
                match result {
                    Ok(()) => ResponseResult::Ok { data: None },
                    Err(e) => ResponseResult::Error {
                        message: format!("Shutdown failed: {e}"),
                    },
                }
            }
            None => ResponseResult::Ok { data: None },
        },
    };

    Response { id, result }
}

#[cfg(windows)]
fn init_com(excel: &mut Option<excel::ExcelSession>) -> excel_com_protocol::ResponseResult {
    use excel_com_protocol::ResponseResult;
    use windows::Win32::System::Com::{CoInitializeEx, COINIT_APARTMENTTHREADED};

    if excel.is_some() {
        return ResponseResult::Ok { data: None }; // Already initialized
    }

    // Initialize COM in Single-Threaded Apartment mode (required by Excel)
    unsafe {
        let hr = CoInitializeEx(None, COINIT_APARTMENTTHREADED);
        if let Err(e) = hr.ok() {
            return ResponseResult::Error {
                message: format!("CoInitializeEx failed: {e}"),
            };
        }
    }

    eprintln!("[excel-com-bridge] COM initialized (STA)");
    *excel = Some(excel::ExcelSession::new());
    ResponseResult::Ok { data: None }
}

#[cfg(windows)]
fn uninit_com() {
    unsafe {
        windows::Win32::System::Com::CoUninitialize();
    }
    eprintln!("[excel-com-bridge] COM uninitialized");
}

#[cfg(windows)]
fn with_excel(
    excel: &mut Option<excel::ExcelSession>,
    f: impl FnOnce(&mut excel::ExcelSession) -> Result<excel_com_protocol::ResponseResult, String>,
) -> excel_com_protocol::ResponseResult {
    match excel.as_mut() {
        Some(session) => match f(session) {
            Ok(r) => r,
            Err(e) => excel_com_protocol::ResponseResult::Error { message: e },
        },
        None => excel_com_protocol::ResponseResult::Error {
            message: "COM not initialized. Send 'Init' command first.".to_string(),
        },
    }
}
