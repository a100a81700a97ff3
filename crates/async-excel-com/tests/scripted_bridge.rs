//! Drives the client against a shell script speaking the bridge protocol, in
//! place of the real Windows executable.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_excel::{AsyncWorkbook, CellValue, OpenOptions, WatchState};
use async_excel_com::{ExcelBridge, ExcelCom, ExcelComConfig};
use excel_com_protocol::CellValue as WireValue;
use pretty_assertions::assert_eq;

/// Answers every request with canned handles and a 3x2 used range, and logs
/// the raw request lines next to itself. Sheet "Blank" has nothing in it.
const SCRIPT: &str = r#"
while IFS= read -r line; do
  printf '%s\n' "$line" >> "$0.log"
  id=$(printf '%s' "$line" | sed -n 's/^{"id":\([0-9]*\).*/\1/p')
  case "$line" in
    *'"cmd":"Launch"'*) data='{"app":1}' ;;
    *'"cmd":"OpenWorkbook"'*) data='{"workbook":2}' ;;
    *'"cmd":"GetSheet"'*'"name":"Sheet1"'*) data='{"sheet":3}' ;;
    *'"cmd":"GetSheet"'*'"name":"Blank"'*) data='{"sheet":4}' ;;
    *'"cmd":"GetSheet"'*)
      printf '{"id":%s,"status":"error","message":"no such sheet"}\n' "$id"
      continue ;;
    *'"cmd":"ReadUsedRange"'*'"sheet":4'*) data='{"values":[]}' ;;
    *'"cmd":"ReadUsedRange"'*) data='{"values":[[1.0,"a"],[2.0,"b"],[3.0,"c"]]}' ;;
    *) data='' ;;
  esac
  if [ -n "$data" ]; then
    printf '{"id":%s,"status":"ok","data":%s}\n' "$id" "$data"
  else
    printf '{"id":%s,"status":"ok"}\n' "$id"
  fi
  case "$line" in *'"cmd":"Shutdown"'*) exit 0 ;; esac
done
"#;

fn scripted_config(dir: &Path) -> (ExcelComConfig, PathBuf) {
    let script = dir.join("bridge.sh");
    std::fs::write(&script, SCRIPT).unwrap();
    let config = ExcelComConfig {
        bridge_exe_path: Some(script.clone()),
        wine_path: PathBuf::from("sh"),
        wine_prefix: None,
    };
    (config, dir.join("bridge.sh.log"))
}

fn requests(log: &Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(log)
        .unwrap_or_default()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn commands(log: &Path) -> Vec<String> {
    requests(log)
        .iter()
        .map(|r| r["cmd"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn test_bridge_round_trips_commands() {
    let dir = tempfile::tempdir().unwrap();
    let (config, log) = scripted_config(dir.path());

    let mut bridge = ExcelBridge::start(&config).unwrap();
    let app = bridge.launch(false).unwrap();
    let workbook = bridge.open_workbook(app, r"Z:\tmp\book.xlsx").unwrap();
    let sheet = bridge.get_sheet(workbook, "Sheet1").unwrap();
    assert_eq!((app, workbook, sheet), (1, 2, 3));

    let values = bridge.read_used_range(sheet).unwrap();
    assert_eq!(values.len(), 3);
    assert_eq!(values[2][1], WireValue::String("c".into()));

    let err = bridge.get_sheet(workbook, "Missing").unwrap_err();
    assert!(err.to_string().contains("no such sheet"));

    bridge
        .set_cell_value(sheet, 1, 2, WireValue::Number(42.0))
        .unwrap();
    bridge.shutdown().unwrap();

    assert_eq!(
        commands(&log),
        [
            "Init",
            "Launch",
            "OpenWorkbook",
            "GetSheet",
            "ReadUsedRange",
            "GetSheet",
            "SetCellValue",
            "Shutdown"
        ]
    );
    let sent = requests(&log);
    assert_eq!(sent[1]["params"]["visible"], false);
    assert_eq!(
        sent[6]["params"],
        serde_json::json!({"sheet": 3, "row": 1, "column": 2, "value": 42.0})
    );
}

#[tokio::test]
async fn test_workbook_over_scripted_bridge() {
    let dir = tempfile::tempdir().unwrap();
    let (config, log) = scripted_config(dir.path());
    let path = dir.path().join("book.xlsx");
    std::fs::write(&path, b"").unwrap();

    let options = OpenOptions {
        update_interval: Duration::from_millis(20),
        ..Default::default()
    };
    let workbook = AsyncWorkbook::open(ExcelCom::new(config), &path, "Sheet1", options)
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(10), workbook.wait_until_connected())
        .await
        .expect("connect timed out")
        .unwrap();

    let snapshot = workbook.refresh().await.unwrap();
    assert_eq!(snapshot.row_count(), 3);
    assert_eq!(snapshot.column_count(), 2);
    assert_eq!(snapshot.get(1, 0), Some(&CellValue::Number(2.0)));

    workbook.write_cell(0, 1, "z").await.unwrap();
    workbook.close().await;
    assert_eq!(workbook.state(), WatchState::Stopped);

    let sent = requests(&log);
    let opened = sent.iter().find(|r| r["cmd"] == "OpenWorkbook").unwrap();
    assert!(opened["params"]["path"]
        .as_str()
        .unwrap()
        .ends_with("\\book.xlsx"));

    let write = sent.iter().find(|r| r["cmd"] == "SetCellValue").unwrap();
    assert_eq!(write["params"]["row"], 1);
    assert_eq!(write["params"]["column"], 2);
    assert_eq!(write["params"]["value"], "z");

    let tail: Vec<_> = commands(&log).into_iter().rev().take(3).collect();
    assert_eq!(tail, ["Shutdown", "Quit", "CloseWorkbook"]);
    let close = sent.iter().find(|r| r["cmd"] == "CloseWorkbook").unwrap();
    assert_eq!(close["params"]["save_changes"], true);
}

#[tokio::test]
async fn test_blank_sheet_reads_as_empty_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let (config, _log) = scripted_config(dir.path());
    let path = dir.path().join("book.xlsx");
    std::fs::write(&path, b"").unwrap();

    let options = OpenOptions {
        update_interval: Duration::from_millis(20),
        ..Default::default()
    };
    let workbook = AsyncWorkbook::open(ExcelCom::new(config), &path, "Blank", options)
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(10), workbook.wait_until_connected())
        .await
        .expect("connect timed out")
        .unwrap();

    let snapshot = workbook.refresh().await.unwrap();
    assert!(snapshot.is_empty());
    assert_eq!(snapshot.row_count(), 0);
    assert_eq!(snapshot.get(0, 0), None);
    workbook.close().await;
}
