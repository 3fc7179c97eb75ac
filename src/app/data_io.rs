use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use calamine::{Data, Reader, open_workbook_auto};
use chrono::SecondsFormat;
use rust_xlsxwriter::{Workbook, XlsxError};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use super::checker::now_ist;
use super::error::SetupError;
use super::types::{CheckResult, DataFormat};

pub const CSV_HEADERS: [&str; 6] = [
    "URL",
    "STATUS",
    "HTTP_CODE",
    "TITLE",
    "CHECKED_AT_IST",
    "TIME_SEC",
];

#[derive(Debug, Clone, Serialize)]
struct ExportRecord {
    #[serde(rename = "URL")]
    url: String,
    #[serde(rename = "STATUS")]
    status: &'static str,
    #[serde(rename = "HTTP_CODE")]
    http_code: Option<u16>,
    #[serde(rename = "TITLE")]
    title: String,
    #[serde(rename = "CHECKED_AT_IST")]
    checked_at: String,
    #[serde(rename = "TIME_SEC")]
    time_sec: f64,
}

fn result_to_export_record(result: &CheckResult) -> ExportRecord {
    ExportRecord {
        url: result.url.clone(),
        status: result.status.label(),
        http_code: result.http_code,
        title: result.title.clone(),
        checked_at: result
            .checked_at
            .to_rfc3339_opts(SecondsFormat::Secs, false),
        time_sec: result.duration_secs,
    }
}

struct CsvSink {
    writer: csv::Writer<File>,
}

impl CsvSink {
    fn new(output_path: &Path) -> io::Result<Self> {
        let file = File::create(output_path)?;
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(CSV_HEADERS)?;
        Ok(Self { writer })
    }

    fn write_result(&mut self, result: &CheckResult) -> io::Result<()> {
        let rec = result_to_export_record(result);
        self.writer.write_record([
            rec.url,
            rec.status.to_string(),
            rec.http_code.map(|c| c.to_string()).unwrap_or_default(),
            rec.title,
            rec.checked_at,
            format!("{:.2}", rec.time_sec),
        ])?;
        Ok(())
    }

    fn finalize(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

struct JsonSink {
    file: File,
    first: bool,
    closed: bool,
}

impl JsonSink {
    fn new(output_path: &Path) -> io::Result<Self> {
        let mut file = File::create(output_path)?;
        file.write_all(b"[\n")?;
        Ok(Self {
            file,
            first: true,
            closed: false,
        })
    }

    fn write_result(&mut self, result: &CheckResult) -> io::Result<()> {
        let rec = result_to_export_record(result);
        if !self.first {
            self.file.write_all(b",\n")?;
        }
        self.first = false;
        serde_json::to_writer(&mut self.file, &rec).map_err(io::Error::other)?;
        Ok(())
    }

    fn finalize(&mut self) -> io::Result<()> {
        if !self.closed {
            if self.first {
                self.file.write_all(b"]\n")?;
            } else {
                self.file.write_all(b"\n]\n")?;
            }
            self.closed = true;
        }
        self.file.flush()
    }
}

impl Drop for JsonSink {
    fn drop(&mut self) {
        let _ = self.finalize();
    }
}

/// Workbook output. Cells are buffered in memory and the file is written once
/// on `finalize`.
struct XlsxSink {
    workbook: Workbook,
    path: PathBuf,
    next_row: u32,
}

impl XlsxSink {
    fn new(output_path: &Path) -> Result<Self, XlsxError> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (col, header) in CSV_HEADERS.iter().enumerate() {
            sheet.write_string(0, col as u16, *header)?;
        }
        Ok(Self {
            workbook,
            path: output_path.to_path_buf(),
            next_row: 1,
        })
    }

    fn write_result(&mut self, result: &CheckResult) -> Result<(), XlsxError> {
        let rec = result_to_export_record(result);
        let row = self.next_row;
        let sheet = self.workbook.worksheet_from_index(0)?;
        sheet.write_string(row, 0, rec.url)?;
        sheet.write_string(row, 1, rec.status)?;
        if let Some(code) = rec.http_code {
            sheet.write_number(row, 2, f64::from(code))?;
        }
        sheet.write_string(row, 3, rec.title)?;
        sheet.write_string(row, 4, rec.checked_at)?;
        sheet.write_number(row, 5, rec.time_sec)?;
        self.next_row += 1;
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), XlsxError> {
        self.workbook.save(&self.path)
    }
}

enum OutputSink {
    Xlsx(XlsxSink),
    Csv(CsvSink),
    Json(JsonSink),
}

impl OutputSink {
    fn new(output_path: &Path, format: DataFormat) -> io::Result<Self> {
        match format {
            DataFormat::Xlsx => Ok(OutputSink::Xlsx(
                XlsxSink::new(output_path).map_err(io::Error::other)?,
            )),
            DataFormat::Csv => Ok(OutputSink::Csv(CsvSink::new(output_path)?)),
            DataFormat::Json => Ok(OutputSink::Json(JsonSink::new(output_path)?)),
        }
    }

    fn write_result(&mut self, result: &CheckResult) -> io::Result<()> {
        match self {
            OutputSink::Xlsx(sink) => sink.write_result(result).map_err(io::Error::other),
            OutputSink::Csv(sink) => sink.write_result(result),
            OutputSink::Json(sink) => sink.write_result(result),
        }
    }

    fn finalize(&mut self) -> io::Result<()> {
        match self {
            OutputSink::Xlsx(sink) => sink.finalize().map_err(io::Error::other),
            OutputSink::Csv(sink) => sink.finalize(),
            OutputSink::Json(sink) => sink.finalize(),
        }
    }
}

/// Writes all results in order. Returns `false` without touching the disk
/// when there is nothing to save.
pub fn save_results(
    results: &[CheckResult],
    output_path: &Path,
    format: DataFormat,
) -> io::Result<bool> {
    if results.is_empty() {
        info!("no results to save");
        return Ok(false);
    }
    let mut sink = OutputSink::new(output_path, format)?;
    for result in results {
        sink.write_result(result)?;
    }
    sink.finalize()?;
    info!(rows = results.len(), output = %output_path.display(), "results saved");
    Ok(true)
}

/// Reads the URL column of the input table. Blank cells are skipped; every
/// other value is kept as-is and in order. `sheet` selects a workbook sheet or
/// a JSON top-level key; CSV has no sheets and ignores it.
pub fn load_urls(path: &Path, sheet: &str, column: &str) -> Result<Vec<String>, SetupError> {
    if !path.exists() {
        return Err(SetupError::InputNotFound(path.to_path_buf()));
    }
    let display = path.to_string_lossy().to_string();
    match detect_data_format(&display, DataFormat::Csv) {
        DataFormat::Xlsx => load_urls_from_workbook(path, sheet, column),
        DataFormat::Csv => load_urls_from_csv(path, column),
        DataFormat::Json => load_urls_from_json(path, sheet, column),
    }
}

fn load_urls_from_csv(path: &Path, column: &str) -> Result<Vec<String>, SetupError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    let wanted = column.trim().to_ascii_lowercase();
    let Some(idx) = headers
        .iter()
        .position(|header| header.trim().to_ascii_lowercase() == wanted)
    else {
        return Err(SetupError::MissingColumn {
            column: column.to_string(),
            path: path.to_path_buf(),
        });
    };

    let mut urls = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(value) = record.get(idx) {
            if !value.trim().is_empty() {
                urls.push(value.to_string());
            }
        }
    }
    Ok(urls)
}

fn load_urls_from_workbook(
    path: &Path,
    sheet: &str,
    column: &str,
) -> Result<Vec<String>, SetupError> {
    let mut workbook = open_workbook_auto(path)?;
    if !workbook.sheet_names().iter().any(|name| name.as_str() == sheet) {
        return Err(SetupError::MissingSheet {
            sheet: sheet.to_string(),
            path: path.to_path_buf(),
        });
    }
    let range = workbook.worksheet_range(sheet)?;
    let mut rows = range.rows();

    let wanted = column.trim().to_ascii_lowercase();
    let idx = rows.next().and_then(|header| {
        header
            .iter()
            .position(|cell| cell.to_string().trim().to_ascii_lowercase() == wanted)
    });
    let Some(idx) = idx else {
        return Err(SetupError::MissingColumn {
            column: column.to_string(),
            path: path.to_path_buf(),
        });
    };

    Ok(rows
        .filter_map(|row| row.get(idx))
        .filter_map(workbook_cell_text)
        .collect())
}

fn workbook_cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) if s.trim().is_empty() => None,
        other => Some(other.to_string()),
    }
}

fn load_urls_from_json(path: &Path, sheet: &str, column: &str) -> Result<Vec<String>, SetupError> {
    let content = fs::read_to_string(path)?;
    let root: Value = serde_json::from_str(&content)?;
    let rows = match &root {
        Value::Array(rows) => rows,
        Value::Object(sheets) => match sheets.get(sheet) {
            Some(Value::Array(rows)) => rows,
            Some(_) => {
                return Err(SetupError::InputLayout {
                    path: path.to_path_buf(),
                    detail: format!("sheet '{sheet}' is not an array of rows"),
                });
            }
            None => {
                return Err(SetupError::MissingSheet {
                    sheet: sheet.to_string(),
                    path: path.to_path_buf(),
                });
            }
        },
        _ => {
            return Err(SetupError::InputLayout {
                path: path.to_path_buf(),
                detail: "expected an array of rows or an object of sheets".to_string(),
            });
        }
    };

    let wanted = column.trim().to_ascii_lowercase();
    let mut saw_column = false;
    let mut urls = Vec::new();
    for row in rows {
        let cell = match row {
            Value::String(_) => {
                saw_column = true;
                Some(row)
            }
            Value::Object(fields) => {
                let index = fields
                    .iter()
                    .map(|(key, value)| (key.trim().to_ascii_lowercase(), value))
                    .collect::<HashMap<_, _>>();
                let cell = index.get(&wanted).copied();
                saw_column |= cell.is_some();
                cell
            }
            _ => None,
        };
        if let Some(text) = cell.and_then(cell_text) {
            urls.push(text);
        }
    }

    if !saw_column && !rows.is_empty() {
        return Err(SetupError::MissingColumn {
            column: column.to_string(),
            path: path.to_path_buf(),
        });
    }
    Ok(urls)
}

fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn detect_data_format(path: &str, fallback: DataFormat) -> DataFormat {
    let lower = path.to_ascii_lowercase();
    if lower.ends_with(".xlsx") {
        DataFormat::Xlsx
    } else if lower.ends_with(".json") {
        DataFormat::Json
    } else if lower.ends_with(".csv") {
        DataFormat::Csv
    } else {
        fallback
    }
}

pub fn default_output_path(format: DataFormat) -> String {
    let ts = now_ist().format("%Y-%m-%d_%H-%M");
    format!("Result_{ts}.{}", format.extension())
}
