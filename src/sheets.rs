use std::io::Cursor;

use calamine::{Data, Reader};
use regex::Regex;

use crate::error::{Result, SiftError};
use crate::models::Sheet;

/// Read raw file content into sheets. CSV exports become a single sheet;
/// XLSX/ODS workbooks yield one sheet per worksheet.
pub fn read_sheets(content: &[u8], filename: &str) -> Result<Vec<Sheet>> {
    if is_spreadsheet(filename) {
        read_workbook(content)
    } else {
        read_csv(content, filename).map(|s| vec![s])
    }
}

fn is_spreadsheet(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    [".xlsx", ".xls", ".xlsm", ".xlsb", ".ods"]
        .iter()
        .any(|ext| lower.ends_with(ext))
}

/// Statement exports routinely carry preamble junk (account name, balance
/// summary) before the real header row, so the header is found by scanning
/// rather than trusting row 0.
fn find_header_row(rows: &[Vec<String>]) -> Option<usize> {
    let date_re = Regex::new(r"(?i)date").unwrap();
    let other_re = Regex::new(r"(?i)amount|debit|credit|description|merchant|payee").unwrap();
    rows.iter().position(|row| {
        row.iter().any(|c| date_re.is_match(c)) && row.iter().any(|c| other_re.is_match(c))
    })
}

fn read_csv(content: &[u8], filename: &str) -> Result<Sheet> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content);
    let mut raw: Vec<Vec<String>> = Vec::new();
    for result in rdr.records() {
        let record = result?;
        raw.push(record.iter().map(|f| f.trim().to_string()).collect());
    }

    let name = filename
        .rsplit('/')
        .next()
        .unwrap_or(filename)
        .trim_end_matches(".csv")
        .to_string();
    Ok(assemble_sheet(name, raw))
}

fn read_workbook(content: &[u8]) -> Result<Vec<Sheet>> {
    let cursor = Cursor::new(content.to_vec());
    let mut workbook = calamine::open_workbook_auto_from_rs(cursor)
        .map_err(|e| SiftError::Spreadsheet(e.to_string()))?;

    let names: Vec<String> = workbook.sheet_names().to_vec();
    let mut sheets = Vec::new();
    for name in names {
        let range = match workbook.worksheet_range(&name) {
            Ok(r) => r,
            Err(e) => return Err(SiftError::Spreadsheet(e.to_string())),
        };
        let raw: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(render_cell).collect())
            .collect();
        sheets.push(assemble_sheet(name, raw));
    }
    Ok(sheets)
}

fn assemble_sheet(name: String, mut raw: Vec<Vec<String>>) -> Sheet {
    // Drop fully empty rows; they carry no information either side of the header.
    raw.retain(|row| row.iter().any(|c| !c.is_empty()));
    let Some(header_idx) = find_header_row(&raw) else {
        return Sheet {
            name,
            headers: Vec::new(),
            rows: Vec::new(),
        };
    };
    let headers = raw[header_idx].clone();
    let rows = raw.split_off(header_idx + 1);
    Sheet { name, headers, rows }
}

fn render_cell(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => format!("{f}"),
        Data::Int(i) => format!("{i}"),
        Data::Bool(b) => format!("{b}"),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(_) | Data::Empty => String::new(),
    }
}

/// Excel epoch is 1899-12-30 (accounting for the 1900 leap year bug).
pub fn excel_serial_to_date(serial: f64) -> String {
    let base = chrono::NaiveDate::from_ymd_opt(1899, 12, 30).unwrap();
    let date = base + chrono::Duration::days(serial as i64);
    date.format("%Y-%m-%d").to_string()
}
