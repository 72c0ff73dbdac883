use std::path::Path;

use calamine::{open_workbook_auto, Data, ExcelDateTime, Range, Reader};
use chrono::{Duration, NaiveDate};
use tracing::debug;

use crate::error::ReadError;

/// Extensions accepted for upload.
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["xlsx", "xls", "csv"];

pub fn is_supported(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

/// Drops trailing blank cells and trailing blank rows, so short rows stay short.
fn trim_ragged(mut rows: Vec<Vec<String>>) -> Vec<Vec<String>> {
    for row in &mut rows {
        while row.last().is_some_and(|cell| cell.is_empty()) {
            row.pop();
        }
    }
    while rows.last().is_some_and(|row| row.is_empty()) {
        rows.pop();
    }
    rows
}

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Serial below one day is a time of day ("9:00"); otherwise a 1900-system
/// date ("01.09.2024"), with the time appended when it is not midnight.
fn format_datetime(dt: &ExcelDateTime) -> String {
    let serial = dt.as_f64();
    let days = serial.floor();
    let seconds = ((serial - days) * SECONDS_PER_DAY).round() as i64;
    let (days, seconds) = if seconds >= 86_400 {
        (days + 1.0, 0)
    } else {
        (days, seconds)
    };

    let (hours, minutes, secs) = (seconds / 3600, seconds / 60 % 60, seconds % 60);
    let time = if secs == 0 {
        format!("{hours}:{minutes:02}")
    } else {
        format!("{hours}:{minutes:02}:{secs:02}")
    };

    if days < 1.0 {
        return time;
    }
    let date = NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|epoch| epoch.checked_add_signed(Duration::days(days as i64)));
    match date {
        Some(date) if seconds == 0 => date.format("%d.%m.%Y").to_string(),
        Some(date) => format!("{} {time}", date.format("%d.%m.%Y")),
        None => serial.to_string(),
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::DateTime(dt) => format_datetime(dt),
        other => other.to_string(),
    }
}

fn range_rows(range: &Range<Data>) -> Vec<Vec<String>> {
    let (top, left) = range
        .start()
        .map_or((0, 0), |(row, column)| (row as usize, column as usize));

    let mut rows: Vec<Vec<String>> = vec![Vec::new(); top];
    for cells in range.rows() {
        let mut row = vec![String::new(); left];
        row.extend(cells.iter().map(cell_text));
        rows.push(row);
    }
    rows
}

fn first_sheet_name(names: &[String], path: &Path) -> Result<String, ReadError> {
    names.first().cloned().ok_or_else(|| ReadError::NoSheets {
        path: path.display().to_string(),
    })
}

fn read_workbook(path: &Path) -> Result<Vec<Vec<String>>, ReadError> {
    let mut workbook = open_workbook_auto(path).map_err(|err| ReadError::Open {
        path: path.display().to_string(),
        message: err.to_string(),
    })?;

    let sheet = first_sheet_name(&workbook.sheet_names(), path)?;

    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|err| ReadError::Sheet {
            sheet: sheet.clone(),
            message: err.to_string(),
        })?;

    debug!(path = %path.display(), %sheet, "read first sheet");
    Ok(range_rows(&range))
}

fn read_csv(path: &Path) -> Result<Vec<Vec<String>>, ReadError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|err| ReadError::Open {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| ReadError::Csv(err.to_string()))?;
        rows.push(record.iter().map(|cell| cell.to_string()).collect());
    }
    Ok(rows)
}

/// Text rows of the first sheet of a workbook, or of a CSV file.
///
/// Workbook cells carry their stored value, not the displayed one: whole
/// numbers print without a fraction ("101"), date and time cells are
/// rendered as "dd.mm.yyyy" / "H:MM", but a percent-formatted cell showing
/// "39.9%" arrives as the raw fraction "0.399". Attendance and homework
/// percentages must be exported as text or plain numbers to be compared
/// against their thresholds.
pub fn read_first_sheet_rows(path: &Path) -> Result<Vec<Vec<String>>, ReadError> {
    let rows = if is_csv(path) {
        read_csv(path)?
    } else {
        read_workbook(path)?
    };
    Ok(trim_ragged(rows))
}
