//! CSV ingest and normalization.
//!
//! Turns the transport and weather CSVs into date-sorted in-memory tables.
//!
//! Design goals:
//! - **Strict dates**: a malformed date is fatal (exit code 2), there is no
//!   sensible row to fall back to
//! - **Lenient values**: empty, `NaN` or unparseable numeric cells become
//!   missing values and are counted
//! - **Deterministic behavior**: rows are sorted by date, duplicates rejected
//! - **Separation of concerns**: no modeling logic here

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use chrono::NaiveDate;
use csv::StringRecord;
use tracing::{debug, warn};

use crate::domain::{ObservationTable, Series, WeatherData};
use crate::error::AppError;

/// A numeric cell that could not be parsed (kept as missing).
#[derive(Debug, Clone, PartialEq)]
pub struct CellError {
    pub line: usize,
    pub column: String,
    pub value: String,
}

/// Ingest output: the table plus what happened on the way.
#[derive(Debug, Clone)]
pub struct IngestedData {
    pub table: ObservationTable,
    pub rows_read: usize,
    /// Empty or `NaN` cells.
    pub missing_cells: usize,
    pub bad_cells: Vec<CellError>,
}

/// Load the transport CSV: first column is the date, every other column is a
/// series of relative volumes.
pub fn load_transport(path: &Path) -> Result<IngestedData, AppError> {
    let mut reader = open_reader(path)?;
    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();
    if headers.len() < 2 {
        return Err(AppError::new(
            2,
            format!(
                "Transport CSV '{}' needs a date column and at least one series column.",
                path.display()
            ),
        ));
    }
    let names: Vec<String> = headers.iter().skip(1).map(clean_header).collect();

    let mut rows: Vec<(NaiveDate, Vec<f64>)> = Vec::new();
    let mut missing_cells = 0usize;
    let mut bad_cells = Vec::new();

    for (idx, result) in reader.records().enumerate() {
        // +2: records() starts after the header and lines are 1-based.
        let line = idx + 2;
        let record = result.map_err(|e| AppError::new(2, format!("CSV parse error on line {line}: {e}")))?;
        if record.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        let date = parse_date(record.get(0).unwrap_or(""))
            .map_err(|e| AppError::new(2, format!("Line {line}: {e}")))?;

        let mut values = Vec::with_capacity(names.len());
        for (j, name) in names.iter().enumerate() {
            let raw = record.get(j + 1).unwrap_or("");
            match parse_cell(raw) {
                Cell::Value(v) => values.push(v),
                Cell::Missing => {
                    missing_cells += 1;
                    values.push(f64::NAN);
                }
                Cell::Bad => {
                    bad_cells.push(CellError {
                        line,
                        column: name.clone(),
                        value: raw.to_string(),
                    });
                    values.push(f64::NAN);
                }
            }
        }
        rows.push((date, values));
    }

    if rows.is_empty() {
        return Err(AppError::new(
            3,
            format!("Transport CSV '{}' has no data rows.", path.display()),
        ));
    }

    let rows_read = rows.len();
    rows.sort_by_key(|(d, _)| *d);
    ensure_unique_dates(rows.iter().map(|(d, _)| *d), path)?;

    if !bad_cells.is_empty() {
        warn!(
            count = bad_cells.len(),
            "unparseable numeric cells treated as missing"
        );
    }

    let dates: Vec<NaiveDate> = rows.iter().map(|(d, _)| *d).collect();
    let series = names
        .into_iter()
        .enumerate()
        .map(|(j, name)| Series {
            name,
            values: rows.iter().map(|(_, v)| v[j]).collect(),
        })
        .collect::<Vec<_>>();

    debug!(
        path = %path.display(),
        rows = rows_read,
        series = series.len(),
        missing_cells,
        "loaded transport data"
    );

    Ok(IngestedData {
        table: ObservationTable {
            dates,
            series,
            temperature_excess: None,
        },
        rows_read,
        missing_cells,
        bad_cells,
    })
}

/// Load the weather CSV (`date`, `temperature`, `avg_monthly_temperature_2020`)
/// and derive `temperature_excess`.
pub fn load_weather(path: &Path) -> Result<WeatherData, AppError> {
    let mut reader = open_reader(path)?;
    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    let col = |name: &str| {
        header_map.get(name).copied().ok_or_else(|| {
            AppError::new(
                2,
                format!(
                    "Weather CSV '{}' is missing required column '{name}'.",
                    path.display()
                ),
            )
        })
    };
    let date_col = col("date")?;
    let temp_col = col("temperature")?;
    let avg_col = col("avg_monthly_temperature_2020")?;

    let mut rows: Vec<(NaiveDate, f64)> = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let record = result.map_err(|e| AppError::new(2, format!("CSV parse error on line {line}: {e}")))?;
        if record.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        let date = parse_date(record.get(date_col).unwrap_or(""))
            .map_err(|e| AppError::new(2, format!("Line {line}: {e}")))?;
        let temp = cell_value(&record, temp_col);
        let avg = cell_value(&record, avg_col);
        rows.push((date, temp - avg));
    }
    if rows.is_empty() {
        return Err(AppError::new(
            3,
            format!("Weather CSV '{}' has no data rows.", path.display()),
        ));
    }

    rows.sort_by_key(|(d, _)| *d);
    ensure_unique_dates(rows.iter().map(|(d, _)| *d), path)?;

    Ok(WeatherData {
        dates: rows.iter().map(|(d, _)| *d).collect(),
        temperature_excess: rows.iter().map(|(_, v)| *v).collect(),
    })
}

fn open_reader(path: &Path) -> Result<csv::Reader<File>, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display())))?;
    Ok(csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file))
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (clean_header(name).to_ascii_lowercase(), idx))
        .collect()
}

fn clean_header(name: &str) -> String {
    // Spreadsheet exports may prefix the first header with a UTF-8 BOM.
    name.trim().trim_start_matches('\u{feff}').to_string()
}

fn ensure_unique_dates(
    dates: impl Iterator<Item = NaiveDate>,
    path: &Path,
) -> Result<(), AppError> {
    let mut prev: Option<NaiveDate> = None;
    for d in dates {
        if prev == Some(d) {
            return Err(AppError::new(
                2,
                format!("Duplicate date {d} in '{}'.", path.display()),
            ));
        }
        prev = Some(d);
    }
    Ok(())
}

enum Cell {
    Value(f64),
    Missing,
    Bad,
}

fn parse_cell(raw: &str) -> Cell {
    let s = raw.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("nan") || s.eq_ignore_ascii_case("na") {
        return Cell::Missing;
    }
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() => Cell::Value(v),
        Ok(_) => Cell::Missing,
        Err(_) => Cell::Bad,
    }
}

fn cell_value(record: &StringRecord, idx: usize) -> f64 {
    match parse_cell(record.get(idx).unwrap_or("")) {
        Cell::Value(v) => v,
        Cell::Missing | Cell::Bad => f64::NAN,
    }
}

/// Parse a date in one of the accepted formats (day-first before ISO).
pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    // The published transport data uses `DD/MM/YYYY`; ISO dates and a couple of
    // other spreadsheet formats are accepted as well.
    const FMTS: [&str; 4] = ["%d/%m/%Y", "%Y-%m-%d", "%d-%m-%Y", "%Y/%m/%d"];
    let s = s.trim();
    for fmt in FMTS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(d);
        }
    }
    Err(format!(
        "Invalid date '{s}'. Expected one of: DD/MM/YYYY, YYYY-MM-DD, DD-MM-YYYY, YYYY/MM/DD."
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[test]
    fn parse_date_accepts_common_formats() {
        let want = NaiveDate::from_ymd_opt(2020, 3, 23).unwrap();
        for s in ["23/03/2020", "2020-03-23", "23-03-2020", "2020/03/23", " 23/03/2020 "] {
            assert_eq!(parse_date(s).unwrap(), want, "{s}");
        }
        assert!(parse_date("March 23").is_err());
    }

    #[test]
    fn transport_rows_are_sorted_and_gaps_kept() {
        let f = write_csv(
            "\u{feff}Date,Cars,National_rail\n\
             02/03/2020,1.01,0.98\n\
             01/03/2020,0.99,\n\
             03/03/2020,NaN,oops\n",
        );
        let data = load_transport(f.path()).unwrap();
        let t = &data.table;
        assert_eq!(t.series_names(), vec!["Cars", "National_rail"]);
        assert_eq!(t.dates[0], NaiveDate::from_ymd_opt(2020, 3, 1).unwrap());
        assert_eq!(t.series("Cars").unwrap()[1], 1.01);
        assert!(t.series("National_rail").unwrap()[0].is_nan());
        assert_eq!(data.missing_cells, 2);
        assert_eq!(data.bad_cells.len(), 1);
        assert_eq!(data.bad_cells[0].line, 4);
        assert_eq!(data.rows_read, 3);
    }

    #[test]
    fn malformed_date_is_fatal() {
        let f = write_csv("Date,Cars\n01/03/2020,1.0\nyesterday,0.9\n");
        let err = load_transport(f.path()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().contains("Line 3"));
    }

    #[test]
    fn duplicate_dates_are_rejected() {
        let f = write_csv("Date,Cars\n01/03/2020,1.0\n2020-03-01,0.9\n");
        assert!(load_transport(f.path()).unwrap_err().message().contains("Duplicate"));
    }

    #[test]
    fn missing_file_is_an_input_error() {
        let err = load_transport(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn weather_computes_temperature_excess() {
        let f = write_csv(
            "date,temperature,avg_monthly_temperature_2020\n\
             01/04/2020,12.5,10.0\n\
             02/04/2020,,10.0\n",
        );
        let w = load_weather(f.path()).unwrap();
        assert_eq!(w.temperature_excess[0], 2.5);
        assert!(w.temperature_excess[1].is_nan());
    }

    #[test]
    fn weather_requires_its_columns() {
        let f = write_csv("date,temp\n01/04/2020,12.5\n");
        let err = load_weather(f.path()).unwrap_err();
        assert!(err.message().contains("temperature"));
    }
}
