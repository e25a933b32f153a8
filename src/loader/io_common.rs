// Primitives shared by the readers: opening tables, locating columns and
// parsing cells.

use std::fs::File;

use calamine::{open_workbook, DataType, Reader, Xlsx};
use chrono::NaiveDate;
use csv::StringRecord;

use crate::loader::*;

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y"];

pub fn simplify_file_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

pub fn open_csv(path: &Path) -> LoaderResult<(csv::Reader<File>, StringRecord)> {
    let display = path.display().to_string();
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .context(OpeningCsvSnafu {
            path: display.clone(),
        })?;
    let headers = rdr
        .headers()
        .context(ReadingCsvSnafu { path: display })?
        .clone();
    debug!("open_csv: {:?} headers: {:?}", path, headers);
    Ok((rdr, headers))
}

pub fn column_index(headers: &StringRecord, column: &str, path: &Path) -> LoaderResult<usize> {
    headers
        .iter()
        .position(|h| h.trim() == column)
        .context(MissingColumnSnafu {
            path: path.display().to_string(),
            column,
        })
}

pub fn field<'a>(
    record: &'a StringRecord,
    idx: usize,
    path: &Path,
    lineno: usize,
) -> LoaderResult<&'a str> {
    record.get(idx).context(CsvLineTooShortSnafu {
        path: path.display().to_string(),
        lineno,
    })
}

pub fn try_parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

pub fn parse_date(s: &str, path: &Path, lineno: usize) -> LoaderResult<NaiveDate> {
    try_parse_date(s).context(ParsingDateSnafu {
        path: path.display().to_string(),
        lineno,
        value: s,
    })
}

/// An empty cell is a missing observation. Anything else must be a finite
/// number.
pub fn parse_count(s: &str, path: &Path, lineno: usize) -> LoaderResult<Option<f64>> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }
    match s.parse::<f64>() {
        Ok(x) if x.is_finite() => Ok(Some(x)),
        _ => ParsingNumberSnafu {
            path: path.display().to_string(),
            lineno,
            value: s,
        }
        .fail(),
    }
}

/// Populations may be written as integers or as floats (`8398748.0`).
/// Empty and negative values are unknown.
pub fn parse_population(s: &str, path: &Path, lineno: usize) -> LoaderResult<Option<u64>> {
    match parse_count(s, path, lineno)? {
        Some(x) if x >= 0.0 => Ok(Some(x.round() as u64)),
        Some(x) => {
            warn!(
                "{}:{}: negative population {}, treated as unknown",
                simplify_file_name(path),
                lineno,
                x
            );
            Ok(None)
        }
        None => Ok(None),
    }
}

/// Reads every row of a long table and hands the cells of its
/// `key_columns` to `resolve`, which names the entity the row belongs to or
/// rejects it.
///
/// `metrics` pairs each metric with the column holding its values. Returns
/// the number of rows dropped by `resolve`.
pub fn read_long_table<F>(
    path: &Path,
    key_columns: &[&str],
    date_column: &str,
    metrics: &[(Metric, &str)],
    builder: &mut PanelBuilder,
    mut resolve: F,
) -> LoaderResult<usize>
where
    F: FnMut(&[&str], usize) -> LoaderResult<Option<EntityId>>,
{
    let display = path.display().to_string();
    let (mut rdr, headers) = open_csv(path)?;
    let mut key_idxs: Vec<usize> = Vec::new();
    for column in key_columns.iter() {
        key_idxs.push(column_index(&headers, column, path)?);
    }
    let date_idx = column_index(&headers, date_column, path)?;
    let mut metric_idxs: Vec<(Metric, usize)> = Vec::new();
    for (metric, column) in metrics.iter() {
        metric_idxs.push((*metric, column_index(&headers, column, path)?));
    }

    let mut num_rows = 0;
    let mut dropped = 0;
    for (idx, line_r) in rdr.records().enumerate() {
        // The header is line 1.
        let lineno = idx + 2;
        let line = line_r.context(ReadingCsvSnafu {
            path: display.clone(),
        })?;
        num_rows += 1;
        let mut keys: Vec<&str> = Vec::with_capacity(key_idxs.len());
        for key_idx in key_idxs.iter() {
            keys.push(field(&line, *key_idx, path, lineno)?);
        }
        let id = match resolve(&keys, lineno)? {
            Some(id) => id,
            None => {
                debug!("{}:{}: dropping unmapped row {:?}", display, lineno, line);
                dropped += 1;
                continue;
            }
        };
        let date = parse_date(field(&line, date_idx, path, lineno)?, path, lineno)?;
        for (metric, col_idx) in metric_idxs.iter() {
            if let Some(v) = parse_count(field(&line, *col_idx, path, lineno)?, path, lineno)? {
                builder
                    .add_observation(&id, date, *metric, v)
                    .context(PanelSnafu {})?;
            }
        }
    }
    info!(
        "Read {} rows from {:?} ({} dropped)",
        num_rows,
        simplify_file_name(path),
        dropped
    );
    if dropped > 0 {
        warn!(
            "{}: dropped {} rows that could not be matched to an entity",
            simplify_file_name(path),
            dropped
        );
    }
    Ok(dropped)
}

/// A whole table in memory, read from CSV or from the first (or named)
/// worksheet of an Excel file.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub path: PathBuf,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn read(path: &Path, worksheet: Option<&str>) -> LoaderResult<RawTable> {
        let is_excel = path
            .extension()
            .map(|e| {
                let e = e.to_string_lossy().to_lowercase();
                e == "xlsx" || e == "xlsm"
            })
            .unwrap_or(false);
        if is_excel {
            RawTable::read_excel(path, worksheet)
        } else {
            RawTable::read_csv(path)
        }
    }

    fn read_csv(path: &Path) -> LoaderResult<RawTable> {
        let (mut rdr, headers) = open_csv(path)?;
        let mut rows: Vec<Vec<String>> = Vec::new();
        for line_r in rdr.records() {
            let line = line_r.context(ReadingCsvSnafu {
                path: path.display().to_string(),
            })?;
            rows.push(line.iter().map(|s| s.to_string()).collect());
        }
        Ok(RawTable {
            path: path.to_path_buf(),
            header: headers.iter().map(|s| s.trim().to_string()).collect(),
            rows,
        })
    }

    fn read_excel(path: &Path, worksheet: Option<&str>) -> LoaderResult<RawTable> {
        let display = path.display().to_string();
        let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu {
            path: display.clone(),
        })?;
        let sheet = worksheet.unwrap_or("<first>");
        let wrange = match worksheet {
            Some(name) => workbook.worksheet_range(name),
            None => workbook.worksheet_range_at(0),
        }
        .context(EmptyExcelSnafu {
            path: display.clone(),
            sheet,
        })?
        .context(OpeningExcelSnafu {
            path: display.clone(),
        })?;

        let mut iter = wrange.rows();
        let header: Vec<String> = iter
            .next()
            .context(EmptyExcelSnafu {
                path: display.clone(),
                sheet,
            })?
            .iter()
            .map(|c| cell_to_string(c).trim().to_string())
            .collect();
        debug!("read_excel: {:?} header: {:?}", path, header);
        let rows: Vec<Vec<String>> = iter
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect();
        Ok(RawTable {
            path: path.to_path_buf(),
            header,
            rows,
        })
    }

    pub fn column(&self, column: &str) -> LoaderResult<usize> {
        self.header
            .iter()
            .position(|h| h == column)
            .context(MissingColumnSnafu {
                path: self.path.display().to_string(),
                column,
            })
    }

    /// The cell of a data row. `row_idx` counts data rows from 0.
    pub fn cell(&self, row_idx: usize, col_idx: usize) -> LoaderResult<&str> {
        self.rows
            .get(row_idx)
            .and_then(|r| r.get(col_idx))
            .map(|s| s.as_str())
            .context(CsvLineTooShortSnafu {
                path: self.path.display().to_string(),
                lineno: row_idx + 2,
            })
    }
}

fn cell_to_string(cell: &DataType) -> String {
    match cell {
        DataType::String(s) => s.clone(),
        // Codes and populations come out of Excel as floats.
        DataType::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        DataType::Float(f) => f.to_string(),
        DataType::Int(i) => i.to_string(),
        DataType::Bool(b) => b.to_string(),
        DataType::Empty => "".to_string(),
        other => format!("{:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::write_fixture;

    #[test]
    fn counts_and_populations() {
        let p = Path::new("t.csv");
        assert_eq!(parse_count(" 12 ", p, 2).unwrap(), Some(12.0));
        assert_eq!(parse_count("", p, 2).unwrap(), None);
        assert_eq!(parse_count("-3", p, 2).unwrap(), Some(-3.0));
        assert!(matches!(
            parse_count("n/a", p, 7),
            Err(LoaderError::ParsingNumber { lineno: 7, .. })
        ));
        assert!(parse_count("inf", p, 2).is_err());
        assert_eq!(parse_population("8398748.0", p, 2).unwrap(), Some(8_398_748));
        assert_eq!(parse_population("-1", p, 2).unwrap(), None);
        assert_eq!(parse_population("", p, 2).unwrap(), None);
    }

    #[test]
    fn dates_in_all_source_formats() {
        let expected = NaiveDate::from_ymd_opt(2020, 1, 22);
        assert_eq!(try_parse_date("2020-01-22"), expected);
        assert_eq!(try_parse_date("1/22/20"), expected);
        assert_eq!(try_parse_date("01/22/2020"), expected);
        assert_eq!(try_parse_date("Lat"), None);
    }

    #[test]
    fn raw_table_from_csv() {
        let dir = tempfile::tempdir().unwrap();
        let p = write_fixture(dir.path(), "pop.csv", "fips, abbrev ,2018\n1,AL,4887871\n");
        let t = RawTable::read(&p, None).unwrap();
        assert_eq!(t.column("abbrev").unwrap(), 1);
        assert_eq!(t.cell(0, 2).unwrap(), "4887871");
        assert!(matches!(
            t.column("pop18"),
            Err(LoaderError::MissingColumn { .. })
        ));
        assert!(t.cell(1, 0).is_err());
    }

    #[test]
    fn excel_cells() {
        assert_eq!(cell_to_string(&DataType::Float(6037.0)), "6037");
        assert_eq!(cell_to_string(&DataType::Float(1.5)), "1.5");
        assert_eq!(cell_to_string(&DataType::Int(42)), "42");
        assert_eq!(cell_to_string(&DataType::Empty), "");
        assert_eq!(
            cell_to_string(&DataType::String("King County".to_string())),
            "King County"
        );
    }

    #[test]
    fn missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let res = RawTable::read(&dir.path().join("nope.csv"), None);
        assert!(matches!(res, Err(LoaderError::OpeningCsv { .. })));
    }
}
