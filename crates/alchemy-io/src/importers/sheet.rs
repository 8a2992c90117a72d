//! Column-addressed access to one CSV sheet of a tabular workbook.

use crate::params::parse_flag;
use alchemy_core::{LineShape, Location};
use anyhow::{anyhow, Context, Result};
use csv::{ErrorKind, ReaderBuilder, StringRecord, Trim};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Directory holding one `<SHEET>.csv` file per sheet.
#[derive(Debug, Clone)]
pub struct Workbook {
    dir: PathBuf,
}

impl Workbook {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(anyhow!("workbook directory {} does not exist", dir.display()));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn sheet_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.csv"))
    }

    /// Load a sheet; a missing file yields an empty sheet.
    pub fn sheet(&self, name: &str) -> Result<Sheet> {
        let path = self.sheet_path(name);
        if !path.exists() {
            debug!(sheet = name, "sheet not present, treating as empty");
            return Ok(Sheet::empty(name));
        }
        Sheet::from_path(name, &path)
    }

    /// Load a sheet that must exist.
    pub fn require(&self, name: &str) -> Result<Sheet> {
        let path = self.sheet_path(name);
        if !path.exists() {
            return Err(anyhow!("required sheet {} is missing", path.display()));
        }
        Sheet::from_path(name, &path)
    }
}

/// A record the CSV reader could not decode, kept so importers can report it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRecord {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Sheet {
    name: String,
    columns: HashMap<String, usize>,
    /// Records with their 1-based line in the file.
    records: Vec<(usize, StringRecord)>,
    rejected: Vec<RejectedRecord>,
}

impl Sheet {
    fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: HashMap::new(),
            records: Vec::new(),
            rejected: Vec::new(),
        }
    }

    /// Read a sheet. Undecodable records (invalid UTF-8 and the like) are skipped and
    /// listed in [`Sheet::rejected`]; only I/O errors fail the whole sheet.
    pub fn from_path(name: &str, path: &Path) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .trim(Trim::All)
            .from_path(path)
            .with_context(|| format!("opening sheet {}", path.display()))?;
        let headers = reader
            .headers()
            .with_context(|| format!("reading header of {}", path.display()))?
            .clone();
        let mut columns = HashMap::new();
        for (idx, header) in headers.iter().enumerate() {
            if !header.is_empty() {
                columns.entry(header.to_string()).or_insert(idx);
            }
        }
        let mut records = Vec::new();
        let mut rejected = Vec::new();
        for (idx, record) in reader.records().enumerate() {
            let fallback_line = idx + 2;
            match record {
                Ok(record) => {
                    let line = record
                        .position()
                        .map_or(fallback_line, |pos| pos.line() as usize);
                    records.push((line, record));
                }
                Err(err) if matches!(err.kind(), ErrorKind::Io(_)) => {
                    return Err(err).with_context(|| {
                        format!("reading {} row {fallback_line}", path.display())
                    });
                }
                Err(err) => {
                    let line = err
                        .position()
                        .map_or(fallback_line, |pos| pos.line() as usize);
                    warn!(sheet = name, line, "skipping undecodable record: {err}");
                    rejected.push(RejectedRecord {
                        line,
                        message: err.to_string(),
                    });
                }
            }
        }
        Ok(Self {
            name: name.to_string(),
            columns,
            records,
            rejected,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn rejected(&self) -> &[RejectedRecord] {
        &self.rejected
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.records.iter().map(move |(line, record)| Row {
            sheet: self,
            record,
            line: *line,
        })
    }
}

/// One data row. Blank cells and absent columns both read as `None`.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    sheet: &'a Sheet,
    record: &'a StringRecord,
    line: usize,
}

impl<'a> Row<'a> {
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn text(&self, column: &str) -> Option<&'a str> {
        let idx = *self.sheet.columns.get(column)?;
        self.record
            .get(idx)
            .filter(|value| !value.is_empty() && !value.eq_ignore_ascii_case("nan"))
    }

    /// Text of a column that every row of the sheet must carry.
    pub fn required(&self, column: &str) -> Result<&'a str> {
        self.text(column).ok_or_else(|| {
            anyhow!(
                "{} line {}: missing value for column {}",
                self.sheet.name,
                self.line,
                column
            )
        })
    }

    /// Identifier cell, normalized with [`normalize_id`].
    pub fn id(&self, column: &str) -> Option<String> {
        self.text(column).map(normalize_id)
    }

    pub fn required_id(&self, column: &str) -> Result<String> {
        self.required(column).map(normalize_id)
    }

    pub fn number(&self, column: &str) -> Option<f64> {
        self.text(column).and_then(|v| v.parse::<f64>().ok())
    }

    pub fn number_or_zero(&self, column: &str) -> f64 {
        self.number(column).unwrap_or(0.0)
    }

    pub fn flag(&self, column: &str) -> Option<bool> {
        self.text(column).and_then(parse_flag)
    }

    /// Point from `LATITUDE`/`LONGITUDE`.
    pub fn location(&self) -> Option<Location> {
        match (self.number("LATITUDE"), self.number("LONGITUDE")) {
            (Some(lat), Some(lon)) => Some(Location::new(lat, lon)),
            _ => None,
        }
    }

    /// Polyline read as latitude/longitude pairs starting at `column` and running
    /// to the end of the row or the first incomplete pair.
    pub fn shape_from(&self, column: &str) -> Option<LineShape> {
        let start = *self.sheet.columns.get(column)?;
        let mut points = Vec::new();
        let mut idx = start;
        while idx + 1 < self.record.len() {
            let lat = self.record.get(idx).and_then(|v| v.parse::<f64>().ok());
            let lon = self.record.get(idx + 1).and_then(|v| v.parse::<f64>().ok());
            match (lat, lon) {
                (Some(lat), Some(lon)) => points.push(Location::new(lat, lon)),
                _ => break,
            }
            idx += 2;
        }
        if points.is_empty() {
            None
        } else {
            Some(LineShape(points))
        }
    }
}

/// Strip the float artefact spreadsheets leave on integer ids: `"12.0"` becomes
/// `"12"`. Anything else (`"1.05"`, `"A.0B"`, `"X.0"`) is only trimmed.
pub fn normalize_id(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.strip_suffix(".0") {
        Some(head) if !head.is_empty() && head.bytes().all(|b| b.is_ascii_digit()) => {
            head.to_string()
        }
        _ => trimmed.to_string(),
    }
}
