//! Tab-delimited tables with one header row or a two-row entity/level header.

use crate::errors::{AppError, Result};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};

/// Cell values read as missing and written back as empty cells.
const MISSING_TOKENS: [&str; 9] = ["", "NA", "N/A", "NaN", "nan", "null", "NULL", "#N/A", "excluded"];

/// Opens a plain or gzip/bgzip compressed text file.
pub fn open_text_reader(path: &str) -> Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    if path.ends_with(".gz") {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

pub fn is_missing(cell: &str) -> bool {
    MISSING_TOKENS.contains(&cell.trim())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// One or two header rows; the second row holds level labels.
    pub headers: Vec<Vec<String>>,
    pub rows: Vec<Vec<String>>,
    pub source: String,
}

impl Table {
    pub fn read(path: &str, header_rows: usize) -> Result<Self> {
        Self::read_from(open_text_reader(path)?, path, header_rows)
    }

    /// Reads a table whose rows may be narrower than the header, which are
    /// padded with empty cells. A row with non-empty cells beyond the header
    /// is rejected; trailing empty cells are dropped.
    pub fn read_from<R: BufRead>(mut reader: R, source: &str, header_rows: usize) -> Result<Self> {
        let mut headers: Vec<Vec<String>> = Vec::with_capacity(header_rows);
        let mut rows = Vec::new();
        let mut width = 0;
        let mut line_number = 0_usize;
        let mut buf = String::new();
        loop {
            buf.clear();
            if reader.read_line(&mut buf)? == 0 {
                break;
            }
            line_number += 1;
            let line = buf.trim_end_matches(['\n', '\r']);
            if headers.len() < header_rows {
                let header = line.split('\t').map(str::to_string).collect::<Vec<_>>();
                width = width.max(header.len());
                headers.push(header);
                continue;
            }
            if line.trim().is_empty() {
                continue;
            }
            let mut row = line
                .split('\t')
                .map(|cell| if is_missing(cell) { String::new() } else { cell.to_string() })
                .collect::<Vec<_>>();
            if row.len() > width {
                if row[width..].iter().any(|cell| !cell.is_empty()) {
                    return Err(AppError::ParseError {
                        message: format!(
                            "table {source} line {line_number}: expected {width} fields, saw {}",
                            row.len()
                        ),
                    });
                }
                row.truncate(width);
            }
            row.resize(width, String::new());
            rows.push(row);
        }

        if headers.len() < header_rows {
            return Err(AppError::ParseError {
                message: format!("table {source} has fewer than {header_rows} header rows"),
            });
        }

        for header in &mut headers {
            header.resize(width, String::new());
        }

        Ok(Self {
            headers,
            rows,
            source: source.to_string(),
        })
    }

    /// Finds a column by name, and by level label when the table carries a
    /// second header row.
    pub fn column_index(&self, name: &str, level: Option<&str>) -> Result<usize> {
        let names = self.headers.first().map(Vec::as_slice).unwrap_or_default();
        let levels = self.headers.get(1);
        names
            .iter()
            .enumerate()
            .find(|(index, candidate)| {
                candidate.as_str() == name
                    && match (level, levels) {
                        (Some(level), Some(levels)) => {
                            levels.get(*index).is_some_and(|value| value == level)
                        }
                        _ => true,
                    }
            })
            .map(|(index, _)| index)
            .ok_or_else(|| AppError::MissingColumn {
                column: match level {
                    Some(level) if self.headers.len() > 1 => format!("({name}, {level})"),
                    _ => name.to_string(),
                },
                path: self.source.clone(),
            })
    }

    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|values| values.get(column))
            .map_or("", String::as_str)
    }

    /// Appends a column; `header` supplies one label per header row. Each
    /// value lands under the new header whatever the row's prior width.
    pub fn push_column(&mut self, header: &[&str], values: Vec<String>) {
        for (row, label) in self.headers.iter_mut().zip(header) {
            row.push((*label).to_string());
        }
        let width = self.headers.first().map_or(0, Vec::len);
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.resize(width.saturating_sub(1), String::new());
            row.push(value);
        }
    }

    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W) -> Result<()> {
        for header in &self.headers {
            out.write_all(header.join("\t").as_bytes())?;
            out.write_all(b"\n")?;
        }
        for row in &self.rows {
            out.write_all(row.join("\t").as_bytes())?;
            out.write_all(b"\n")?;
        }
        Ok(())
    }
}
