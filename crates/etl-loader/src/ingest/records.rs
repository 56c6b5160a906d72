//! In-memory table read from a delimited export

use serde::Serialize;
use std::collections::HashMap;
use std::io::Read;
use thiserror::Error;

const BYTE_ORDER_MARK: char = '\u{feff}';

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Delimiter '{0}' is not a single-byte character")]
    UnsupportedDelimiter(char),

    #[error("File has no header row")]
    MissingHeader,

    #[error("Line {line}: expected at most {expected} fields, found {found}")]
    TooManyFields {
        line: u64,
        expected: usize,
        found: usize,
    },
}

/// Column-named rows of text cells. Empty cells are `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordSet {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl RecordSet {
    /// Build a record set; short rows are padded with `None`, long rows truncated.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, None);
                row
            })
            .collect();
        Self { columns, rows }
    }

    /// Parse a whole delimited file.
    ///
    /// Header names lose byte-order marks and surrounding whitespace. A row with more
    /// fields than the header is an error; a shorter one is padded with `None`.
    pub fn from_csv_reader<R: Read>(reader: R, delimiter: char) -> Result<Self, RecordError> {
        let delimiter =
            u8::try_from(delimiter).map_err(|_| RecordError::UnsupportedDelimiter(delimiter))?;

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let columns: Vec<String> = reader.headers()?.iter().map(clean_header).collect();
        if columns.iter().all(|c| c.is_empty()) {
            return Err(RecordError::MissingHeader);
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            if record.len() > columns.len() {
                return Err(RecordError::TooManyFields {
                    line: record.position().map(|p| p.line()).unwrap_or_default(),
                    expected: columns.len(),
                    found: record.len(),
                });
            }

            let mut row: Vec<Option<String>> = record
                .iter()
                .map(|field| (!field.is_empty()).then(|| field.to_string()))
                .collect();
            row.resize(columns.len(), None);
            rows.push(row);
        }

        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Position of the first column with this name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Names from `expected` that no column carries, in the order given
    pub fn missing_columns<'a, I>(&self, expected: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        expected
            .into_iter()
            .filter(|name| !self.has_column(name))
            .map(str::to_string)
            .collect()
    }

    /// Rename columns using an `actual -> new` map
    pub fn rename_columns(&mut self, renames: &HashMap<String, String>) {
        for column in &mut self.columns {
            if let Some(new_name) = renames.get(column) {
                *column = new_name.clone();
            }
        }
    }

    /// Append a column holding the same value in every row
    pub fn push_constant_column(&mut self, name: &str, value: &str) {
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(Some(value.to_string()));
        }
    }

    /// Keep only `columns`, in that order. `None` if any is absent.
    pub fn project(&self, columns: &[&str]) -> Option<RecordSet> {
        let indices = columns
            .iter()
            .map(|name| self.column_index(name))
            .collect::<Option<Vec<_>>>()?;

        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();

        Some(RecordSet {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        })
    }
}

fn clean_header(raw: &str) -> String {
    raw.replace(BYTE_ORDER_MARK, "").trim().to_string()
}
