//! Column inference for CSV extracts and the YAML column file `probe` writes.
//!
//! Inference samples the first `sample_rows` records (0 scans the whole
//! file) and narrows each column's candidates: integer, then float, then one
//! of [`DATE_FORMAT_CANDIDATES`], falling back to string.

use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use heck::ToSnakeCase;
use serde::{Deserialize, Serialize};

use crate::schema::{Column, DataType, DateFormat};

/// Abstract date formats tried during inference, in preference order.
pub const DATE_FORMAT_CANDIDATES: &[&str] = &[
    "yyyy-mm-dd",
    "yyyy/mm/dd",
    "dd/mm/yyyy",
    "mm/dd/yyyy",
    "dd-mm-yyyy",
    "dd mmm yyyy",
    "mmmm dd yyyy",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnFile {
    pub columns: Vec<Column>,
}

impl ColumnFile {
    pub fn save(&self, path: &Path) -> Result<()> {
        let file =
            File::create(path).with_context(|| format!("Creating column file {path:?}"))?;
        serde_yaml::to_writer(file, self).context("Writing column YAML")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening column file {path:?}"))?;
        let reader = BufReader::new(file);
        let columns = serde_yaml::from_reader(reader).context("Parsing column YAML")?;
        Ok(columns)
    }
}

#[derive(Debug, Clone)]
struct TypeCandidate {
    seen_value: bool,
    possible_integer: bool,
    possible_float: bool,
    date_formats: Vec<DateFormat>,
}

impl TypeCandidate {
    fn new(formats: &[DateFormat]) -> Self {
        Self {
            seen_value: false,
            possible_integer: true,
            possible_float: true,
            date_formats: formats.to_vec(),
        }
    }

    fn observe(&mut self, value: &str) {
        self.seen_value = true;
        if self.possible_integer && value.parse::<i64>().is_err() {
            self.possible_integer = false;
        }
        if self.possible_float && value.parse::<f64>().is_err() {
            self.possible_float = false;
        }
        if !self.date_formats.is_empty() {
            self.date_formats
                .retain(|format| format.parse_value(value).is_some());
        }
    }

    fn decide(&self, name: String) -> Column {
        if !self.seen_value {
            Column::new(name, DataType::String)
        } else if self.possible_integer {
            Column::new(name, DataType::Int)
        } else if self.possible_float {
            Column::new(name, DataType::Float)
        } else if let Some(format) = self.date_formats.first() {
            Column::new(name, DataType::Date).with_date_format(format.pattern())
        } else {
            Column::new(name, DataType::String)
        }
    }
}

pub fn infer_columns(path: &Path, sample_rows: usize, snake_case: bool) -> Result<Vec<Column>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("Opening CSV file {path:?}"))?;
    let headers = reader
        .headers()
        .with_context(|| format!("Reading headers of {path:?}"))?
        .clone();
    let formats = DATE_FORMAT_CANDIDATES
        .iter()
        .map(|pattern| DateFormat::parse(pattern))
        .collect::<Vec<_>>();
    let mut candidates = vec![TypeCandidate::new(&formats); headers.len()];

    let mut record = csv::StringRecord::new();
    let mut processed = 0usize;
    while reader
        .read_record(&mut record)
        .with_context(|| format!("Reading row {} of {path:?}", processed + 2))?
    {
        if sample_rows > 0 && processed >= sample_rows {
            break;
        }
        for (idx, field) in record.iter().enumerate() {
            let trimmed = field.trim();
            if trimmed.is_empty() {
                continue;
            }
            if let Some(candidate) = candidates.get_mut(idx) {
                candidate.observe(trimmed);
            }
        }
        processed += 1;
    }

    let columns = headers
        .iter()
        .zip(candidates.iter())
        .map(|(header, candidate)| {
            let name = if snake_case {
                header.to_snake_case()
            } else {
                header.to_string()
            };
            candidate.decide(name)
        })
        .collect();
    Ok(columns)
}
