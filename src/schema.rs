//! Column value objects and the abstract date-format token syntax.
//!
//! A [`Column`] is what the backend catalog reports for a live table (or what
//! a caller hands to a bulk load). Its [`DataType`] is the semantic type shared
//! by every backend; native storage types are mapped onto it by the driver.
//!
//! Date formats are written with backend-neutral placeholder tokens
//! (`yyyy`, `yy`, `mmmm`, `mmm`, `mm`, `dd`, matched case-insensitively).
//! [`DateFormat`] parses such a string once and renders it either as a
//! PostgreSQL `to_date` template or as a chrono format string.

use std::{fmt, str::FromStr};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DEFAULT_DATE_FORMAT: &str = "yyyy-mm-dd";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    String,
    Int,
    Float,
    Date,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Int => "int",
            DataType::Float => "float",
            DataType::Date => "date",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "string" | "text" => Ok(DataType::String),
            "int" | "integer" => Ok(DataType::Int),
            "float" | "double" => Ok(DataType::Float),
            "date" => Ok(DataType::Date),
            other => Err(format!("Unknown data type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(default)]
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_format: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            date_format: None,
        }
    }

    pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = Some(format.into());
        self
    }

    /// Configured date format, falling back to [`DEFAULT_DATE_FORMAT`].
    pub fn date_format(&self) -> DateFormat {
        resolve_date_format(self.date_format.as_deref())
    }
}

pub fn resolve_date_format(format: Option<&str>) -> DateFormat {
    match format.map(str::trim) {
        Some(pattern) if !pattern.is_empty() => DateFormat::parse(pattern),
        _ => DateFormat::default(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateToken {
    Year4,
    Year2,
    MonthName,
    MonthAbbrev,
    Month,
    Day,
}

// Longest tokens first: `yyyy` before `yy`, `mmmm` before `mmm` before `mm`.
const DATE_TOKENS: &[(&str, DateToken)] = &[
    ("yyyy", DateToken::Year4),
    ("yy", DateToken::Year2),
    ("mmmm", DateToken::MonthName),
    ("mmm", DateToken::MonthAbbrev),
    ("mm", DateToken::Month),
    ("dd", DateToken::Day),
];

impl DateToken {
    fn postgres(self) -> &'static str {
        match self {
            DateToken::Year4 => "YYYY",
            DateToken::Year2 => "YY",
            DateToken::MonthName => "FMMonth",
            DateToken::MonthAbbrev => "Mon",
            DateToken::Month => "MM",
            DateToken::Day => "DD",
        }
    }

    fn chrono(self) -> &'static str {
        match self {
            DateToken::Year4 => "%Y",
            DateToken::Year2 => "%y",
            DateToken::MonthName => "%B",
            DateToken::MonthAbbrev => "%b",
            DateToken::Month => "%m",
            DateToken::Day => "%d",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Token(DateToken),
    Literal(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateFormat {
    pattern: String,
    segments: Vec<Segment>,
}

impl DateFormat {
    pub fn parse(pattern: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = pattern;
        'scan: while !rest.is_empty() {
            for (token, kind) in DATE_TOKENS {
                let bytes = rest.as_bytes();
                if bytes.len() >= token.len()
                    && bytes[..token.len()].eq_ignore_ascii_case(token.as_bytes())
                {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Token(*kind));
                    rest = &rest[token.len()..];
                    continue 'scan;
                }
            }
            let mut chars = rest.chars();
            if let Some(ch) = chars.next() {
                literal.push(ch);
            }
            rest = chars.as_str();
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Self {
            pattern: pattern.to_string(),
            segments,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Template for PostgreSQL's `to_date`. Letters outside recognised tokens
    /// are double-quoted so the server treats them as literal text.
    pub fn postgres_pattern(&self) -> String {
        let mut out = String::with_capacity(self.pattern.len() + 8);
        for segment in &self.segments {
            match segment {
                Segment::Token(token) => out.push_str(token.postgres()),
                Segment::Literal(text) => push_postgres_literal(&mut out, text),
            }
        }
        out
    }

    pub fn chrono_pattern(&self) -> String {
        let mut out = String::with_capacity(self.pattern.len() + 8);
        for segment in &self.segments {
            match segment {
                Segment::Token(token) => out.push_str(token.chrono()),
                Segment::Literal(text) => out.push_str(&text.replace('%', "%%")),
            }
        }
        out
    }

    /// True when the format names a year, a month and a day, i.e. when a
    /// value can be fully parsed without backend defaults.
    pub fn is_complete(&self) -> bool {
        let has = |wanted: &[DateToken]| {
            self.segments
                .iter()
                .any(|s| matches!(s, Segment::Token(t) if wanted.contains(t)))
        };
        has(&[DateToken::Year4, DateToken::Year2])
            && has(&[DateToken::MonthName, DateToken::MonthAbbrev, DateToken::Month])
            && has(&[DateToken::Day])
    }

    pub fn parse_value(&self, value: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(value.trim(), &self.chrono_pattern()).ok()
    }
}

impl Default for DateFormat {
    fn default() -> Self {
        DateFormat::parse(DEFAULT_DATE_FORMAT)
    }
}

impl fmt::Display for DateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

fn push_postgres_literal(out: &mut String, text: &str) {
    let mut quoted = false;
    for ch in text.chars() {
        let alphabetic = ch.is_alphabetic();
        if alphabetic && !quoted {
            out.push('"');
            quoted = true;
        } else if !alphabetic && quoted {
            out.push('"');
            quoted = false;
        }
        if ch == '"' {
            out.push_str("\\\"");
        } else {
            out.push(ch);
        }
    }
    if quoted {
        out.push('"');
    }
}
