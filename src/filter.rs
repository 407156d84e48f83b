//! Selection of which listed files get transferred.

use chrono::{NaiveDate, NaiveTime};
use std::fmt;

use crate::error::ConfigError;
use crate::types::RemoteEntry;

/// Kind of search mask selected with `-k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SearchType {
    /// File extension.
    Ext,
    /// Last modified on or after a date (MM-DD-YYYY).
    DateFrom,
    /// Minimum size in bytes.
    Size,
    /// Fragment of the file name.
    Frag,
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SearchType::Ext => "ext",
            SearchType::DateFrom => "date-from",
            SearchType::Size => "size",
            SearchType::Frag => "frag",
        };
        f.write_str(s)
    }
}

/// A validated filter over WebDAV listing entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchFilter {
    Extension(String),
    DateFrom(NaiveDate),
    MinSize(u64),
    Fragment(String),
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn clean_name_value(value: &str, strip_dots: bool) -> Result<String, ConfigError> {
    let mut value = value.replace('"', "");
    if strip_dots {
        value = value.replace('.', "");
    }
    if value.is_empty() {
        return Err(ConfigError::InvalidFilter("search value is empty".into()));
    }
    if let Some(bad) = value.chars().find(|c| !is_allowed(*c)) {
        return Err(ConfigError::InvalidFilter(format!(
            "illegal character '{}'; only letters, digits, '_' and '-' are allowed",
            bad
        )));
    }
    Ok(value)
}

impl SearchFilter {
    /// Validates `value` against `kind`.
    pub fn parse(kind: SearchType, value: &str) -> Result<Self, ConfigError> {
        match kind {
            SearchType::Ext => Ok(SearchFilter::Extension(
                clean_name_value(value, true)?.to_lowercase(),
            )),
            SearchType::Frag => Ok(SearchFilter::Fragment(clean_name_value(value, false)?)),
            SearchType::Size => {
                if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
                    return Err(ConfigError::InvalidFilter(format!(
                        "size '{}' must contain digits only",
                        value
                    )));
                }
                value
                    .parse()
                    .map(SearchFilter::MinSize)
                    .map_err(|e| ConfigError::InvalidFilter(format!("size '{}': {}", value, e)))
            }
            SearchType::DateFrom => NaiveDate::parse_from_str(value, "%m-%d-%Y")
                .map(SearchFilter::DateFrom)
                .map_err(|_| {
                    ConfigError::InvalidFilter(format!(
                        "date '{}' must have the format MM-DD-YYYY",
                        value
                    ))
                }),
        }
    }

    /// Builds a filter from the optional `-k`/`-f` pair; both or neither must be given.
    pub fn from_flags(
        kind: Option<SearchType>,
        value: Option<&str>,
    ) -> Result<Option<Self>, ConfigError> {
        match (kind, value) {
            (None, None) => Ok(None),
            (Some(kind), Some(value)) => Self::parse(kind, value).map(Some),
            (Some(_), None) => Err(ConfigError::InvalidFilter(
                "-k was given without a search value (-f)".into(),
            )),
            (None, Some(_)) => Err(ConfigError::InvalidFilter(
                "-f was given without a search type (-k)".into(),
            )),
        }
    }

    /// Entries without the property the filter needs never match.
    pub fn matches(&self, entry: &RemoteEntry) -> bool {
        match self {
            SearchFilter::Extension(ext) => entry
                .name
                .rsplit_once('.')
                .map(|(_, e)| e.eq_ignore_ascii_case(ext))
                .unwrap_or(false),
            SearchFilter::Fragment(frag) => entry.name.contains(frag.as_str()),
            SearchFilter::MinSize(min) => entry.size.map(|s| s >= *min).unwrap_or(false),
            SearchFilter::DateFrom(date) => {
                let from = date.and_time(NaiveTime::MIN).and_utc();
                entry.last_modified.map(|m| m >= from).unwrap_or(false)
            }
        }
    }
}
