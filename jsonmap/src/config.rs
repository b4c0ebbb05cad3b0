//! Runtime configuration from the environment.

use std::env;
use std::path::PathBuf;

use tracing::warn;

use crate::sheet::{SheetOptions, DEFAULT_HEADER_ROWS};

/// Environment variable names
pub const HEADER_ROWS_VAR: &str = "JSONMAP_HEADER_ROWS";
pub const DELIMITER_VAR: &str = "JSONMAP_DELIMITER";
pub const OUTPUT_DIR_VAR: &str = "JSONMAP_OUTPUT_DIR";
pub const FUNCTIONS_VAR: &str = "JSONMAP_FUNCTIONS";

/// Settings shared by every command; CLI flags override them.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Header rows skipped at the top of rule sheets
    pub header_rows: usize,
    /// Fixed sheet delimiter (auto-detect if not set)
    pub delimiter: Option<char>,
    /// Directory artifacts are written to
    pub output_dir: PathBuf,
    /// Function registry file extending the built-ins
    pub functions_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            header_rows: DEFAULT_HEADER_ROWS,
            delimiter: None,
            output_dir: PathBuf::from("."),
            functions_file: None,
        }
    }
}

impl Config {
    /// Load from the process environment.
    ///
    /// The binary loads `.env` into the environment before calling this.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Invalid values are logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let value = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(raw) = value(HEADER_ROWS_VAR) {
            match raw.parse() {
                Ok(rows) => config.header_rows = rows,
                Err(_) => warn!(var = HEADER_ROWS_VAR, value = %raw, "ignoring invalid header row count"),
            }
        }

        if let Some(raw) = lookup(DELIMITER_VAR).filter(|v| !v.is_empty()) {
            let mut chars = raw.chars();
            match (parse_delimiter(&raw), chars.next(), chars.next()) {
                (Some(c), _, _) => config.delimiter = Some(c),
                (None, Some(c), None) if c.is_ascii() => config.delimiter = Some(c),
                _ => warn!(var = DELIMITER_VAR, value = %raw, "ignoring invalid delimiter"),
            }
        }

        if let Some(dir) = value(OUTPUT_DIR_VAR) {
            config.output_dir = PathBuf::from(dir);
        }
        config.functions_file = value(FUNCTIONS_VAR).map(PathBuf::from);

        config
    }

    pub fn sheet_options(&self) -> SheetOptions {
        SheetOptions {
            header_rows: self.header_rows,
            delimiter: self.delimiter,
        }
    }
}

/// Named delimiters, for values that are awkward to put in a `.env` file
fn parse_delimiter(raw: &str) -> Option<char> {
    match raw.to_lowercase().as_str() {
        "tab" | "\\t" => Some('\t'),
        "comma" => Some(','),
        "semicolon" => Some(';'),
        "pipe" => Some('|'),
        _ => None,
    }
}
