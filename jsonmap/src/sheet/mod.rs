//! Rule sheet reader with encoding and delimiter auto-detection.
//!
//! A rule sheet is a spreadsheet exported as delimited text. Columns A to D hold
//! target, source, enumeration and default; the first rows are headers.

use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::debug;

use crate::error::{SheetError, SheetResult};
use crate::rules::Rule;

/// Header rows skipped before the first rule
pub const DEFAULT_HEADER_ROWS: usize = 2;

const DELIMITERS: [char; 4] = [';', ',', '\t', '|'];

/// How to read a sheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetOptions {
    pub header_rows: usize,
    /// Fixed delimiter; detected from the first line when `None`
    pub delimiter: Option<char>,
}

impl Default for SheetOptions {
    fn default() -> Self {
        Self {
            header_rows: DEFAULT_HEADER_ROWS,
            delimiter: None,
        }
    }
}

/// Rules read from a sheet, with the settings that were used
#[derive(Debug, Clone)]
pub struct ParsedSheet {
    pub rules: Vec<Rule>,
    /// Detected encoding
    pub encoding: String,
    /// Detected or configured delimiter
    pub delimiter: char,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let charset = chardet::detect(bytes).0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> SheetResult<String> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => String::from_utf8(bytes.to_vec())
            .map_err(|e| SheetError::EncodingError(e.to_string())),
        "iso-8859-1" | "latin-1" | "latin1" => {
            Ok(encoding_rs::ISO_8859_15.decode(bytes).0.into_owned())
        }
        "windows-1252" | "cp1252" => Ok(encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned()),
        // Unknown charset: best effort
        _ => Ok(String::from_utf8_lossy(bytes).into_owned()),
    }
}

/// Detect the delimiter by counting occurrences outside quotes in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let mut counts = [0usize; DELIMITERS.len()];
    let mut quoted = false;
    for c in first_line.chars() {
        if c == '"' {
            quoted = !quoted;
        } else if !quoted {
            if let Some(i) = DELIMITERS.iter().position(|d| *d == c) {
                counts[i] += 1;
            }
        }
    }

    // Ties keep the earlier candidate, so a line without separators gives ';'
    let mut best = 0;
    for i in 1..DELIMITERS.len() {
        if counts[i] > counts[best] {
            best = i;
        }
    }
    DELIMITERS[best]
}

/// Read rules from decoded text.
///
/// Fully empty rows are skipped. A row that fills only one of target and source
/// is an error naming the missing column.
pub fn read_rules(content: &str, delimiter: char, header_rows: usize) -> SheetResult<Vec<Rule>> {
    let delimiter = u8::try_from(delimiter)
        .map_err(|_| SheetError::ParseError(format!("delimiter '{}' is not ASCII", delimiter)))?;

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .delimiter(delimiter)
        .from_reader(content.as_bytes());

    let mut rules = Vec::new();
    for record in reader.records().skip(header_rows) {
        let record = record.map_err(|e| SheetError::ParseError(e.to_string()))?;
        let line = record.position().map(|p| p.line() as usize).unwrap_or(0);
        if let Some(rule) = row_to_rule(&record, line)? {
            rules.push(rule);
        }
    }

    if rules.is_empty() {
        return Err(SheetError::EmptySheet);
    }
    Ok(rules)
}

fn cell(record: &StringRecord, index: usize) -> Option<String> {
    record
        .get(index)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn row_to_rule(record: &StringRecord, line: usize) -> SheetResult<Option<Rule>> {
    if record.iter().all(str::is_empty) {
        return Ok(None);
    }

    let missing = |column: char, what: &str| SheetError::InvalidRow {
        line,
        column,
        message: format!("missing {}", what),
    };
    let target = cell(record, 0).ok_or_else(|| missing('A', "target path"))?;
    let source = cell(record, 1).ok_or_else(|| missing('B', "source expression"))?;

    Ok(Some(Rule {
        target,
        source,
        enumeration: cell(record, 2),
        default: cell(record, 3),
    }))
}

/// Parse sheet bytes, detecting encoding and (unless fixed) the delimiter.
pub fn parse_bytes(bytes: &[u8], options: &SheetOptions) -> SheetResult<ParsedSheet> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let delimiter = options
        .delimiter
        .unwrap_or_else(|| detect_delimiter(&content));

    let rules = read_rules(&content, delimiter, options.header_rows)?;
    debug!(
        rules = rules.len(),
        %encoding,
        delimiter = %delimiter.escape_default(),
        "read rule sheet"
    );

    Ok(ParsedSheet {
        rules,
        encoding,
        delimiter,
    })
}

/// Read a rule sheet file.
pub fn read_rules_file<P: AsRef<Path>>(path: P, options: &SheetOptions) -> SheetResult<ParsedSheet> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes(&bytes, options)
}
