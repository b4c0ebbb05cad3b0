//! Property paths and the `^item` array marker.
//!
//! Paths are dot-separated. A segment wrapped in double quotes is a literal key and
//! may contain dots or the marker text; a bare `^item` segment marks the depth at
//! which an array is expanded.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CompileError, CompileResult};

/// Bare segment that marks an array expansion.
pub const ARRAY_MARKER: &str = "^item";

/// A parsed, marker-free sequence of object keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyPath(Vec<String>);

impl PropertyPath {
    pub fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    /// The empty path, addressing the scope itself.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Every proper, non-empty prefix, shortest first.
    ///
    /// `a.b.c` yields `a` and `a.b`.
    pub fn proper_prefixes(&self) -> impl Iterator<Item = PropertyPath> + '_ {
        (1..self.0.len()).map(move |n| PropertyPath(self.0[..n].to_vec()))
    }

    /// Split into the parent path and the final key.
    pub fn split_last(&self) -> Option<(PropertyPath, &str)> {
        self.0
            .split_last()
            .map(|(last, parent)| (PropertyPath(parent.to_vec()), last.as_str()))
    }

    /// Bracketed accessor form: `["a"]["b"]`.
    pub fn accessor(&self) -> String {
        self.0
            .iter()
            .map(|segment| format!("[{}]", quote(segment)))
            .collect()
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .0
            .iter()
            .map(|segment| {
                if needs_quotes(segment) {
                    quote(segment)
                } else {
                    segment.clone()
                }
            })
            .collect();
        write!(f, "{}", rendered.join("."))
    }
}

/// A path that may carry the array marker.
#[derive(Debug, Clone, PartialEq)]
pub enum PathExpr {
    /// No marker.
    Plain(PropertyPath),
    /// `array.^item.item`; `item` is empty when the marker is the last segment.
    Expanded {
        array: PropertyPath,
        item: PropertyPath,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Key(String),
    Marker,
}

/// Parse a target path such as `order.lines.^item.sku`.
pub fn parse_target(text: &str) -> CompileResult<PathExpr> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(CompileError::InvalidPath {
            path: text.to_string(),
            message: "target path is empty".to_string(),
        });
    }
    split_marker(text, split_segments(trimmed, text)?)
}

/// Parse a source path such as `.customer.name`.
///
/// The leading dot roots the path at the current scope; `.` alone is the scope itself.
pub fn parse_source(text: &str) -> CompileResult<PathExpr> {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix('.') else {
        return Err(CompileError::InvalidPath {
            path: text.to_string(),
            message: "source paths start with '.'".to_string(),
        });
    };
    if rest.trim().is_empty() {
        return Ok(PathExpr::Plain(PropertyPath::root()));
    }
    split_marker(text, split_segments(rest, text)?)
}

fn split_marker(original: &str, segments: Vec<Segment>) -> CompileResult<PathExpr> {
    let markers: Vec<usize> = segments
        .iter()
        .enumerate()
        .filter(|(_, s)| **s == Segment::Marker)
        .map(|(i, _)| i)
        .collect();

    let keys = |slice: &[Segment]| {
        PropertyPath(
            slice
                .iter()
                .filter_map(|s| match s {
                    Segment::Key(k) => Some(k.clone()),
                    Segment::Marker => None,
                })
                .collect(),
        )
    };

    match markers.as_slice() {
        [] => Ok(PathExpr::Plain(keys(&segments))),
        [0] => Err(CompileError::InvalidMarker {
            path: original.to_string(),
            message: "no array path before ^item".to_string(),
        }),
        [at] => Ok(PathExpr::Expanded {
            array: keys(&segments[..*at]),
            item: keys(&segments[at + 1..]),
        }),
        _ => Err(CompileError::InvalidMarker {
            path: original.to_string(),
            message: format!("expected one ^item, found {}", markers.len()),
        }),
    }
}

/// Split on dots outside double quotes.
fn split_segments(text: &str, original: &str) -> CompileResult<Vec<Segment>> {
    let invalid = |message: &str| CompileError::InvalidPath {
        path: original.to_string(),
        message: message.to_string(),
    };

    let mut raw = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_quotes {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_quotes = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_quotes = true;
                current.push(c);
            }
            '.' => raw.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    if in_quotes {
        return Err(invalid("unterminated quoted segment"));
    }
    raw.push(current);

    raw.into_iter()
        .map(|segment| {
            let segment = segment.trim();
            if segment.is_empty() {
                Err(invalid("empty segment"))
            } else if segment.starts_with('"') {
                serde_json::from_str::<String>(segment)
                    .map(Segment::Key)
                    .map_err(|_| invalid("malformed quoted segment"))
            } else if segment == ARRAY_MARKER {
                Ok(Segment::Marker)
            } else {
                Ok(Segment::Key(segment.to_string()))
            }
        })
        .collect()
}

fn quote(segment: &str) -> String {
    serde_json::Value::String(segment.to_string()).to_string()
}

fn needs_quotes(segment: &str) -> bool {
    segment.contains('.') || segment.starts_with('"') || segment.trim() == ARRAY_MARKER
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(segments: &[&str]) -> PropertyPath {
        PropertyPath::new(segments.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_plain_target() {
        let parsed = parse_target("customer . address.city").unwrap();
        assert_eq!(parsed, PathExpr::Plain(path(&["customer", "address", "city"])));
    }

    #[test]
    fn test_accessor() {
        assert_eq!(path(&["a", "b"]).accessor(), r#"["a"]["b"]"#);
        assert_eq!(path(&[r#"say "hi""#]).accessor(), r#"["say \"hi\""]"#);
    }

    #[test]
    fn test_quoted_segment_keeps_dots_and_marker() {
        let parsed = parse_target(r#"meta."v1.2"."^item""#).unwrap();
        assert_eq!(parsed, PathExpr::Plain(path(&["meta", "v1.2", "^item"])));
    }

    #[test]
    fn test_expanded_target() {
        let parsed = parse_target("order.lines.^item.sku").unwrap();
        assert_eq!(
            parsed,
            PathExpr::Expanded {
                array: path(&["order", "lines"]),
                item: path(&["sku"]),
            }
        );
    }

    #[test]
    fn test_trailing_marker_has_empty_item() {
        let parsed = parse_source(".labels.^item").unwrap();
        assert_eq!(
            parsed,
            PathExpr::Expanded {
                array: path(&["labels"]),
                item: PropertyPath::root(),
            }
        );
    }

    #[test]
    fn test_marker_errors() {
        assert!(matches!(
            parse_target("^item.name"),
            Err(CompileError::InvalidMarker { .. })
        ));
        assert!(matches!(
            parse_target("a.^item.b.^item.c"),
            Err(CompileError::InvalidMarker { .. })
        ));
        assert!(matches!(
            parse_source(".^item.x"),
            Err(CompileError::InvalidMarker { .. })
        ));
    }

    #[test]
    fn test_invalid_paths() {
        assert!(parse_target("").is_err());
        assert!(parse_target("a..b").is_err());
        assert!(parse_target(r#"a."open"#).is_err());
        assert!(parse_source("name").is_err());
    }

    #[test]
    fn test_source_root() {
        assert_eq!(parse_source(".").unwrap(), PathExpr::Plain(PropertyPath::root()));
    }

    #[test]
    fn test_proper_prefixes() {
        let prefixes: Vec<String> = path(&["a", "b", "c"])
            .proper_prefixes()
            .map(|p| p.to_string())
            .collect();
        assert_eq!(prefixes, vec!["a", "a.b"]);
        assert_eq!(path(&["a"]).proper_prefixes().count(), 0);
    }

    #[test]
    fn test_display_requotes() {
        assert_eq!(path(&["a", "x.y"]).to_string(), r#"a."x.y""#);
    }
}
