//! Intermediate representation of a generated routine.
//!
//! A [`Program`] is plain data: helper declarations followed by a statement list.
//! Back ends either render it ([`super::javascript`]) or run it
//! ([`super::executor`]). It serializes to JSON, which is the persisted form of a
//! compiled mapping.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use super::ast::Expr;
use super::functions::{Function, FunctionRegistry};
use super::path::PropertyPath;
use crate::error::{CompileError, CompileResult};

/// Format version written into serialized programs.
pub const PROGRAM_VERSION: &str = "1.0";

/// Object a [`Place`] is relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Base {
    /// The target document under construction.
    Target,
    /// The array element being built by the enclosing loop.
    Element,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Place {
    pub base: Base,
    pub path: PropertyPath,
}

impl Place {
    pub fn target(path: PropertyPath) -> Self {
        Self {
            base: Base::Target,
            path,
        }
    }

    pub fn element(path: PropertyPath) -> Self {
        Self {
            base: Base::Element,
            path,
        }
    }
}

/// How a loop treats the elements of its target array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    /// Build a fresh element per iteration and push it.
    Append,
    /// Update the element already at the loop index.
    Merge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Stmt {
    DeclareEnum {
        name: String,
        values: Vec<Value>,
    },
    /// Create an empty object at `place` unless one is there.
    Guard {
        place: Place,
    },
    InitArray {
        path: PropertyPath,
    },
    /// Write `value` at `place`; a null or missing value falls back to `default`.
    Assign {
        place: Place,
        value: Expr,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<Value>,
    },
    /// Iterate the source array at `source`, building elements of the target array
    /// at `target`.
    Loop {
        source: PropertyPath,
        target: PropertyPath,
        mode: LoopMode,
        body: Vec<Stmt>,
    },
}

/// A named function the program calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Helper {
    pub name: String,
    pub function: Function,
}

/// A compiled mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub helpers: Vec<Helper>,
    pub body: Vec<Stmt>,
}

fn default_version() -> String {
    PROGRAM_VERSION.to_string()
}

impl Program {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn helper(&self, name: &str) -> Option<Function> {
        self.helpers
            .iter()
            .find(|h| h.name == name)
            .map(|h| h.function)
    }

    /// Number of statements, counting loop bodies.
    pub fn statement_count(&self) -> usize {
        fn count(stmts: &[Stmt]) -> usize {
            stmts
                .iter()
                .map(|s| match s {
                    Stmt::Loop { body, .. } => 1 + count(body),
                    _ => 1,
                })
                .sum()
        }
        count(&self.body)
    }
}

/// Accumulates statements for one compilation.
///
/// Object guards and array initialisations on the target are emitted at most once
/// per path; helper names are kept in first-use order.
#[derive(Debug, Default)]
pub struct ProgramBuffer {
    body: Vec<Stmt>,
    seen_prefixes: HashSet<PropertyPath>,
    seen_arrays: HashSet<PropertyPath>,
    seen_helpers: IndexSet<String>,
}

impl ProgramBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stmt: Stmt) {
        self.body.push(stmt);
    }

    /// Guard every proper prefix of `path` on the target not guarded before.
    ///
    /// A prefix naming an array initialised earlier is rejected: the write would
    /// land on the array itself rather than on one of its elements.
    pub fn guard_prefixes(&mut self, path: &PropertyPath) -> CompileResult<()> {
        if let Some(array) = path
            .proper_prefixes()
            .find(|prefix| self.seen_arrays.contains(prefix))
        {
            return Err(CompileError::PathThroughArray {
                path: path.to_string(),
                array: array.to_string(),
            });
        }
        for prefix in path.proper_prefixes() {
            if self.seen_prefixes.insert(prefix.clone()) {
                self.body.push(Stmt::Guard {
                    place: Place::target(prefix),
                });
            }
        }
        Ok(())
    }

    /// Initialise the array at `path`; returns false if an earlier rule already did.
    pub fn init_array(&mut self, path: &PropertyPath) -> bool {
        if !self.seen_arrays.insert(path.clone()) {
            return false;
        }
        self.body.push(Stmt::InitArray { path: path.clone() });
        true
    }

    pub fn record_calls(&mut self, expr: &Expr) {
        expr.collect_calls(&mut self.seen_helpers);
    }

    /// Resolve recorded helpers and produce the program.
    pub fn seal(self, registry: &FunctionRegistry) -> CompileResult<Program> {
        let helpers = self
            .seen_helpers
            .into_iter()
            .map(|name| {
                registry
                    .get(&name)
                    .map(|function| Helper {
                        name: name.clone(),
                        function,
                    })
                    .ok_or(CompileError::UnknownFunction(name))
            })
            .collect::<CompileResult<Vec<_>>>()?;

        Ok(Program {
            version: default_version(),
            helpers,
            body: self.body,
        })
    }
}

/// Guards for the proper prefixes of a per-element path.
pub fn element_guards(path: &PropertyPath) -> Vec<Stmt> {
    path.proper_prefixes()
        .map(|prefix| Stmt::Guard {
            place: Place::element(prefix),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(segments: &[&str]) -> PropertyPath {
        PropertyPath::new(segments.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_guards_are_deduplicated() {
        let mut buffer = ProgramBuffer::new();
        buffer.guard_prefixes(&path(&["a", "b", "c"])).unwrap();
        buffer.guard_prefixes(&path(&["a", "b", "d"])).unwrap();
        buffer.guard_prefixes(&path(&["a", "e"])).unwrap();
        let program = buffer.seal(&FunctionRegistry::builtin()).unwrap();
        assert_eq!(
            program.body,
            vec![
                Stmt::Guard { place: Place::target(path(&["a"])) },
                Stmt::Guard { place: Place::target(path(&["a", "b"])) },
            ]
        );
    }

    #[test]
    fn test_init_array_once() {
        let mut buffer = ProgramBuffer::new();
        assert!(buffer.init_array(&path(&["tags"])));
        assert!(!buffer.init_array(&path(&["tags"])));
        assert!(buffer.init_array(&path(&["other"])));
    }

    #[test]
    fn test_guard_rejects_path_through_array() {
        let mut buffer = ProgramBuffer::new();
        assert!(buffer.init_array(&path(&["rows"])));
        let err = buffer.guard_prefixes(&path(&["rows", "count"])).unwrap_err();
        assert_eq!(
            err,
            CompileError::PathThroughArray {
                path: "rows.count".into(),
                array: "rows".into(),
            }
        );
        assert!(buffer.guard_prefixes(&path(&["rows"])).is_ok());
        assert!(buffer.guard_prefixes(&path(&["other", "count"])).is_ok());
    }

    #[test]
    fn test_seal_orders_helpers_by_first_use() {
        let mut buffer = ProgramBuffer::new();
        buffer.record_calls(&Expr::Call {
            name: "$MAX".into(),
            args: vec![Expr::Call { name: "$ADD".into(), args: vec![] }],
        });
        buffer.record_calls(&Expr::Call { name: "$ADD".into(), args: vec![] });
        let program = buffer.seal(&FunctionRegistry::builtin()).unwrap();
        let names: Vec<&str> = program.helpers.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["$MAX", "$ADD"]);
        assert_eq!(program.helper("$ADD"), Some(Function::Add));
    }

    #[test]
    fn test_seal_rejects_unregistered_helper() {
        let mut buffer = ProgramBuffer::new();
        buffer.record_calls(&Expr::Call { name: "$GONE".into(), args: vec![] });
        let err = buffer.seal(&FunctionRegistry::builtin()).unwrap_err();
        assert_eq!(err, CompileError::UnknownFunction("$GONE".into()));
    }

    #[test]
    fn test_program_json_shape() {
        let program = Program {
            version: PROGRAM_VERSION.into(),
            helpers: vec![Helper { name: "$ADD".into(), function: Function::Add }],
            body: vec![Stmt::Assign {
                place: Place::target(path(&["total"])),
                value: Expr::literal(json!(1)),
                default: None,
            }],
        };
        let value = serde_json::to_value(&program).unwrap();
        assert_eq!(value["helpers"][0]["function"], "add");
        assert_eq!(value["body"][0]["op"], "assign");
        assert_eq!(value["body"][0]["place"]["path"], json!(["total"]));
        assert!(value["body"][0].get("default").is_none());
        assert_eq!(program.statement_count(), 1);
    }
}
