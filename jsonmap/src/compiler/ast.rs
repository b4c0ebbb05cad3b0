//! Source expression AST and parser.
//!
//! Grammar:
//!
//! ```text
//! expr    := path | call | literal
//! path    := '.' segment ('.' segment)*      (at most one bare ^item segment)
//! call    := '$' NAME '(' [expr (',' expr)*] ')'
//! literal := any other token; JSON if it parses as JSON, text otherwise
//! ```

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::functions::{is_valid_call_name, FunctionRegistry, ENUM_CALL};
use super::path::{self, PathExpr, PropertyPath};
use crate::error::{CompileError, CompileResult};

/// Document a path is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// The whole source document.
    Source,
    /// The current element of an expanded array.
    Item,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Expr {
    Literal {
        value: Value,
    },
    Path {
        scope: Scope,
        path: PropertyPath,
    },
    /// One value per element of `array`, each read at `item`.
    Spread {
        scope: Scope,
        array: PropertyPath,
        item: PropertyPath,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    EnumLookup {
        table: String,
        index: Box<Expr>,
    },
}

impl Expr {
    pub fn literal(value: Value) -> Self {
        Expr::Literal { value }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Expr::Literal { .. })
    }

    /// The path or spread that drives this expression.
    ///
    /// Calls and lookups are searched through their first non-literal argument.
    pub fn find_primary(&self) -> Option<&Expr> {
        match self {
            Expr::Path { .. } | Expr::Spread { .. } => Some(self),
            Expr::Call { args, .. } => args
                .iter()
                .find(|arg| !arg.is_literal())
                .and_then(Expr::find_primary),
            Expr::EnumLookup { index, .. } => index.find_primary(),
            Expr::Literal { .. } => None,
        }
    }

    /// Rewrite for evaluation inside a loop over `array`.
    ///
    /// A spread over `array` becomes a read of the current element; every other
    /// path and spread is resolved against the element.
    pub fn bind_element(&self, array: &PropertyPath) -> Expr {
        match self {
            Expr::Literal { .. } => self.clone(),
            Expr::Path { path, .. } => Expr::Path {
                scope: Scope::Item,
                path: path.clone(),
            },
            Expr::Spread {
                array: spread_array,
                item,
                ..
            } if spread_array == array => Expr::Path {
                scope: Scope::Item,
                path: item.clone(),
            },
            Expr::Spread { array, item, .. } => Expr::Spread {
                scope: Scope::Item,
                array: array.clone(),
                item: item.clone(),
            },
            Expr::Call { name, args } => Expr::Call {
                name: name.clone(),
                args: args.iter().map(|arg| arg.bind_element(array)).collect(),
            },
            Expr::EnumLookup { table, index } => Expr::EnumLookup {
                table: table.clone(),
                index: Box::new(index.bind_element(array)),
            },
        }
    }

    /// Collect called function names in first-use order; `$ENUM` is not a call.
    pub fn collect_calls(&self, names: &mut IndexSet<String>) {
        match self {
            Expr::Call { name, args } => {
                names.insert(name.clone());
                for arg in args {
                    arg.collect_calls(names);
                }
            }
            Expr::EnumLookup { index, .. } => index.collect_calls(names),
            _ => {}
        }
    }
}

/// Literal token: JSON when it parses as JSON, text otherwise.
pub fn parse_literal(text: &str) -> Value {
    let trimmed = text.trim();
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

/// Split a call's argument text on top-level commas.
///
/// Commas nested in parentheses or inside double-quoted strings do not split.
pub fn split_arguments(text: &str) -> Result<Vec<String>, String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut depth: usize = 0;
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                current.push(c);
            }
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| "unbalanced ')'".to_string())?;
                current.push(c);
            }
            ',' if depth == 0 => args.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
    }

    if in_string {
        return Err("unterminated string".to_string());
    }
    if depth != 0 {
        return Err("unbalanced '('".to_string());
    }
    if !current.trim().is_empty() {
        args.push(current.trim().to_string());
    }
    Ok(args)
}

/// Arguments of a full call expression such as `$F(a, $G(b, c))`.
pub fn call_arguments(expr: &str) -> CompileResult<Vec<String>> {
    split_call(expr).map(|(_, args)| args)
}

fn split_call(expr: &str) -> CompileResult<(&str, Vec<String>)> {
    let invalid = |message: String| CompileError::InvalidCall {
        expr: expr.to_string(),
        message,
    };
    let text = expr.trim();
    let open = text
        .find('(')
        .ok_or_else(|| invalid("missing '('".to_string()))?;
    let name = text[..open].trim();
    if !is_valid_call_name(name) {
        return Err(invalid(format!("invalid function name '{}'", name)));
    }
    let inner = text[open + 1..]
        .strip_suffix(')')
        .ok_or_else(|| invalid("missing closing ')'".to_string()))?;
    let args = split_arguments(inner).map_err(invalid)?;
    Ok((name, args))
}

/// Parses source expressions against a registry and, optionally, a rule's
/// enumeration table.
#[derive(Debug, Clone, Copy)]
pub struct ExprParser<'a> {
    registry: &'a FunctionRegistry,
    enum_table: Option<&'a str>,
}

impl<'a> ExprParser<'a> {
    pub fn new(registry: &'a FunctionRegistry) -> Self {
        Self {
            registry,
            enum_table: None,
        }
    }

    /// Resolve `$ENUM` against the table declared as `name`.
    pub fn with_enum_table(mut self, name: &'a str) -> Self {
        self.enum_table = Some(name);
        self
    }

    pub fn parse(&self, text: &str) -> CompileResult<Expr> {
        let text = text.trim();
        if text.starts_with('.') {
            Ok(match path::parse_source(text)? {
                PathExpr::Plain(path) => Expr::Path {
                    scope: Scope::Source,
                    path,
                },
                PathExpr::Expanded { array, item } => Expr::Spread {
                    scope: Scope::Source,
                    array,
                    item,
                },
            })
        } else if text.starts_with('$') {
            self.parse_call(text)
        } else {
            Ok(Expr::literal(parse_literal(text)))
        }
    }

    fn parse_call(&self, text: &str) -> CompileResult<Expr> {
        let (name, args) = split_call(text)?;

        if name == ENUM_CALL {
            let table = self
                .enum_table
                .ok_or_else(|| CompileError::EnumWithoutTable(text.to_string()))?;
            let [index] = args.as_slice() else {
                return Err(CompileError::EnumArity(args.len()));
            };
            return Ok(Expr::EnumLookup {
                table: table.to_string(),
                index: Box::new(self.parse_argument(text, index)?),
            });
        }

        if !self.registry.contains(name) {
            return Err(CompileError::UnknownFunction(name.to_string()));
        }
        let args = args
            .iter()
            .map(|arg| self.parse_argument(text, arg))
            .collect::<CompileResult<Vec<_>>>()?;
        Ok(Expr::Call {
            name: name.to_string(),
            args,
        })
    }

    fn parse_argument(&self, call: &str, arg: &str) -> CompileResult<Expr> {
        if arg.is_empty() {
            return Err(CompileError::InvalidCall {
                expr: call.to_string(),
                message: "empty argument".to_string(),
            });
        }
        self.parse(arg)
    }
}
