//! Rule-set code generator.
//!
//! Turns an ordered rule list into a [`Program`]. Each rule becomes either a
//! scalar assignment or a loop over a source array; later rules may merge into
//! objects and arrays created by earlier ones.

use serde_json::Value;
use tracing::debug;

use super::ast::{parse_literal, Expr, ExprParser};
use super::functions::FunctionRegistry;
use super::path::{self, PathExpr, PropertyPath};
use super::program::{element_guards, LoopMode, Place, Program, ProgramBuffer, Stmt};
use crate::error::{CompileError, CompileResult};
use crate::rules::Rule;

/// Compile `rules` in order into one program.
///
/// Fails on the first defective rule; the error names its index.
pub fn compile(rules: &[Rule], registry: &FunctionRegistry) -> CompileResult<Program> {
    if rules.is_empty() {
        return Err(CompileError::EmptyRuleSet);
    }

    let mut buffer = ProgramBuffer::new();
    for (index, rule) in rules.iter().enumerate() {
        compile_rule(&mut buffer, index, rule, registry)
            .map_err(|e| e.in_rule(index, &rule.target))?;
    }

    let program = buffer.seal(registry)?;
    debug!(
        rules = rules.len(),
        statements = program.statement_count(),
        helpers = program.helpers.len(),
        "compiled rule set"
    );
    Ok(program)
}

/// Name of the enumeration table declared by the rule at `index`.
pub fn enum_table_name(index: usize) -> String {
    format!("enum{}", index)
}

fn compile_rule(
    buffer: &mut ProgramBuffer,
    index: usize,
    rule: &Rule,
    registry: &FunctionRegistry,
) -> CompileResult<()> {
    let target = path::parse_target(&rule.target)?;

    let table = match &rule.enumeration {
        Some(text) => {
            let name = enum_table_name(index);
            buffer.push(Stmt::DeclareEnum {
                name: name.clone(),
                values: parse_enumeration(text)?,
            });
            Some(name)
        }
        None => None,
    };

    let mut parser = ExprParser::new(registry);
    if let Some(name) = &table {
        parser = parser.with_enum_table(name);
    }
    let value = parser.parse(&rule.source)?;
    let default = rule.default.as_deref().map(parse_literal);

    match target {
        PathExpr::Plain(path) => {
            debug!(index, target = %path, "scalar rule");
            buffer.record_calls(&value);
            buffer.guard_prefixes(&path)?;
            buffer.push(Stmt::Assign {
                place: Place::target(path),
                value,
                default,
            });
        }
        PathExpr::Expanded { array, item } => {
            let source = match value.find_primary() {
                Some(Expr::Spread { array: driving, .. }) => driving.clone(),
                _ => {
                    return Err(CompileError::MissingArraySource {
                        target: rule.target.clone(),
                        expr: rule.source.clone(),
                    })
                }
            };
            compile_expansion(buffer, index, array, item, source, value, default)?;
        }
    }
    Ok(())
}

fn compile_expansion(
    buffer: &mut ProgramBuffer,
    index: usize,
    target: PropertyPath,
    item: PropertyPath,
    source: PropertyPath,
    value: Expr,
    default: Option<Value>,
) -> CompileResult<()> {
    let value = value.bind_element(&source);
    buffer.record_calls(&value);
    buffer.guard_prefixes(&target)?;

    let mode = if buffer.init_array(&target) {
        LoopMode::Append
    } else {
        LoopMode::Merge
    };
    debug!(index, target = %target, source = %source, ?mode, "array rule");

    let mut body = element_guards(&item);
    body.push(Stmt::Assign {
        place: Place::element(item),
        value,
        default,
    });
    buffer.push(Stmt::Loop {
        source,
        target,
        mode,
        body,
    });
    Ok(())
}

fn parse_enumeration(text: &str) -> CompileResult<Vec<Value>> {
    let invalid = |message: String| CompileError::InvalidEnumeration {
        text: text.to_string(),
        message,
    };
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Array(values)) => Ok(values),
        Ok(_) => Err(invalid("expected a JSON array".to_string())),
        Err(e) => Err(invalid(e.to_string())),
    }
}
