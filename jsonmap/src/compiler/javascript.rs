//! JavaScript back end
//!
//! Renders a [`Program`] as a self-contained CommonJS module exporting
//! `transformJSON(source)`. Reads use optional chaining so a missing key yields
//! `undefined` instead of throwing, matching [`super::executor`].

use serde_json::Value;
use std::fmt::Write;

use super::ast::{Expr, Scope};
use super::path::PropertyPath;
use super::program::{Base, LoopMode, Place, Program, Stmt};

/// Name of the exported routine.
pub const ENTRY_POINT: &str = "transformJSON";

const TARGET: &str = "final";
const ELEMENT: &str = "obj";

/// Render `program` as JavaScript source text.
pub fn render(program: &Program) -> String {
    let mut out = String::new();
    for helper in &program.helpers {
        let _ = writeln!(out, "const {} = {};\n", helper.name, helper.function.js_source());
    }

    let _ = writeln!(out, "const {} = (source) => {{", ENTRY_POINT);
    let _ = writeln!(out, "\tconst {} = {{}};", TARGET);
    for stmt in &program.body {
        render_stmt(&mut out, stmt, 1);
    }
    let _ = writeln!(out, "\treturn {};", TARGET);
    out.push_str("};\n\n");
    let _ = writeln!(out, "module.exports = {};", ENTRY_POINT);
    out
}

fn render_stmt(out: &mut String, stmt: &Stmt, depth: usize) {
    let indent = "\t".repeat(depth);
    match stmt {
        Stmt::DeclareEnum { name, values } => {
            let _ = writeln!(out, "{}const {} = {};", indent, name, Value::Array(values.clone()));
        }
        Stmt::Guard { place } => {
            let place = render_place(place);
            let _ = writeln!(out, "{}if ({} == null) {{", indent, place);
            let _ = writeln!(out, "{}\t{} = {{}};", indent, place);
            let _ = writeln!(out, "{}}}", indent);
        }
        Stmt::InitArray { path } => {
            let _ = writeln!(out, "{}{}{} = [];", indent, TARGET, path.accessor());
        }
        Stmt::Assign {
            place,
            value,
            default,
        } => {
            let value = render_expr(value);
            let _ = match default {
                Some(d) => writeln!(out, "{}{} = {} ?? {};", indent, render_place(place), value, d),
                None => writeln!(out, "{}{} = {};", indent, render_place(place), value),
            };
        }
        Stmt::Loop {
            source,
            target,
            mode,
            body,
        } => {
            let items = format!("source{}", read_accessor(source));
            let array = format!("{}{}", TARGET, target.accessor());
            let _ = writeln!(out, "{}for (let i = 0; i < {}.length; i++) {{", indent, items);
            let _ = writeln!(out, "{}\tconst item = {}[i];", indent, items);
            match mode {
                LoopMode::Append => {
                    let _ = writeln!(out, "{}\tlet {} = {{}};", indent, ELEMENT);
                }
                LoopMode::Merge => {
                    let _ = writeln!(out, "{}\tlet {} = {}[i] ?? {{}};", indent, ELEMENT, array);
                }
            }
            for inner in body {
                render_stmt(out, inner, depth + 1);
            }
            let _ = match mode {
                LoopMode::Append => writeln!(out, "{}\t{}.push({});", indent, array, ELEMENT),
                LoopMode::Merge => writeln!(out, "{}\t{}[i] = {};", indent, array, ELEMENT),
            };
            let _ = writeln!(out, "{}}}", indent);
        }
    }
}

fn render_place(place: &Place) -> String {
    let base = match place.base {
        Base::Target => TARGET,
        Base::Element => ELEMENT,
    };
    format!("{}{}", base, place.path.accessor())
}

/// Accessor for reads: every step may hit a missing key.
fn read_accessor(path: &PropertyPath) -> String {
    path.accessor().replace('[', "?.[")
}

fn root_name(scope: Scope) -> &'static str {
    match scope {
        Scope::Source => "source",
        Scope::Item => "item",
    }
}

fn render_spread(scope: Scope, array: &PropertyPath, item: &PropertyPath) -> String {
    format!(
        "{}{}.map((el) => el{})",
        root_name(scope),
        read_accessor(array),
        read_accessor(item)
    )
}

/// Render an expression in value position.
pub fn render_expr(expr: &Expr) -> String {
    match expr {
        Expr::Literal { value } => value.to_string(),
        Expr::Path { scope, path } => format!("{}{}", root_name(*scope), read_accessor(path)),
        Expr::Spread { scope, array, item } => render_spread(*scope, array, item),
        Expr::Call { name, args } => {
            let args: Vec<String> = args
                .iter()
                .map(|arg| match arg {
                    Expr::Spread { scope, array, item } => {
                        format!("...{}", render_spread(*scope, array, item))
                    }
                    other => render_expr(other),
                })
                .collect();
            format!("{}({})", name, args.join(", "))
        }
        Expr::EnumLookup { table, index } => format!("{}[{}]", table, render_expr(index)),
    }
}
