//! Mapping compiler
//!
//! Rules are parsed into expressions ([`ast`]) over property paths ([`path`]),
//! lowered into a [`Program`] ([`generator`]) and then either rendered as
//! JavaScript ([`javascript`]) or run directly ([`executor`]).

pub mod ast;
pub mod executor;
pub mod functions;
pub mod generator;
pub mod javascript;
pub mod path;
pub mod program;

pub use ast::{Expr, ExprParser, Scope};
pub use executor::{execute, execute_all};
pub use functions::{Function, FunctionRegistry};
pub use generator::compile;
pub use javascript::render;
pub use path::{PathExpr, PropertyPath, ARRAY_MARKER};
pub use program::{Program, Stmt};
