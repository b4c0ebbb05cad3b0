//! # jsonmap - compile tabular mapping rules into JSON transformation routines
//!
//! A mapping is an ordered list of rules, each binding a target path to a source
//! expression. jsonmap compiles the list into one routine that reshapes a source
//! document into a target document, either as JavaScript or as a JSON program it
//! can run itself.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌──────────────┐
//! │ Rule sheet  │────▶│    Rules    │────▶│  Compiler   │────▶│  JavaScript  │
//! │ (CSV/JSON)  │     │  (ordered)  │     │  (Program)  │──┐  │  (.js file)  │
//! └─────────────┘     └─────────────┘     └─────────────┘  │  └──────────────┘
//!                                                          │  ┌──────────────┐
//!                                                          └─▶│   Executor   │
//!                                                             │ (target JSON)│
//!                                                             └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use jsonmap::{compile, execute, FunctionRegistry, Rule};
//! use serde_json::json;
//!
//! let rules = vec![
//!     Rule::new("name", ".firstName"),
//!     Rule::new("tags.^item", ".labels.^item"),
//! ];
//! let program = compile(&rules, &FunctionRegistry::builtin())?;
//! let target = execute(&program, &json!({"firstName": "Ann", "labels": ["a", "b"]}))?;
//! assert_eq!(target, json!({"name": "Ann", "tags": ["a", "b"]}));
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`rules`] - Rule model and JSON rule sets
//! - [`sheet`] - Rule sheet parsing with auto-detection
//! - [`compiler`] - Paths, expressions, program IR and both back ends
//! - [`config`] - Environment configuration
//! - [`pipeline`] - File-level generate and execute steps

// Core modules
pub mod error;
pub mod rules;

// Parsing
pub mod sheet;

// Compilation
pub mod compiler;

// Orchestration
pub mod config;
pub mod pipeline;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    CompileError, CompileResult, ExecError, ExecResult, PipelineError, PipelineResult,
    RegistryError, RegistryResult, SheetError, SheetResult,
};

// =============================================================================
// Re-exports - Rules
// =============================================================================

pub use rules::{example_rules, Rule, RuleSet};

// =============================================================================
// Re-exports - Rule sheets
// =============================================================================

pub use sheet::{
    decode_content, detect_delimiter, detect_encoding, parse_bytes, read_rules,
    read_rules_file, ParsedSheet, SheetOptions,
};

// =============================================================================
// Re-exports - Compiler
// =============================================================================

pub use compiler::{
    compile, execute, execute_all, render, Expr, Function, FunctionRegistry, Program, Stmt,
    ARRAY_MARKER,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use config::Config;
pub use pipeline::{
    compile_file, create_target, generate_code_file, load_program, load_rules, OutputFormat,
    PipelineOptions,
};
