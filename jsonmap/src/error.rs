//! Error types for the jsonmap compiler and its collaborators.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`SheetError`] - Rule sheet reading errors
//! - [`CompileError`] - Defects found while compiling rules
//! - [`ExecError`] - Failures while running a compiled program
//! - [`RegistryError`] - Function registry errors
//! - [`PipelineError`] - Top-level orchestration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Rule Sheet Errors
// =============================================================================

/// Errors while reading a rule sheet.
#[derive(Debug, Error)]
pub enum SheetError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to decode the file contents.
    #[error("Failed to decode sheet: {0}")]
    EncodingError(String),

    /// A row could not be turned into a rule.
    #[error("Line {line}, column {column}: {message}")]
    InvalidRow {
        line: usize,
        column: char,
        message: String,
    },

    /// Malformed delimited text.
    #[error("Invalid sheet format: {0}")]
    ParseError(String),

    /// No rule rows after the header rows.
    #[error("Rule sheet contains no rules")]
    EmptySheet,
}

// =============================================================================
// Compilation Errors
// =============================================================================

/// Mapping defects detected while compiling a rule set.
///
/// Compilation never produces a partial program: the first defect aborts it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    /// The rule list was empty.
    #[error("Rule set is empty")]
    EmptyRuleSet,

    /// A property path could not be parsed.
    #[error("Invalid path '{path}': {message}")]
    InvalidPath { path: String, message: String },

    /// An `^item` marker does not split its path into usable halves.
    #[error("Invalid array marker in '{path}': {message}")]
    InvalidMarker { path: String, message: String },

    /// A call expression is malformed.
    #[error("Invalid call expression '{expr}': {message}")]
    InvalidCall { expr: String, message: String },

    /// A call names a function absent from the registry.
    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    /// `$ENUM` used by a rule without an enumeration table.
    #[error("$ENUM used in '{0}' but the rule declares no enumeration")]
    EnumWithoutTable(String),

    /// `$ENUM` called with other than one index argument.
    #[error("$ENUM expects exactly one index argument, got {0}")]
    EnumArity(usize),

    /// The enumeration cell is not a JSON array.
    #[error("Invalid enumeration '{text}': {message}")]
    InvalidEnumeration { text: String, message: String },

    /// An array-expansion target whose source holds no `^item` path.
    #[error("Array target '{target}' needs a source path containing ^item, got '{expr}'")]
    MissingArraySource { target: String, expr: String },

    /// A target path runs through an array built by an earlier rule.
    #[error("Path '{path}' runs through array '{array}' built by an earlier rule")]
    PathThroughArray { path: String, array: String },

    /// Wraps another defect with the index of the rule that caused it.
    #[error("Rule {index} (target '{target}'): {source}")]
    InRule {
        index: usize,
        target: String,
        #[source]
        source: Box<CompileError>,
    },
}

impl CompileError {
    /// Attach the position of the offending rule.
    pub fn in_rule(self, index: usize, target: &str) -> Self {
        CompileError::InRule {
            index,
            target: target.to_string(),
            source: Box::new(self),
        }
    }

    /// The underlying defect, without rule context.
    pub fn root(&self) -> &CompileError {
        match self {
            CompileError::InRule { source, .. } => source.root(),
            other => other,
        }
    }
}

// =============================================================================
// Execution Errors
// =============================================================================

/// Failures while executing a compiled program against a document.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExecError {
    /// A call whose helper is not declared by the program.
    #[error("Unresolved call to '{0}'")]
    UnresolvedCall(String),

    /// An enumeration lookup referenced an undeclared table.
    #[error("Unknown enumeration table '{0}'")]
    UnknownEnum(String),

    /// The index expression of `$ENUM` is not a valid position.
    #[error("Enumeration index {index} out of range for '{table}' ({len} entries)")]
    EnumIndex {
        table: String,
        index: String,
        len: usize,
    },

    /// A loop driving path did not hold an array.
    #[error("Expected an array at '{0}'")]
    NotAnArray(String),

    /// A write went through a value that is not an object.
    #[error("Cannot write '{0}': parent is not an object")]
    NotAnObject(String),

    /// The program is structurally unsound, e.g. hand-edited with nested loops.
    #[error("Invalid program: {0}")]
    InvalidProgram(String),
}

// =============================================================================
// Registry Errors
// =============================================================================

/// Errors from the function registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// `$ENUM` cannot be bound to a function.
    #[error("'$ENUM' is reserved")]
    Reserved,

    /// Call names start with `$` followed by letters, digits or underscores.
    #[error("Invalid function name '{0}'")]
    InvalidName(String),

    /// Registry file names an operation that does not exist.
    #[error("Unknown operation '{0}'")]
    UnknownOperation(String),

    /// IO error.
    #[error("Registry IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error.
    #[error("Registry JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level errors returned by [`crate::pipeline`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Rule sheet error.
    #[error("Sheet error: {0}")]
    Sheet(#[from] SheetError),

    /// Compilation error.
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    /// Execution error.
    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    /// Registry error.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The transformer file cannot be executed by this tool.
    #[error("Unsupported transformer '{0}': expected a .json program or a mapping file")]
    UnsupportedTransformer(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for rule sheet operations.
pub type SheetResult<T> = Result<T, SheetError>;

/// Result type for compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// Result type for program execution.
pub type ExecResult<T> = Result<T, ExecError>;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
