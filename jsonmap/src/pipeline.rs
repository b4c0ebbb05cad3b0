//! High-level pipeline API: mapping files in, artifacts out.
//!
//! Combines the steps the CLI runs: reading rules (sheet or JSON), compiling,
//! writing the generated routine, and running a routine on a source document.
//!
//! # Example
//!
//! ```rust,ignore
//! use jsonmap::pipeline::{generate_code_file, OutputFormat, PipelineOptions};
//! use std::path::Path;
//!
//! let options = PipelineOptions::default();
//! let artifact = generate_code_file(Path::new("mapping.csv"), Path::new("out"), OutputFormat::Js, &options)?;
//! println!("Wrote {}", artifact.display());
//! ```

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::compiler::{compile, execute, render, FunctionRegistry, Program};
use crate::config::Config;
use crate::error::{PipelineError, PipelineResult};
use crate::rules::{Rule, RuleSet};
use crate::sheet::{read_rules_file, SheetOptions};

/// File name prefix of generated routines
pub const CODE_PREFIX: &str = "transformJSON";

/// File name prefix of transformed documents
pub const TARGET_PREFIX: &str = "target";

/// Timestamp layout used in artifact names
pub const TIMESTAMP_FORMAT: &str = "%Y_%m_%d_%H_%M_%S_%3f";

/// Form of a generated routine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// CommonJS module exporting `transformJSON(source)`
    #[default]
    Js,
    /// Serialized program, runnable with `execute`
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Js => "js",
            OutputFormat::Json => "json",
        }
    }
}

/// Settings for reading and compiling mapping files
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub sheet: SheetOptions,
    pub registry: FunctionRegistry,
}

impl PipelineOptions {
    /// Options from configuration; `functions` overrides the configured registry file.
    pub fn from_config(config: &Config, functions: Option<&Path>) -> PipelineResult<Self> {
        let registry = match functions.or(config.functions_file.as_deref()) {
            Some(path) => {
                info!(path = %path.display(), "loading function registry");
                FunctionRegistry::load(path)?
            }
            None => FunctionRegistry::builtin(),
        };
        Ok(Self {
            sheet: config.sheet_options(),
            registry,
        })
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Read rules from a JSON rule set or a rule sheet.
pub fn load_rules(path: &Path, options: &PipelineOptions) -> PipelineResult<Vec<Rule>> {
    if has_extension(path, "json") {
        let content = fs::read_to_string(path)?;
        let set = RuleSet::from_json(&content)?;
        info!(path = %path.display(), rules = set.rules.len(), "read rule set");
        return Ok(set.rules);
    }

    let sheet = read_rules_file(path, &options.sheet)?;
    info!(
        path = %path.display(),
        rules = sheet.rules.len(),
        encoding = %sheet.encoding,
        delimiter = %sheet.delimiter.escape_default(),
        "read rule sheet"
    );
    Ok(sheet.rules)
}

/// Read and compile a mapping file.
pub fn compile_file(path: &Path, options: &PipelineOptions) -> PipelineResult<Program> {
    let rules = load_rules(path, options)?;
    Ok(compile(&rules, &options.registry)?)
}

/// Compile `mapping` and write the routine into `destination`.
///
/// Returns the path of the written artifact.
pub fn generate_code_file(
    mapping: &Path,
    destination: &Path,
    format: OutputFormat,
    options: &PipelineOptions,
) -> PipelineResult<PathBuf> {
    let program = compile_file(mapping, options)?;
    let content = match format {
        OutputFormat::Js => render(&program),
        OutputFormat::Json => program.to_json()?,
    };

    fs::create_dir_all(destination)?;
    let path = artifact_path(destination, CODE_PREFIX, format.extension());
    fs::write(&path, content)?;
    info!(
        path = %path.display(),
        statements = program.statement_count(),
        helpers = program.helpers.len(),
        "wrote routine"
    );
    Ok(path)
}

/// Load something runnable: a serialized program, or a mapping compiled on the fly.
///
/// JavaScript routines cannot be run here.
pub fn load_program(transformer: &Path, options: &PipelineOptions) -> PipelineResult<Program> {
    if has_extension(transformer, "js") {
        return Err(PipelineError::UnsupportedTransformer(
            transformer.display().to_string(),
        ));
    }

    if has_extension(transformer, "json") {
        let content = fs::read_to_string(transformer)?;
        let value: Value = serde_json::from_str(&content)?;
        if value.get("rules").is_some() {
            let set: RuleSet = serde_json::from_value(value)?;
            return Ok(compile(&set.rules, &options.registry)?);
        }
        return Ok(serde_json::from_value(value)?);
    }

    compile_file(transformer, options)
}

/// Run `transformer` on the JSON document at `source` and write the result into
/// `destination`.
pub fn create_target(
    source: &Path,
    transformer: &Path,
    destination: &Path,
    options: &PipelineOptions,
) -> PipelineResult<PathBuf> {
    let program = load_program(transformer, options)?;
    let document: Value = serde_json::from_str(&fs::read_to_string(source)?)?;
    let target = execute(&program, &document)?;

    fs::create_dir_all(destination)?;
    let path = artifact_path(destination, TARGET_PREFIX, "json");
    fs::write(&path, serde_json::to_string_pretty(&target)?)?;
    info!(path = %path.display(), "wrote target document");
    Ok(path)
}

/// Local time formatted for artifact names
pub fn timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// `<dir>/<prefix>_<timestamp>.<ext>`
pub fn artifact_path(dir: &Path, prefix: &str, ext: &str) -> PathBuf {
    dir.join(format!("{}_{}.{}", prefix, timestamp(), ext))
}
