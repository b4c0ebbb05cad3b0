//! jsonmap CLI - compile mapping sheets into JSON transformation routines
//!
//! # Commands
//!
//! ```bash
//! jsonmap generate --mapping rules.csv             # Write transformJSON_<ts>.js
//! jsonmap generate --mapping rules.csv --format json
//! jsonmap execute --source in.json --transformer transformJSON_<ts>.json
//! jsonmap functions                                # List available calls
//! jsonmap example-rules                            # Show an example rule set
//! ```
//!
//! Settings come from the environment (or `.env`), see [`jsonmap::Config`].
//! Log verbosity follows `RUST_LOG` (default `jsonmap=info`).

use clap::{Parser, Subcommand};
use jsonmap::{
    create_target, example_rules, generate_code_file, Config, OutputFormat, PipelineOptions,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jsonmap")]
#[command(about = "Compile tabular mapping rules into JSON transformation routines", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a mapping file into a transformation routine
    Generate {
        /// Rule sheet (CSV/TSV) or JSON rule set
        #[arg(short, long)]
        mapping: PathBuf,

        /// Output directory (default: JSONMAP_OUTPUT_DIR or current directory)
        #[arg(short, long)]
        destination: Option<PathBuf>,

        /// Routine format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Js)]
        format: OutputFormat,

        /// Function registry file extending the built-in calls
        #[arg(long)]
        functions: Option<PathBuf>,

        /// Header rows to skip in the rule sheet
        #[arg(long)]
        header_rows: Option<usize>,

        /// Sheet delimiter (auto-detect if not specified)
        #[arg(long)]
        delimiter: Option<char>,
    },

    /// Run a routine on a JSON document
    Execute {
        /// Source JSON document
        #[arg(short, long)]
        source: PathBuf,

        /// JSON program, or a mapping file compiled on the fly
        #[arg(short, long)]
        transformer: PathBuf,

        /// Output directory (default: JSONMAP_OUTPUT_DIR or current directory)
        #[arg(short, long)]
        destination: Option<PathBuf>,

        /// Function registry file extending the built-in calls
        #[arg(long)]
        functions: Option<PathBuf>,
    },

    /// Show available function calls
    Functions {
        /// Function registry file extending the built-in calls
        #[arg(long)]
        functions: Option<PathBuf>,
    },

    /// Show example rule set
    ExampleRules,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("jsonmap=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    // Load .env file (if present) before the log filter is read
    dotenvy::dotenv().ok();
    init_tracing();
    let config = Config::from_env();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Generate {
            mapping,
            destination,
            format,
            functions,
            header_rows,
            delimiter,
        } => {
            let mut config = config;
            if let Some(rows) = header_rows {
                config.header_rows = rows;
            }
            if delimiter.is_some() {
                config.delimiter = delimiter;
            }
            cmd_generate(
                &config,
                &mapping,
                destination.as_deref(),
                format,
                functions.as_deref(),
            )
        }
        Commands::Execute {
            source,
            transformer,
            destination,
            functions,
        } => cmd_execute(
            &config,
            &source,
            &transformer,
            destination.as_deref(),
            functions.as_deref(),
        ),
        Commands::Functions { functions } => cmd_functions(&config, functions.as_deref()),
        Commands::ExampleRules => cmd_example_rules(),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_generate(
    config: &Config,
    mapping: &Path,
    destination: Option<&Path>,
    format: OutputFormat,
    functions: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Compiling: {}", mapping.display());

    let options = PipelineOptions::from_config(config, functions)?;
    let destination = destination.unwrap_or(config.output_dir.as_path());
    let path = generate_code_file(mapping, destination, format, &options)?;

    eprintln!("✅ Routine written to {}", path.display());
    Ok(())
}

fn cmd_execute(
    config: &Config,
    source: &Path,
    transformer: &Path,
    destination: Option<&Path>,
    functions: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Transforming: {}", source.display());
    eprintln!("   Transformer: {}", transformer.display());

    let options = PipelineOptions::from_config(config, functions)?;
    let destination = destination.unwrap_or(config.output_dir.as_path());
    let path = create_target(source, transformer, destination, &options)?;

    eprintln!("✅ Target written to {}", path.display());
    Ok(())
}

fn cmd_functions(config: &Config, functions: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let options = PipelineOptions::from_config(config, functions)?;
    println!("{}", options.registry.describe());
    Ok(())
}

fn cmd_example_rules() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", example_rules().to_json()?);
    Ok(())
}
