mod commands;
mod reader;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use leuchtturm_core::{vocab, Manager};
use reader::{read_model_files, read_project_config};

#[derive(Parser)]
#[command(
    name = "leuchtturm",
    version,
    about = "Leuchtturm schema deriver: turn model descriptor files into a GraphQL CRUD schema"
)]
struct Cli {
    /// Log at debug level (overrides LEUCHTTURM_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the derived schema as GraphQL SDL
    Schema {
        /// Input path (file or directory, defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Naming vocabulary: english or german (overrides the project config)
        #[arg(long)]
        vocab: Option<String>,

        /// Write output to file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the introspected properties and relations of every model as JSON
    Inspect {
        /// Input path (file or directory, defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// List the CRUD field names derived for every model
    Fields {
        /// Input path (file or directory, defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Naming vocabulary: english or german (overrides the project config)
        #[arg(long)]
        vocab: Option<String>,

        /// Output format: human (default) or json
        #[arg(long, default_value = "human")]
        format: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Schema {
            path,
            vocab,
            output,
        } => commands::schema::run_schema(&path, vocab.as_deref(), output.as_deref()),
        Commands::Inspect { path } => commands::inspect::run_inspect(&path),
        Commands::Fields {
            path,
            vocab,
            format,
        } => commands::fields::run_fields(&path, vocab.as_deref(), &format),
    };

    match result {
        Ok(output) => println!("{output}"),
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(1);
        }
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("LEUCHTTURM_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// A manager with every model found at `input_path` registered without
/// persistence, in file order.
pub fn load_manager(input_path: &Path, vocab_flag: Option<&str>) -> Result<Manager> {
    let files = read_model_files(input_path)?;
    let models: Vec<_> = files.into_iter().flat_map(|f| f.models).collect();
    if models.is_empty() {
        return Err(anyhow!(
            "No model files (.model.yaml, .model.yml, .model.json) found at: {}",
            input_path.display()
        ));
    }

    let config = read_project_config(input_path)?.unwrap_or_default();
    if let Some(name) = &config.name {
        debug!(project = %name, version = ?config.version, "project config loaded");
    }
    let vocab_id = vocab_flag
        .map(str::to_string)
        .or(config.vocab)
        .unwrap_or_else(|| "english".to_string());
    let vocab = vocab::by_id(&vocab_id)
        .with_context(|| format!("Unknown vocabulary '{vocab_id}' (expected english or german)"))?;

    let manager = Manager::new();
    manager.set_vocab_arc(Arc::from(vocab));
    for model in models {
        manager.register_detached(model);
    }
    Ok(manager)
}
