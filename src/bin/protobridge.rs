//! Command-line front end for protobridge.
//!
//! ```bash
//! # Import a schema and encode a JSON document as a binary message
//! protobridge -I ./protos --import person.proto \
//!   encode tutorial.Person person.json person.bin
//!
//! # Decode it again, printing pretty JSON
//! protobridge -I ./protos --import person.proto decode tutorial.Person person.bin
//!
//! # Inspect a compiled-in type
//! protobridge describe bridge.samples.Envelope
//! ```
//!
//! `PROTOBRIDGE_IMPORT_PATH` and `PROTOBRIDGE_ARENA` are read as defaults;
//! `-I` directories are searched after the ones from the environment.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use protobridge::{json, wire, Allocation, BridgeConfig, Error};
use std::fs;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "protobridge")]
#[command(about = "Convert between JSON and protobuf messages using runtime-loaded schemas")]
#[command(long_about = None)]
struct Cli {
    /// Directory to search for .proto imports (repeatable, searched in order)
    #[arg(short = 'I', long = "import-path", value_name = "DIR")]
    import_paths: Vec<PathBuf>,

    /// .proto file to import before running the command (repeatable)
    #[arg(long = "import", value_name = "FILE")]
    imports: Vec<String>,

    /// Build messages inside an arena
    #[arg(long)]
    arena: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List message types registered by --import
    Types,

    /// Print the schema of a message type
    Describe {
        /// Fully-qualified message type name
        type_name: String,
    },

    /// Encode a JSON document as a binary message file
    Encode {
        type_name: String,
        json_in: PathBuf,
        bin_out: PathBuf,
    },

    /// Decode a binary message file and print it as JSON
    Decode { type_name: String, bin_in: PathBuf },

    /// Print the library version
    Version,
}

fn main() -> anyhow::Result<()> {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = cli
        .import_paths
        .into_iter()
        .fold(BridgeConfig::from_env(), BridgeConfig::with_import_path);
    let config = if cli.arena {
        config.with_allocation(Allocation::Arena)
    } else {
        config
    };
    protobridge::configure(&config)?;

    for file in &cli.imports {
        match protobridge::import_proto_file(file) {
            Ok(types) => info!(file = %file, types = types.len(), "imported"),
            Err(Error::Import { diagnostics, .. }) => {
                for diagnostic in &diagnostics {
                    eprintln!("{diagnostic}");
                }
                bail!("failed to import '{file}'");
            }
            Err(e) => return Err(e).with_context(|| format!("failed to import '{file}'")),
        }
    }

    match cli.command {
        Commands::Types => {
            for type_name in protobridge::list_imported_types()? {
                println!("{type_name}");
            }
        }
        Commands::Describe { type_name } => {
            print!("{}", protobridge::describe_schema(&type_name)?);
        }
        Commands::Encode {
            type_name,
            json_in,
            bin_out,
        } => {
            let text = fs::read_to_string(&json_in)
                .with_context(|| format!("failed to read {}", json_in.display()))?;
            let document: serde_json::Value = serde_json::from_str(&text)
                .with_context(|| format!("{} is not valid JSON", json_in.display()))?;
            let desc = protobridge::resolve_type(&type_name)?;
            let value = json::to_generic(&desc, &document)?;
            let bytes = protobridge::serialize_to_bytes(&type_name, &value, config.allocation)?;
            wire::write_atomic(&bin_out, &bytes)?;
            info!(type_name = %type_name, bytes = bytes.len(), path = %bin_out.display(), "encoded");
        }
        Commands::Decode { type_name, bin_in } => {
            let bytes = fs::read(&bin_in)
                .with_context(|| format!("failed to read {}", bin_in.display()))?;
            let value = protobridge::parse_from_bytes(&type_name, &bytes, config.allocation)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json::from_generic(&value))?
            );
        }
        Commands::Version => {
            println!(
                "protobridge {} ({})",
                protobridge::version_string(),
                protobridge::version()
            );
        }
    }

    Ok(())
}
