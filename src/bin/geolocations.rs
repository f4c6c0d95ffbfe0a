mod cli_utils;
mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use geolocations::AccessMode;
use std::path::PathBuf;

use commands::{cmd_export, cmd_inspect, cmd_lookup};

#[derive(Parser)]
#[command(name = "geolocations")]
#[command(
    about = "Look up and export MaxMind DB geo-IP databases",
    long_about = "geolocations - read-only reader for MaxMind DB (MMDB) geo-IP databases\n\n\
    Resolve IP addresses to location records, inspect database metadata, and\n\
    export every network of a database with its record.\n\n\
    Examples:\n\
      geolocations lookup GeoLite2-City.mmdb 81.2.69.160 2001:db8::1\n\
      geolocations lookup GeoLite2-City.mmdb 81.2.69.160 --locale de\n\
      geolocations inspect GeoLite2-City.mmdb --json\n\
      geolocations export GeoLite2-City.mmdb.gz --format csv -o networks.csv"
)]
#[command(version)]
struct Cli {
    /// More log output on stderr (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// How the database file is loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Read the whole file into memory
    Memory,
    /// Memory-map the file
    Mmap,
}

impl From<ModeArg> for AccessMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Memory => AccessMode::Memory,
            ModeArg::Mmap => AccessMode::MemoryMapped,
        }
    }
}

/// Export output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    /// network,prefix_len,country,city,latitude,longitude
    Csv,
    /// One JSON object per line
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up one or more IP addresses (JSON array on stdout)
    Lookup {
        /// Path to the database (.mmdb, or .mmdb.gz)
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// Addresses to resolve
        #[arg(value_name = "IP", required = true)]
        addresses: Vec<String>,

        /// How to load the database
        #[arg(short, long, value_enum, default_value = "mmap")]
        mode: ModeArg,

        /// Preferred locale for names (repeatable, most preferred first)
        #[arg(short, long = "locale", value_name = "LOCALE")]
        locales: Vec<String>,

        /// Print the stored record as-is instead of the location model
        #[arg(long)]
        raw: bool,

        /// Quiet mode - no output, only exit code (0 = all found, 1 = otherwise)
        #[arg(short, long)]
        quiet: bool,
    },

    /// Show database metadata
    Inspect {
        /// Path to the database
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// Output metadata as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Export every network with its record
    Export {
        /// Path to the database
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "csv")]
        format: ExportFormat,

        /// Decode cache capacity
        #[arg(long, default_value = "16384")]
        cache_size: usize,

        /// Also export IPv4 networks reached through IPv6 aliases
        #[arg(long)]
        include_aliases: bool,

        /// Output file (default: stdout)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli_utils::init_logging(cli.verbose);

    match cli.command {
        Commands::Lookup {
            database,
            addresses,
            mode,
            locales,
            raw,
            quiet,
        } => cmd_lookup(database, addresses, mode.into(), locales, raw, quiet),
        Commands::Inspect { database, json } => cmd_inspect(database, json),
        Commands::Export {
            database,
            format,
            cache_size,
            include_aliases,
            output,
        } => cmd_export(database, format, cache_size, include_aliases, output),
    }
}
