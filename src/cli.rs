use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about = "Load CSV extracts into a warehouse and enrich their metadata", long_about = None)]
pub struct Cli {
    /// Service registry file
    #[arg(
        long,
        global = true,
        env = "CSV_WAREHOUSE_SERVICES",
        default_value = "services.yaml"
    )]
    pub services: PathBuf,
    /// Directory holding dataset metadata records
    #[arg(
        long = "metadata-dir",
        global = true,
        env = "CSV_WAREHOUSE_METADATA_DIR",
        default_value = "metadata"
    )]
    pub metadata_dir: PathBuf,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Infer column names and types from a CSV file into a column file
    Probe(ProbeArgs),
    /// Bulk load a CSV file into a warehouse table
    Load(LoadArgs),
    /// Detect dimension columns and convert date columns of a dataset
    Optimize(OptimizeArgs),
    /// List the live columns of a table
    Columns(TableArgs),
    /// Run a query and print every cell as text
    Query(QueryArgs),
    /// Drop a table from the warehouse
    DropTable(TableArgs),
    /// Manage registered datastore services
    #[command(subcommand)]
    Services(ServiceCommands),
}

#[derive(Debug, Args)]
pub struct ProbeArgs {
    /// Input CSV file to inspect
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Destination column file (YAML)
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
    /// Number of rows to sample when inferring types (0 means full scan)
    #[arg(long, default_value_t = 2000)]
    pub sample_rows: usize,
    /// Rewrite header names as snake_case column names
    #[arg(long = "snake-case")]
    pub snake_case: bool,
}

#[derive(Debug, Args)]
pub struct LoadArgs {
    /// CSV file to load (comma separated, with a header row)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Registered service id of the target warehouse
    #[arg(short = 's', long = "service")]
    pub service: u64,
    /// Destination table
    #[arg(short = 't', long = "table")]
    pub table: String,
    /// Column file produced by `probe`; inferred from the input when omitted
    #[arg(short = 'c', long = "columns")]
    pub columns: Option<PathBuf>,
    /// Keep existing rows instead of replacing them
    #[arg(long)]
    pub append: bool,
    /// Create the table before loading
    #[arg(long = "create-table")]
    pub create_table: bool,
    /// Owner of the dataset registered for a newly created table
    #[arg(long = "user", default_value_t = 0)]
    pub user: u64,
    /// Dataset name (defaults to the table name)
    #[arg(long = "dataset-name")]
    pub dataset_name: Option<String>,
    /// Rows sampled for inference when no column file is given
    #[arg(long, default_value_t = 2000)]
    pub sample_rows: usize,
}

#[derive(Debug, Args)]
pub struct OptimizeArgs {
    #[arg(short = 's', long = "service")]
    pub service: u64,
    #[arg(short = 'd', long = "dataset")]
    pub dataset: u64,
    #[arg(long = "user", default_value_t = 0)]
    pub user: u64,
}

#[derive(Debug, Args)]
pub struct TableArgs {
    #[arg(short = 's', long = "service")]
    pub service: u64,
    #[arg(short = 't', long = "table")]
    pub table: String,
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    #[arg(short = 's', long = "service")]
    pub service: u64,
    /// SQL text; `$1..$n` are bound to `--arg` values in order
    #[arg(long)]
    pub sql: String,
    #[arg(long = "arg", action = clap::ArgAction::Append)]
    pub args: Vec<String>,
    /// Emit rows as JSON objects instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Subcommand)]
pub enum ServiceCommands {
    /// List registered services
    List,
    /// Register a new service
    Add(AddServiceArgs),
    /// Remove a registered service
    Remove {
        #[arg(long)]
        id: u64,
    },
}

#[derive(Debug, Args)]
pub struct AddServiceArgs {
    #[arg(long, default_value = "postgres")]
    pub backend: String,
    #[arg(long)]
    pub host: String,
    #[arg(long, default_value_t = 5432)]
    pub port: u16,
    #[arg(long)]
    pub username: String,
    #[arg(long, env = "CSV_WAREHOUSE_PASSWORD")]
    pub password: String,
    #[arg(long)]
    pub database: String,
    #[arg(long, default_value = "warehouse")]
    pub group: String,
    /// Local directory or `user@host:/dir` readable by the database server
    #[arg(long = "staging-dir")]
    pub staging_dir: String,
    /// Treat dropping a missing table as success
    #[arg(long = "drop-missing-ok")]
    pub drop_missing_ok: bool,
}
