pub mod cli;
pub mod datastore;
pub mod dataset;
pub mod error;
pub mod metadata;
pub mod schema;
pub mod services;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, Commands, ServiceCommands},
    datastore::{Datastore, LoadOptions, Row},
    dataset::{FileMetadataStore, optimize_dataset_metadata},
    metadata::ColumnFile,
    services::{Service, ServiceRegistry},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_warehouse", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match &cli.command {
        Commands::Probe(args) => handle_probe(args),
        Commands::Load(args) => handle_load(&cli, args),
        Commands::Optimize(args) => handle_optimize(&cli, args),
        Commands::Columns(args) => handle_columns(&cli, args),
        Commands::Query(args) => handle_query(&cli, args),
        Commands::DropTable(args) => handle_drop_table(&cli, args),
        Commands::Services(command) => handle_services(&cli, command),
    }
}

fn handle_probe(args: &cli::ProbeArgs) -> Result<()> {
    info!("Probing '{}'", args.input.display());
    let columns = metadata::infer_columns(&args.input, args.sample_rows, args.snake_case)
        .with_context(|| format!("Inferring columns from {:?}", args.input))?;
    ColumnFile { columns }
        .save(&args.output)
        .with_context(|| format!("Writing column file {:?}", args.output))?;
    info!("Inferred columns written to {:?}", args.output);
    Ok(())
}

fn handle_load(cli: &Cli, args: &cli::LoadArgs) -> Result<()> {
    let service = registered_service(cli, args.service)?;
    let columns = match &args.columns {
        Some(path) => {
            ColumnFile::load(path)
                .with_context(|| format!("Loading column file {path:?}"))?
                .columns
        }
        None => metadata::infer_columns(&args.input, args.sample_rows, false)
            .with_context(|| format!("Inferring columns from {:?}", args.input))?,
    };
    debug!("Load columns: {columns:?}");

    let mut datastore = connect(&service)?;
    let options = LoadOptions {
        append: args.append,
        create_table: args.create_table,
    };
    let rows = datastore
        .bulk_load(&args.input, &args.table, &columns, options)
        .with_context(|| format!("Loading {:?} into table '{}'", args.input, args.table))?;
    println!("Loaded {rows} row(s) into '{}'", args.table);

    if args.create_table {
        let mut store = FileMetadataStore::new(&cli.metadata_dir);
        let name = args.dataset_name.as_deref().unwrap_or(&args.table);
        let dataset = store
            .create_dataset(name, args.user, service.id, &args.table, &columns)
            .with_context(|| format!("Registering dataset for table '{}'", args.table))?;
        println!("Registered dataset {}", dataset.id);
    }
    Ok(())
}

fn handle_optimize(cli: &Cli, args: &cli::OptimizeArgs) -> Result<()> {
    let service = registered_service(cli, args.service)?;
    let mut datastore = connect(&service)?;
    let mut store = FileMetadataStore::new(&cli.metadata_dir);
    let report = optimize_dataset_metadata(datastore.as_mut(), &mut store, args.dataset, args.user)
        .with_context(|| format!("Optimizing dataset {}", args.dataset))?;

    println!("Dimensions flagged: {}", report.dimensions.flagged.join(", "));
    if !report.dimensions.skipped.is_empty() {
        println!("Dimensions skipped: {}", report.dimensions.skipped.join(", "));
    }
    println!("Dates converted: {}", report.dates.converted.join(", "));
    if let Some(field) = &report.dates.default_date_field {
        println!("Default date field: {field}");
    }
    Ok(())
}

fn handle_columns(cli: &Cli, args: &cli::TableArgs) -> Result<()> {
    let service = registered_service(cli, args.service)?;
    let columns = connect(&service)?
        .get_column_types(&args.table)
        .with_context(|| format!("Reading columns of table '{}'", args.table))?;
    print!("{}", table::render_columns(&columns));
    Ok(())
}

fn handle_query(cli: &Cli, args: &cli::QueryArgs) -> Result<()> {
    let service = registered_service(cli, args.service)?;
    let bound = args.args.iter().map(String::as_str).collect::<Vec<_>>();
    let rows = connect(&service)?
        .query(&args.sql, &bound)
        .context("Running query")?;
    if args.json {
        println!("{}", rows_to_json(&rows)?);
    } else {
        print!("{}", table::render_rows(&rows));
    }
    Ok(())
}

fn handle_drop_table(cli: &Cli, args: &cli::TableArgs) -> Result<()> {
    let service = registered_service(cli, args.service)?;
    connect(&service)?
        .delete_table(&args.table)
        .with_context(|| format!("Dropping table '{}'", args.table))?;
    println!("Dropped table '{}'", args.table);
    Ok(())
}

fn handle_services(cli: &Cli, command: &ServiceCommands) -> Result<()> {
    let mut registry = ServiceRegistry::load(&cli.services)
        .with_context(|| format!("Loading service registry {:?}", cli.services))?;
    match command {
        ServiceCommands::List => {
            let headers = ["id", "backend", "host", "port", "database", "group", "staging"]
                .map(String::from)
                .to_vec();
            let rows = registry
                .all()
                .iter()
                .map(|s| {
                    vec![
                        s.id.to_string(),
                        s.backend.clone(),
                        s.host.clone(),
                        s.port.to_string(),
                        s.database.clone(),
                        s.group.clone(),
                        s.staging_directory.clone(),
                    ]
                })
                .collect::<Vec<_>>();
            print!("{}", table::render_table(&headers, &rows));
        }
        ServiceCommands::Add(args) => {
            let id = registry
                .create(Service {
                    id: 0,
                    backend: args.backend.clone(),
                    host: args.host.clone(),
                    port: args.port,
                    username: args.username.clone(),
                    password: args.password.clone(),
                    database: args.database.clone(),
                    group: args.group.clone(),
                    staging_directory: args.staging_dir.clone(),
                    drop_missing_ok: args.drop_missing_ok,
                })
                .context("Registering service")?
                .id;
            registry.save().context("Saving service registry")?;
            println!("Registered service {id}");
        }
        ServiceCommands::Remove { id } => {
            registry
                .delete(*id)
                .with_context(|| format!("Removing service {id}"))?;
            registry.save().context("Saving service registry")?;
            println!("Removed service {id}");
        }
    }
    Ok(())
}

fn registered_service(cli: &Cli, id: u64) -> Result<Service> {
    let registry = ServiceRegistry::load(&cli.services)
        .with_context(|| format!("Loading service registry {:?}", cli.services))?;
    Ok(registry.get(id)?.clone())
}

fn connect(service: &Service) -> Result<Box<dyn Datastore>> {
    service
        .datastore()
        .with_context(|| format!("Connecting to service {}", service.id))
}

fn rows_to_json(rows: &[Row]) -> Result<String> {
    let objects = rows
        .iter()
        .map(|row| {
            row.fields()
                .iter()
                .map(|f| {
                    let value = f
                        .value
                        .clone()
                        .map_or(serde_json::Value::Null, serde_json::Value::String);
                    (f.name.clone(), value)
                })
                .collect::<serde_json::Map<_, _>>()
        })
        .collect::<Vec<_>>();
    serde_json::to_string_pretty(&objects).context("Serializing rows as JSON")
}
