//! Command-line client for indirector servers.
//!
//! Every command goes through a local `Indirection<Document>` backed by the
//! REST terminus, so it exercises the same code path as any other client.

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;

use indirector::config::{self, Settings};
use indirector::indirection::{Indirection, IndirectionOptions};
use indirector::model::Document;
use indirector::observability::logging;
use indirector::request::Options;
use indirector::resilience::failover;
use indirector::terminus::rest::{self, ReqwestNetwork};

#[derive(Parser)]
#[command(name = "indirector-cli")]
#[command(about = "Find, search, save and destroy documents on an indirector server", long_about = None)]
struct Cli {
    /// Settings file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server to contact, overriding the settings
    #[arg(short, long)]
    server: Option<String>,

    /// Port to contact, overriding the settings
    #[arg(short, long)]
    port: Option<u16>,

    /// Indirection to call
    #[arg(short, long, default_value = "document")]
    indirection: String,

    /// Request option as key=value; may be repeated
    #[arg(short = 'o', long = "option", value_parser = parse_option)]
    options: Vec<(String, String)>,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one document
    Find {
        key: String,
        /// Treat a missing document as an error
        #[arg(long)]
        fail_on_404: bool,
    },
    /// Check whether a document exists
    Head { key: String },
    /// List documents matching a key
    Search { key: String },
    /// Store a document from a JSON value
    Save {
        key: String,
        /// Document data as JSON
        #[arg(short, long)]
        data: String,
    },
    /// Remove a document
    Destroy { key: String },
}

fn parse_option(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(2)
        }
    }
}

/// Returns false when the requested document does not exist.
fn run(cli: Cli) -> Result<bool, Box<dyn Error>> {
    let mut settings = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => Settings::default(),
    };
    if let Some(server) = cli.server {
        settings.server = server;
        settings.server_list.clear();
    }
    if let Some(port) = cli.port {
        settings.port = port;
    }
    config::install(settings.clone());

    let indirection = Indirection::<Document>::register(
        &cli.indirection,
        IndirectionOptions::default().terminus_class(rest::TERMINUS_TYPE),
    )?;
    let network = Arc::new(ReqwestNetwork::new(&settings.http)?);
    rest::register::<Document>(&cli.indirection, None, network)?;

    let options: Options = cli.options.into_iter().collect();
    let call = |command: &Commands| -> indirector::Result<bool> {
        match command {
            Commands::Find { key, fail_on_404 } => {
                let mut options = options.clone();
                if *fail_on_404 {
                    options.insert("fail_on_404", true);
                }
                print_found(indirection.find(key, options)?, key)
            }
            Commands::Head { key } => {
                let exists = indirection.head(key, options.clone())?;
                println!("{}", if exists { "exists" } else { "missing" });
                Ok(exists)
            }
            Commands::Search { key } => {
                let found = indirection.search(key, options.clone())?;
                println!("{}", serde_json::to_string_pretty(&found)?);
                Ok(true)
            }
            Commands::Save { key, data } => {
                let data: Value = serde_json::from_str(data)?;
                let document = Document::new(key.clone(), data);
                let saved = indirection.save(document, Some(key.as_str()), options.clone())?;
                print_found(saved, key)
            }
            Commands::Destroy { key } => {
                print_found(indirection.destroy(key, options.clone())?, key)
            }
        }
    };

    let found = if settings.server_list.is_empty() {
        call(&cli.command)?
    } else {
        failover::each_server(&settings.server_list, |_| call(&cli.command))?
    };
    Ok(found)
}

fn print_found(document: Option<Document>, key: &str) -> indirector::Result<bool> {
    match document {
        Some(document) => {
            println!("{}", serde_json::to_string_pretty(&document)?);
            Ok(true)
        }
        None => {
            eprintln!("Could not find {}", key);
            Ok(false)
        }
    }
}
