//! Resolves Tryton object references from the command line.
//!
//! ```text
//! tryton-xref [--config <file>] <type>:<reference>...
//! ```
//!
//! Each argument is resolved against the configured backend and printed with its
//! display title, e.g. `field:~sale.sale.state` prints `State`.

use std::path::PathBuf;
use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tryton_xref::backend::Connection;
use tryton_xref::error::{DomainError, Result};
use tryton_xref::reference::ObjectType;
use tryton_xref::registry::Registry;
use tryton_xref::resolver::Resolver;
use tryton_xref::settings::Settings;
use tryton_xref::title::reference_title;

fn run(args: Vec<String>) -> Result<usize> {
    let mut config_path: Option<PathBuf> = None;
    let mut references = Vec::new();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--config" {
            let path = args
                .next()
                .ok_or_else(|| DomainError::Config("--config needs a file".to_string()))?;
            config_path = Some(PathBuf::from(path));
        } else {
            references.push(arg);
        }
    }

    let settings = Settings::load(config_path.as_deref())?;
    info!(connection_type = ?settings.connection_type, database = %settings.database(), "opening backend");
    let resolver = Resolver::new(Connection::open(&settings)?);
    let registry = match &settings.registry_path {
        Some(path) if path.exists() => Registry::load(path)?,
        _ => Registry::new(),
    };

    let mut unresolved = 0;
    for argument in &references {
        let (object_type, text) = argument
            .split_once(':')
            .ok_or_else(|| DomainError::Config(format!("expected <type>:<reference>, got '{}'", argument)))?;
        let object_type: ObjectType = object_type.parse()?;
        let resolved = reference_title(&resolver, &registry, "<command line>", None, object_type, text);
        if resolved.title.is_fallback() {
            unresolved += 1;
        }
        match &resolved.target {
            Some(link) => println!("{}\t{}\t{}#{}", argument, resolved.title, link.document, link.anchor),
            None => println!("{}\t{}", argument, resolved.title),
        }
    }
    Ok(unresolved)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match run(std::env::args().skip(1).collect()) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(unresolved) => {
            error!(unresolved, "some references could not be resolved");
            ExitCode::from(2)
        }
        Err(e) => {
            error!(error = %e, "tryton-xref failed");
            ExitCode::FAILURE
        }
    }
}
