//! `hz remove` - strike a service from the configuration.

use std::path::PathBuf;

use crate::cli::{read_document, resolve_config_path, write_document, CliError};

pub(crate) fn run(config_flag: &Option<PathBuf>, name: &str) -> Result<(), CliError> {
    let path = resolve_config_path(config_flag)?;
    let mut config = read_document(&path)?;

    let before = config.services.len();
    config.services.retain(|s| s.name != name);

    if config.services.len() == before {
        return Err(CliError::msg(format!("service '{name}' not found")));
    }

    write_document(&path, &config)?;
    println!("Removed service '{name}'");
    Ok(())
}
