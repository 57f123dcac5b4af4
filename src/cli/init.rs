//! `hz init` - write a starter configuration.

use std::path::Path;

use crate::cli::CliError;
use crate::config;

pub(crate) fn run(force: bool) -> Result<(), CliError> {
    let path = Path::new("hz.yaml");

    if path.exists() && !force {
        return Err(CliError::msg(
            "config file already exists. Use --force to overwrite",
        ));
    }

    config::create_default_config(path)?;

    let shown = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    println!("Created {}", shown.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit hz.yaml to configure your services");
    println!("  2. Run 'hz start' to start the proxy");
    println!("  3. Run 'hz tunnel --enable' to enable the tunnel");
    println!();
    println!("Quick start:");
    println!("  hz add backend 3001 --default");
    println!("  hz add api 8080 --route '/api/*'");
    println!("  hz start");

    Ok(())
}
