//! Configuration commands

use anyhow::{Result, bail};
use reindex_core::Config;
use std::path::Path;

/// Show the effective configuration
pub async fn cmd_config_show(explicit: Option<&Path>) -> Result<()> {
  let cwd = std::env::current_dir()?;
  let config = super::load_config(explicit)?;

  // Check which config file is being used
  let project_config = Config::project_config_path(&cwd);
  let user_config = Config::user_config_path();

  if let Some(path) = explicit {
    println!("Using config: {}", path.display());
  } else if project_config.exists() {
    println!("Using project config: {}", project_config.display());
  } else if let Some(user_path) = user_config.filter(|p| p.exists()) {
    println!("Using user config: {}", user_path.display());
  } else {
    println!("Using default configuration (no config file found)");
  }
  println!("Queue database: {}", super::storage_path(&config).display());
  println!("Lock directory: {}", super::lock_dir(&config).display());
  println!();

  println!("{}", toml::to_string_pretty(&config)?);
  Ok(())
}

/// Write a commented template to the project config path
pub async fn cmd_config_init(force: bool) -> Result<()> {
  let cwd = std::env::current_dir()?;
  let config_path = Config::project_config_path(&cwd);

  if config_path.exists() && !force {
    bail!(
      "Config file already exists: {} (use --force to overwrite)",
      config_path.display()
    );
  }

  if let Some(parent) = config_path.parent() {
    std::fs::create_dir_all(parent)?;
  }
  std::fs::write(&config_path, Config::generate_template())?;

  println!("Created project config: {}", config_path.display());
  println!("Declare indexable entities under [[entities]] before starting sessions.");
  Ok(())
}
