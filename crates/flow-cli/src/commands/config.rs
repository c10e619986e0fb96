//! Config command implementation.

use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::ConfigAction;
use crate::config::Config;

pub fn cmd_config(action: ConfigAction, path: &Path) -> Result<()> {
    match action {
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Show => {
            let config = Config::load_from(path);
            let content = toml::to_string_pretty(&config).context("Failed to serialize config")?;
            print!("{}", content);
        }
        ConfigAction::SetDevice { device } => {
            let mut config = Config::load_from(path);
            config.device = Some(device.clone());
            config.save_to(path)?;
            println!("Default device set to {}", device);
        }
    }
    Ok(())
}
