use std::error::Error;
use std::path::Path;

use crate::core::config::data::{path_display, Config};

pub fn init_config(path: &Path, force: bool) -> Result<(), Box<dyn Error>> {
    if path.exists() && !force {
        return Err(format!(
            "{} already exists. Pass --force to overwrite it.",
            path_display(path)
        )
        .into());
    }
    Config::default().save_to_path(path)?;
    println!("Wrote default configuration to {}", path_display(path));
    Ok(())
}
