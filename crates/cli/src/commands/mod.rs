//! Command implementations.

mod info;
mod listen;
mod send;
mod validate;

pub use info::run_info;
pub use listen::run_listen;
pub use send::run_send;
pub use validate::run_validate;

use std::path::Path;

use anyhow::{Context, Result};
use contracts::PipelineBlueprint;

use crate::error::CliError;

/// Load the blueprint at `path`, or the defaults when no path is given
fn load_blueprint(path: Option<&Path>) -> Result<PipelineBlueprint> {
    let Some(path) = path else {
        return Ok(PipelineBlueprint::default());
    };
    if !path.exists() {
        return Err(CliError::config_not_found(path.display().to_string()).into());
    }
    config_loader::ConfigLoader::load_from_path(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}
