//! Storage Layer
//!
//! Handles persistence of game profiles and learned knowledge as JSON files.

pub mod knowledge;
pub mod profiles;

pub use knowledge::{load_knowledge, save_knowledge, KnowledgeSnapshot};
pub use profiles::{load_profile, save_profile, GameProfile, RuleDefinition};

use anyhow::Result;
use directories::ProjectDirs;
use std::path::PathBuf;

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("com", "gameinsight", "GameInsight")
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))
}

/// Get the application data directory
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = project_dirs()?.data_dir().to_path_buf();
    std::fs::create_dir_all(&data_dir)?;
    Ok(data_dir)
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = project_dirs()?.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;
    Ok(config_dir)
}
