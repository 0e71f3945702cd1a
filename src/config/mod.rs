mod file_config;

pub use file_config::FileConfig;

use crate::interceptor::InterceptorSettings;
use anyhow::{bail, Result};
use std::path::PathBuf;

pub const DEFAULT_BUCKET_DB_FILE: &str = "storage.db";
pub const DEFAULT_DOCUMENT_DB_FILE: &str = "iris.db";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub log_actions: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub log_actions: bool,
    pub bucket_db_file: String,
    pub document_db_file: String,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let log_actions = file.log_actions.unwrap_or(cli.log_actions);

        let bucket_db_file = file
            .bucket_db_file
            .unwrap_or_else(|| DEFAULT_BUCKET_DB_FILE.to_string());
        let document_db_file = file
            .document_db_file
            .unwrap_or_else(|| DEFAULT_DOCUMENT_DB_FILE.to_string());
        if bucket_db_file == document_db_file {
            bail!(
                "Bucket and document databases must be different files, both are {:?}",
                bucket_db_file
            );
        }

        Ok(Self {
            db_dir,
            log_actions,
            bucket_db_file,
            document_db_file,
        })
    }

    pub fn bucket_db_path(&self) -> PathBuf {
        self.db_dir.join(&self.bucket_db_file)
    }

    pub fn document_db_path(&self) -> PathBuf {
        self.db_dir.join(&self.document_db_file)
    }

    pub fn interceptor_settings(&self) -> InterceptorSettings {
        InterceptorSettings {
            log_actions: self.log_actions,
        }
    }
}
