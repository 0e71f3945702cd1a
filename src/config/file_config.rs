use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Can override CLI
    pub db_dir: Option<String>,
    pub log_actions: Option<bool>,

    // File-only settings
    pub bucket_db_file: Option<String>,
    pub document_db_file: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_full_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
db_dir = "/var/lib/iris"
log_actions = true
bucket_db_file = "buckets.db"
document_db_file = "library.db"
"#
        )
        .unwrap();

        let config = FileConfig::load(file.path()).unwrap();
        assert_eq!(config.db_dir, Some("/var/lib/iris".to_string()));
        assert_eq!(config.log_actions, Some(true));
        assert_eq!(config.bucket_db_file, Some("buckets.db".to_string()));
        assert_eq!(config.document_db_file, Some("library.db".to_string()));
    }

    #[test]
    fn test_missing_keys_default_to_none() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log_actions = false").unwrap();

        let config = FileConfig::load(file.path()).unwrap();
        assert!(config.db_dir.is_none());
        assert_eq!(config.log_actions, Some(false));
        assert!(config.bucket_db_file.is_none());
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "db_dir = [unterminated").unwrap();

        let err = FileConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = FileConfig::load(Path::new("/nonexistent/iris.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
