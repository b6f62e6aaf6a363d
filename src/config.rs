use std::path::PathBuf;

use tablesync_core::DEFAULT_PAGE_SIZE;

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Directory holding one journal per group
    pub data_dir: PathBuf,
    /// Path to the API key file
    pub config_path: PathBuf,
    /// Maximum records per zone change page
    pub page_size: usize,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let port = var("TABLESYNC_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let data_dir = var("TABLESYNC_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("tablesync-server")
            });

        let config_path = var("TABLESYNC_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("tablesync-server")
                    .join("config.yaml")
            });

        let page_size = var("TABLESYNC_PAGE_SIZE")
            .and_then(|p| p.parse().ok())
            .filter(|p: &usize| *p > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE);

        Self {
            port,
            data_dir,
            config_path,
            page_size,
        }
    }

    /// Applies command-line overrides on top of the environment.
    pub fn with_overrides(
        mut self,
        port: Option<u16>,
        data_dir: Option<PathBuf>,
        config_path: Option<PathBuf>,
    ) -> Self {
        if let Some(port) = port {
            self.port = port;
        }
        if let Some(data_dir) = data_dir {
            self.data_dir = data_dir;
        }
        if let Some(config_path) = config_path {
            self.config_path = config_path;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[]));
        assert_eq!(config.port, 8080);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert!(config.data_dir.ends_with("tablesync-server"));
        assert!(config.config_path.ends_with("tablesync-server/config.yaml"));
    }

    #[test]
    fn test_env_values() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("TABLESYNC_PORT", "9000"),
            ("TABLESYNC_DATA_DIR", "/srv/tablesync"),
            ("TABLESYNC_CONFIG", "/etc/tablesync.yaml"),
            ("TABLESYNC_PAGE_SIZE", "50"),
        ]));
        assert_eq!(config.port, 9000);
        assert_eq!(config.data_dir, PathBuf::from("/srv/tablesync"));
        assert_eq!(config.config_path, PathBuf::from("/etc/tablesync.yaml"));
        assert_eq!(config.page_size, 50);
    }

    #[test]
    fn test_invalid_env_values_fall_back() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("TABLESYNC_PORT", "not-a-port"),
            ("TABLESYNC_PAGE_SIZE", "0"),
        ]));
        assert_eq!(config.port, 8080);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_overrides_win() {
        let config = ServerConfig::from_lookup(lookup(&[("TABLESYNC_PORT", "9000")]))
            .with_overrides(Some(7000), Some(PathBuf::from("/tmp/data")), None);
        assert_eq!(config.port, 7000);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/data"));
    }
}
