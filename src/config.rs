use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::analysis::StateGraphConfig;

/// 状态空间探索的配置，从 TOML 文件读取；文件不存在时使用默认值。
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ExplorerConfig {
    #[serde(default)]
    pub state_limit: Option<usize>,
    #[serde(default)]
    pub parallel_modes: bool,
    #[serde(default = "default_include_edges")]
    pub include_edges_in_dot: bool,
    #[serde(default)]
    pub dot_output: Option<PathBuf>,
    #[serde(default)]
    pub json_output: Option<PathBuf>,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            state_limit: None,
            parallel_modes: false,
            include_edges_in_dot: default_include_edges(),
            dot_output: None,
            json_output: None,
        }
    }
}

fn default_include_edges() -> bool {
    true
}

impl ExplorerConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: ExplorerConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    pub fn graph_config(&self) -> StateGraphConfig {
        StateGraphConfig {
            state_limit: self.state_limit,
            parallel_modes: self.parallel_modes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let config = ExplorerConfig::load_from_file("/nonexistent/pn.toml").unwrap();
        assert_eq!(config, ExplorerConfig::default());
        assert_eq!(config.graph_config().state_limit, None);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pn.toml");
        fs::write(&path, "state_limit = 100\ndot_output = \"out/graph.dot\"\n").unwrap();
        let config = ExplorerConfig::load_from_file(&path).unwrap();
        assert_eq!(config.state_limit, Some(100));
        assert!(config.include_edges_in_dot);
        assert!(!config.parallel_modes);
        assert_eq!(config.dot_output, Some(PathBuf::from("out/graph.dot")));
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pn.toml");
        fs::write(&path, "state_limit = \"many\"").unwrap();
        let err = ExplorerConfig::load_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
