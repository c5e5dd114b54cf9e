//! Configuration system for deepscout.
//!
//! Uses `figment` for layered configuration: defaults -> user config file
//! -> workspace config file -> environment. Configuration is loaded from
//! `~/.config/deepscout/config.toml` and/or `.deepscout/config.toml` in
//! the workspace directory, with `DEEPSCOUT_*` environment variables on
//! top (e.g. `DEEPSCOUT_RESEARCH__MODE=fast`).

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Research mode presets trading speed against depth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchMode {
    /// Shallow sweep, minutes not tens of minutes.
    Fast,
    /// Middle ground between speed and depth.
    Balanced,
    /// Full recursive exploration.
    #[default]
    Comprehensive,
}

impl ResearchMode {
    pub const ALL: [ResearchMode; 3] = [
        ResearchMode::Fast,
        ResearchMode::Balanced,
        ResearchMode::Comprehensive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResearchMode::Fast => "fast",
            ResearchMode::Balanced => "balanced",
            ResearchMode::Comprehensive => "comprehensive",
        }
    }

    /// Short operator-facing description of the tradeoff.
    pub fn describe(&self) -> &'static str {
        match self {
            ResearchMode::Fast => "surface-level sweep (1-3 min)",
            ResearchMode::Balanced => "speed/depth compromise (3-6 min)",
            ResearchMode::Comprehensive => "full recursive analysis (5-12 min)",
        }
    }
}

impl fmt::Display for ResearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResearchMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fast" => Ok(ResearchMode::Fast),
            "balanced" => Ok(ResearchMode::Balanced),
            "comprehensive" => Ok(ResearchMode::Comprehensive),
            other => Err(ConfigError::Invalid {
                message: format!("unknown research mode '{other}'"),
            }),
        }
    }
}

/// Settings for the research run itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchSettings {
    /// Default mode preset offered at run configuration.
    pub mode: ResearchMode,
    /// Default number of parallel sub-queries per level.
    pub default_breadth: u32,
    /// Default number of exploration levels.
    pub default_depth: u32,
    /// Environment variable holding the Gemini API key.
    pub api_key_env: String,
    /// Gemini model used by the bundled collaborator.
    pub model: String,
    /// Well-known path the collaborator writes tree snapshots to.
    pub snapshot_path: PathBuf,
    /// Seconds between progress-snapshot polls.
    pub poll_interval_secs: u64,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            mode: ResearchMode::Comprehensive,
            default_breadth: 10,
            default_depth: 5,
            api_key_env: "GEMINI_API_KEY".to_string(),
            model: "gemini-2.0-flash".to_string(),
            snapshot_path: PathBuf::from("research_tree.json"),
            poll_interval_secs: 2,
        }
    }
}

/// Where run artifacts are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Base directory for reports, trees, graphs, and summaries.
    pub base_dir: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("results"),
        }
    }
}

/// Top-level configuration for deepscout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoutConfig {
    pub research: ResearchSettings,
    pub output: OutputSettings,
}

/// Path of the workspace-level config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".deepscout").join("config.toml")
}

/// Check whether any configuration file exists (user-level or workspace-level).
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if let Some(dirs) = directories::ProjectDirs::from("dev", "deepscout", "deepscout")
        && dirs.config_dir().join("config.toml").exists()
    {
        return true;
    }
    workspace.is_some_and(|ws| workspace_config_path(ws).exists())
}

/// Load configuration with layered precedence.
///
/// `override_path`, when given, must exist and is merged last before the
/// environment layer.
pub fn load_config(
    workspace: Option<&Path>,
    override_path: Option<&Path>,
) -> Result<ScoutConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(ScoutConfig::default()));

    // User-level config
    if let Some(dirs) = directories::ProjectDirs::from("dev", "deepscout", "deepscout") {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // Explicit config file
    if let Some(path) = override_path {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        figment = figment.merge(Toml::file(path));
    }

    // Environment variables (DEEPSCOUT_RESEARCH__MODE, DEEPSCOUT_OUTPUT__BASE_DIR, ...)
    figment = figment.merge(Env::prefixed("DEEPSCOUT_").split("__"));

    figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })
}

/// Write a default config file into the workspace, for `config init`.
///
/// Returns the path written. Refuses to overwrite an existing file.
pub fn write_default_config(workspace: &Path) -> Result<PathBuf, ConfigError> {
    let path = workspace_config_path(workspace);
    if path.exists() {
        return Err(ConfigError::Invalid {
            message: format!("config already exists at {}", path.display()),
        });
    }
    let toml_str =
        toml::to_string_pretty(&ScoutConfig::default()).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Invalid {
            message: format!("cannot create {}: {e}", parent.display()),
        })?;
    }
    std::fs::write(&path, toml_str).map_err(|e| ConfigError::Invalid {
        message: format!("cannot write {}: {e}", path.display()),
    })?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ScoutConfig::default();
        assert_eq!(config.research.mode, ResearchMode::Comprehensive);
        assert_eq!(config.research.default_breadth, 10);
        assert_eq!(config.research.default_depth, 5);
        assert_eq!(config.research.poll_interval_secs, 2);
        assert_eq!(config.research.api_key_env, "GEMINI_API_KEY");
        assert_eq!(config.output.base_dir, PathBuf::from("results"));
    }

    #[test]
    fn test_mode_roundtrip() {
        for mode in ResearchMode::ALL {
            let parsed: ResearchMode = mode.as_str().parse().unwrap();
            assert_eq!(parsed, mode);
        }
        assert!("thorough".parse::<ResearchMode>().is_err());
    }

    #[test]
    fn test_load_config_merges_workspace_file() {
        let dir = TempDir::new().unwrap();
        let config_dir = dir.path().join(".deepscout");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(
            config_dir.join("config.toml"),
            "[research]\nmode = \"fast\"\ndefault_breadth = 4\n",
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.research.mode, ResearchMode::Fast);
        assert_eq!(config.research.default_breadth, 4);
        // Untouched fields keep their defaults.
        assert_eq!(config.research.default_depth, 5);
    }

    #[test]
    fn test_load_config_missing_override_is_error() {
        let err = load_config(None, Some(Path::new("/nonexistent/config.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_write_default_config_once() {
        let dir = TempDir::new().unwrap();
        let path = write_default_config(dir.path()).unwrap();
        assert!(path.exists());
        assert!(write_default_config(dir.path()).is_err());

        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.research.mode, ResearchMode::Comprehensive);
    }
}
