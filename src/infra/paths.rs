// src/infra/paths.rs — XDG-compliant path management
//
// All paths respect the ACTIONLENS_HOME environment variable for isolation.
// When ACTIONLENS_HOME is set, config and data live under that directory.
// When unset, config uses ~/.actionlens/ and data uses XDG_DATA_HOME/actionlens.

use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;
use std::sync::OnceLock;

static PROJECT_DIRS: OnceLock<Option<ProjectDirs>> = OnceLock::new();

fn project_dirs() -> Option<&'static ProjectDirs> {
    PROJECT_DIRS
        .get_or_init(|| ProjectDirs::from("", "", "actionlens"))
        .as_ref()
}

/// Returns the ACTIONLENS_HOME override, if set.
fn actionlens_home() -> Option<PathBuf> {
    std::env::var_os("ACTIONLENS_HOME").map(PathBuf::from)
}

/// Home directory, falling back to the working directory when none is known.
pub fn dirs_home() -> PathBuf {
    BaseDirs::new()
        .map(|b| b.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Configuration directory: $ACTIONLENS_HOME/ or ~/.actionlens/
pub fn config_dir() -> PathBuf {
    if let Some(home) = actionlens_home() {
        return home;
    }
    dirs_home().join(".actionlens")
}

/// Data directory: $ACTIONLENS_HOME/data/ or ~/.local/share/actionlens/
pub fn data_dir() -> PathBuf {
    if let Some(home) = actionlens_home() {
        return home.join("data");
    }
    match project_dirs() {
        Some(dirs) => dirs.data_local_dir().to_path_buf(),
        None => config_dir().join("data"),
    }
}

/// Default report directory
pub fn reports_dir() -> PathBuf {
    data_dir().join("reports")
}

/// Config file path
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_dir_under_data_dir() {
        assert!(reports_dir().starts_with(data_dir()));
        assert!(reports_dir().ends_with("reports"));
    }

    #[test]
    fn test_config_file_name() {
        assert_eq!(
            config_file_path().file_name().and_then(|s| s.to_str()),
            Some("config.toml")
        );
    }
}
