//! Default locations for Auto-DJ configuration files

use std::path::PathBuf;

/// Returns: `~/.config/mesh-autodj`
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("mesh-autodj")
}

/// Returns: `~/.config/mesh-autodj/config.yaml`
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.yaml")
}

/// Settings written back by the settings store when the user changes them
///
/// Returns: `~/.config/mesh-autodj/settings.yaml`
pub fn default_settings_path() -> PathBuf {
    default_config_dir().join("settings.yaml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_share_config_dir() {
        let dir = default_config_dir();
        assert!(dir.ends_with("mesh-autodj"));
        assert_eq!(default_config_path().parent(), Some(dir.as_path()));
        assert!(default_settings_path().ends_with("settings.yaml"));
    }
}
