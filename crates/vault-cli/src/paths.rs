use directories::ProjectDirs;
use std::path::PathBuf;

pub const APP_QUALIFIER: &str = "com";
pub const APP_ORG: &str = "darklock";
pub const APP_NAME: &str = "vault";

/// Keyring service name for the personal vault's session key.
pub const SESSION_SERVICE: &str = "darklock-vault.session";

pub fn data_dir() -> anyhow::Result<PathBuf> {
    if let Ok(override_path) = std::env::var("VAULT_DATA_DIR") {
        if !override_path.is_empty() {
            return Ok(PathBuf::from(override_path));
        }
    }
    let dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .ok_or_else(|| anyhow::anyhow!("cannot determine data directory"))?;
    Ok(dirs.data_dir().to_path_buf())
}

pub fn store_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("vault.json")
}

pub fn config_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("config.json")
}
