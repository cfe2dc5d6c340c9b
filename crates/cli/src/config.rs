//! Client key persistence
//!
//! The client authenticates device management with a persistent private key.
//! It lives in a TOML file under the app's config directory and is generated
//! on first use.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tessera_client::crypto::PrivateKey;

#[derive(Debug, Serialize, Deserialize)]
struct KeyConfig {
    public_key: String,
    private_key: String,
}

/// Default config directory: `$TESSERA_CONFIG_DIR`, or `tessera/` under the
/// XDG config home
pub fn default_config_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os("TESSERA_CONFIG_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Some(dir) = std::env::var_os("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(dir).join("tessera"));
    }
    let home = std::env::var_os("HOME").context("cannot locate a home directory")?;
    Ok(PathBuf::from(home).join(".config").join("tessera"))
}

/// Load the client private key, generating and persisting one on first use
pub fn load_private_key(config_dir: &Path) -> Result<PrivateKey> {
    let config_file = config_dir.join("config.toml");

    if config_file.exists() {
        let text = std::fs::read_to_string(&config_file)
            .with_context(|| format!("cannot read {}", config_file.display()))?;
        let config: KeyConfig =
            toml::from_str(&text).with_context(|| format!("malformed {}", config_file.display()))?;
        let raw = hex::decode(&config.private_key).context("private_key is not valid hex")?;
        return PrivateKey::from_bytes(&raw).context("private_key is not a valid scalar");
    }

    let private_key = PrivateKey::generate();
    let config = KeyConfig {
        public_key: hex::encode(private_key.public_key().serialize()),
        private_key: hex::encode(*private_key.serialize()),
    };

    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("cannot create {}", config_dir.display()))?;
    std::fs::write(&config_file, toml::to_string_pretty(&config)?)
        .with_context(|| format!("cannot write {}", config_file.display()))?;
    tracing::info!(path = %config_file.display(), "generated a new client key");
    Ok(private_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_round_trips_through_config() {
        let dir = std::env::temp_dir().join(format!("tessera-test-{}", std::process::id()));

        let first = load_private_key(&dir).unwrap();
        let second = load_private_key(&dir).unwrap();
        assert_eq!(*first.serialize(), *second.serialize());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
