//! Local filesystem helpers: the sandbox identity files and the optional
//! user config file.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::domain::config::UserConfig;

fn cirrus_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.join(".cirrus"))
}

/// Path of a sandbox's private key file.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn identity_path(sandbox: &str) -> Result<PathBuf> {
    Ok(cirrus_dir()?.join("identities").join(format!("{sandbox}.pem")))
}

/// Write a sandbox's private key to `~/.cirrus/identities/<name>.pem`,
/// readable by the owner only.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_identity_file(sandbox: &str, private_key_pem: &str) -> Result<PathBuf> {
    let path = identity_path(sandbox)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    std::fs::write(&path, private_key_pem)
        .with_context(|| format!("writing identity file {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("setting permissions on {}", path.display()))?;
    }
    Ok(path)
}

/// Remove a sandbox's private key file, if present.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be removed.
pub fn remove_identity_file(sandbox: &str) -> Result<()> {
    let path = identity_path(sandbox)?;
    if path.exists() {
        std::fs::remove_file(&path)
            .with_context(|| format!("removing identity file {}", path.display()))?;
    }
    Ok(())
}

/// Record a sandbox's host keys in `~/.cirrus/known_hosts`, replacing any
/// previous entries for the same address.
///
/// # Errors
///
/// Returns an error if the file cannot be read or written.
pub fn record_known_host(
    address: &str,
    port: u16,
    host_keys: &[crate::domain::bootstrap::HostKey],
) -> Result<()> {
    let dir = cirrus_dir()?;
    std::fs::create_dir_all(&dir).with_context(|| format!("creating directory {}", dir.display()))?;
    let path = dir.join("known_hosts");

    let host = format!("[{address}]:{port}");
    let mut lines: Vec<String> = match std::fs::read_to_string(&path) {
        Ok(content) => content
            .lines()
            .filter(|line| !line.starts_with(&host))
            .map(str::to_owned)
            .collect(),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(err) => {
            return Err(err).with_context(|| format!("reading {}", path.display()));
        }
    };
    for key in host_keys {
        lines.push(format!("{host} {} {}", key.algorithm, key.material));
    }
    std::fs::write(&path, lines.join("\n") + "\n")
        .with_context(|| format!("writing {}", path.display()))
}

/// Load `~/.cirrus/config.yml`, or defaults when the file doesn't exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    let path = cirrus_dir()?.join("config.yml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    UserConfig::from_yaml(&content)
        .with_context(|| format!("parsing config file {}", path.display()))
}
