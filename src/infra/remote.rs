//! Infrastructure implementation of the `RemoteExec` port.
//!
//! `SshExec` runs commands on a sandbox instance through the system `ssh`
//! binary, authenticated by the sandbox's key pair. The private key is
//! written to a mode-0600 scratch file that lives only for the duration of
//! the call. Host keys are not checked: the channel exists to read the
//! bootstrap report that publishes them in the first place.

use anyhow::{Context, Result, bail};
use std::io::Write;

use crate::application::ports::{CommandRunner, RemoteExec};
use crate::infra::command_runner::{SSH_CMD_TIMEOUT, TokioCommandRunner};

/// Remote command channel over the system `ssh` binary.
pub struct SshExec<R: CommandRunner> {
    runner: R,
}

impl SshExec<TokioCommandRunner> {
    /// Convenience constructor for production use.
    #[must_use]
    pub fn new() -> Self {
        Self {
            runner: TokioCommandRunner::new(SSH_CMD_TIMEOUT),
        }
    }
}

impl Default for SshExec<TokioCommandRunner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: CommandRunner> SshExec<R> {
    /// Create a channel with an explicit runner instance.
    pub fn with_runner(runner: R) -> Self {
        Self { runner }
    }
}

impl<R: CommandRunner> RemoteExec for SshExec<R> {
    async fn run_command(
        &self,
        host: &str,
        port: u16,
        user: &str,
        private_key_pem: &str,
        command: &str,
    ) -> Result<String> {
        let key_file = write_key_file(private_key_pem).context("writing scratch key file")?;
        let key_path = key_file.path().to_string_lossy().into_owned();
        let port = port.to_string();
        let destination = format!("{user}@{host}");

        let output = self
            .runner
            .run(
                "ssh",
                &[
                    "-i",
                    &key_path,
                    "-p",
                    &port,
                    "-o",
                    "StrictHostKeyChecking=no",
                    "-o",
                    "UserKnownHostsFile=/dev/null",
                    "-o",
                    "ConnectTimeout=8",
                    "-o",
                    "BatchMode=yes",
                    &destination,
                    command,
                ],
            )
            .await
            .context("ssh")?;

        if !output.status.success() {
            bail!(
                "remote command failed on {destination}: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn write_key_file(private_key_pem: &str) -> Result<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("cirrus-key-")
        .tempfile()?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(private_key_pem.as_bytes())?;
    if !private_key_pem.ends_with('\n') {
        file.write_all(b"\n")?;
    }
    file.flush()?;
    Ok(file)
}
