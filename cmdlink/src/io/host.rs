//! Host command-processing capability.
//!
//! The [`CommandHost`] trait is the only way the dispatcher reaches the host
//! environment. Tests use recording hosts that never spawn processes.

use std::io::Write;
use std::process::Command;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::core::types::Identity;
use crate::error::{Error, Result};
use crate::io::config::HostConfig;
use crate::io::process::run_with_timeout;

/// Environment variable naming the identity label (`elevated` or `actor`).
pub const IDENTITY_ENV: &str = "CMDLINK_IDENTITY";
/// Environment variable carrying the actor id for actor-local dispatch.
pub const ACTOR_ENV: &str = "CMDLINK_ACTOR";

/// Abstraction over the host's command processor.
pub trait CommandHost: Send + Sync {
    /// Execute one command string under `identity`.
    fn submit(&self, command: &str, identity: &Identity) -> Result<()>;
}

/// Host that runs each command through a shell (`sh -c <command>` by default).
///
/// Identity is advisory: it is exposed to the child through [`IDENTITY_ENV`]
/// and [`ACTOR_ENV`], nothing is sandboxed.
#[derive(Debug, Clone)]
pub struct ShellHost {
    shell: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl ShellHost {
    pub fn new(cfg: &HostConfig) -> Self {
        Self {
            shell: cfg.shell.clone(),
            timeout: Duration::from_secs(cfg.timeout_secs),
            output_limit_bytes: cfg.output_limit_bytes,
        }
    }

    fn build_command(&self, command: &str, identity: &Identity) -> Result<Command> {
        let (program, args) = self
            .shell
            .split_first()
            .ok_or_else(|| Error::dispatch(command, "host shell is not configured"))?;
        let mut cmd = Command::new(program);
        cmd.args(args).arg(command).env(IDENTITY_ENV, identity.label());
        match identity {
            Identity::Elevated => {
                cmd.env_remove(ACTOR_ENV);
            }
            Identity::Actor(id) => {
                cmd.env(ACTOR_ENV, id.as_str());
            }
        }
        Ok(cmd)
    }
}

impl CommandHost for ShellHost {
    #[instrument(skip_all, fields(command = %command, identity = identity.label()))]
    fn submit(&self, command: &str, identity: &Identity) -> Result<()> {
        let cmd = self.build_command(command, identity)?;
        let output = run_with_timeout(cmd, self.timeout, self.output_limit_bytes)
            .map_err(|err| Error::dispatch(command, format!("{err:#}")))?;

        echo(&output.stdout, &output.stderr);

        if output.timed_out {
            return Err(Error::dispatch(
                command,
                format!("command timed out after {:?}", self.timeout),
            ));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "command exited unsuccessfully");
            let stderr = output.stderr_lossy();
            return Err(Error::dispatch(
                command,
                format!(
                    "exit status {:?}{}",
                    output.status.code(),
                    if stderr.trim().is_empty() {
                        String::new()
                    } else {
                        format!(": {}", stderr.trim())
                    }
                ),
            ));
        }
        debug!("command succeeded");
        Ok(())
    }
}

fn echo(stdout: &[u8], stderr: &[u8]) {
    if !stdout.is_empty() {
        let mut out = std::io::stdout().lock();
        if let Err(err) = out.write_all(stdout).and_then(|()| out.flush()) {
            warn!(err = %err, "failed to echo command stdout");
        }
    }
    if !stderr.is_empty() {
        let mut err_out = std::io::stderr().lock();
        if let Err(err) = err_out.write_all(stderr) {
            warn!(err = %err, "failed to echo command stderr");
        }
    }
}
