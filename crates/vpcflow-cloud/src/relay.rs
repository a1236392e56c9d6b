//! Remote command execution over ssh, directly or through the bastion

use crate::context::CloudContext;
use crate::environment::bastion_name;
use crate::error::{CloudError, Result};
use crate::model::{InstanceState, Machine};
use crate::wait::{Attempt, wait_until};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

/// Command issued when the caller gives none
pub const DEFAULT_COMMAND: &str = "hostname";

/// How ssh treats unknown host keys
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Only hosts already in `known_hosts`
    Strict,
    /// Record new hosts, refuse changed keys
    #[default]
    AcceptNew,
    /// No checking at all
    Disabled,
}

impl HostKeyPolicy {
    fn ssh_option(&self) -> &'static str {
        match self {
            HostKeyPolicy::Strict => "StrictHostKeyChecking=yes",
            HostKeyPolicy::AcceptNew => "StrictHostKeyChecking=accept-new",
            HostKeyPolicy::Disabled => "StrictHostKeyChecking=no",
        }
    }
}

impl std::str::FromStr for HostKeyPolicy {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "strict" => Ok(HostKeyPolicy::Strict),
            "accept-new" => Ok(HostKeyPolicy::AcceptNew),
            "disabled" | "off" => Ok(HostKeyPolicy::Disabled),
            other => Err(CloudError::InvalidConfig(format!(
                "unknown host key policy '{}' (strict, accept-new, disabled)",
                other
            ))),
        }
    }
}

/// Validated ssh connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    user: String,
    key_dir: PathBuf,
    key_extension: String,
    host_keys: HostKeyPolicy,
    connect_timeout: Duration,
}

impl ConnectionProfile {
    pub const DEFAULT_USER: &'static str = "ec2-user";
    pub const DEFAULT_KEY_EXTENSION: &'static str = "pem";

    pub fn new(user: impl Into<String>, key_dir: impl Into<PathBuf>) -> Result<Self> {
        let user = user.into();
        if user.is_empty() || user.contains(|c: char| c == '@' || c.is_whitespace()) {
            return Err(CloudError::InvalidConfig(format!(
                "invalid ssh login user '{}'",
                user
            )));
        }
        let key_dir = key_dir.into();
        if !key_dir.is_absolute() {
            return Err(CloudError::InvalidConfig(format!(
                "key directory must be absolute: {}",
                key_dir.display()
            )));
        }

        Ok(Self {
            user,
            key_dir,
            key_extension: Self::DEFAULT_KEY_EXTENSION.to_string(),
            host_keys: HostKeyPolicy::default(),
            connect_timeout: Duration::from_secs(10),
        })
    }

    pub fn with_host_key_policy(mut self, policy: HostKeyPolicy) -> Self {
        self.host_keys = policy;
        self
    }

    pub fn with_key_extension(mut self, extension: impl Into<String>) -> Self {
        self.key_extension = extension.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn key_dir(&self) -> &Path {
        &self.key_dir
    }

    pub fn host_key_policy(&self) -> HostKeyPolicy {
        self.host_keys
    }

    /// `<key_dir>/<key_name>.<extension>`
    pub fn key_path(&self, key_name: &str) -> Result<PathBuf> {
        if key_name.is_empty() || key_name.contains(['/', '\\']) || key_name.starts_with('.') {
            return Err(CloudError::InvalidConfig(format!(
                "invalid key name '{}'",
                key_name
            )));
        }
        Ok(self
            .key_dir
            .join(format!("{}.{}", key_name, self.key_extension)))
    }

    /// Arguments for `ssh` running `command` on `host`
    pub fn ssh_args(&self, host: &str, key_name: &str, command: &[String]) -> Result<Vec<String>> {
        let key = self.key_path(key_name)?;
        let mut args = vec![
            "-q".to_string(),
            "-A".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            self.connect_timeout_option(),
            "-o".to_string(),
            self.host_keys.ssh_option().to_string(),
            "-i".to_string(),
            key.display().to_string(),
            format!("{}@{}", self.user, host),
        ];
        args.extend(command_or_default(command));
        Ok(args)
    }

    /// Command line for the second hop, run on the bastion with the forwarded agent
    pub fn hop_command(&self, private_ip: &str, command: &[String]) -> Vec<String> {
        let mut hop = vec![
            "ssh".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            self.connect_timeout_option(),
            "-o".to_string(),
            self.host_keys.ssh_option().to_string(),
            format!("{}@{}", self.user, private_ip),
        ];
        hop.extend(command_or_default(command));
        hop
    }

    fn connect_timeout_option(&self) -> String {
        format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1))
    }
}

fn command_or_default(command: &[String]) -> Vec<String> {
    if command.is_empty() {
        vec![DEFAULT_COMMAND.to_string()]
    } else {
        command.to_vec()
    }
}

/// Runs an external program and returns its stdout
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// A non-zero exit is `CloudError::RemoteExec`; failing to start the program is `Io`
    async fn run(&self, program: &str, args: &[String]) -> Result<String>;
}

/// `CommandRunner` backed by `tokio::process`
pub struct SystemRunner {
    timeout: Duration,
}

impl SystemRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<String> {
        tracing::debug!("Running: {} {}", program, args.join(" "));

        let output = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();
        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| {
                CloudError::RemoteExec(format!(
                    "{} timed out after {}s",
                    program,
                    self.timeout.as_secs()
                ))
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CloudError::RemoteExec(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Runs commands on machines of one environment
pub struct RemoteExecRelay<'a> {
    ctx: &'a CloudContext,
    profile: &'a ConnectionProfile,
    runner: &'a dyn CommandRunner,
}

impl<'a> RemoteExecRelay<'a> {
    pub fn new(
        ctx: &'a CloudContext,
        profile: &'a ConnectionProfile,
        runner: &'a dyn CommandRunner,
    ) -> Self {
        Self {
            ctx,
            profile,
            runner,
        }
    }

    /// Run `command` on a machine with a public address
    pub async fn execute(
        &self,
        machine: &Machine,
        key_name: &str,
        command: &[String],
    ) -> Result<String> {
        let host = machine.public_ip.as_deref().ok_or_else(|| {
            CloudError::RemoteExec(format!("'{}' has no public address", machine.name))
        })?;
        let args = self.profile.ssh_args(host, key_name, command)?;
        self.ctx
            .log()
            .detail(format_args!("[ssh {}]", args.join(" ")));
        self.runner.run("ssh", &args).await
    }

    /// Run `command` on `target` through one ssh hop on `bastion`
    pub async fn relay_through_bastion(
        &self,
        bastion: &Machine,
        target: &Machine,
        key_name: &str,
        command: &[String],
    ) -> Result<String> {
        let private_ip = target.private_ip.as_deref().ok_or_else(|| {
            CloudError::RemoteExec(format!("'{}' has no private address", target.name))
        })?;
        let hop = self.profile.hop_command(private_ip, command);
        self.execute(bastion, key_name, &hop).await
    }

    /// Directly when `target` has a public address, otherwise through the bastion
    pub async fn run(&self, target: &Machine, key_name: &str, command: &[String]) -> Result<String> {
        if target.public_ip.is_some() {
            return self.execute(target, key_name, command).await;
        }

        let bastion = self
            .ctx
            .instances()
            .find(&bastion_name())
            .await?
            .ok_or_else(|| {
                CloudError::ResourceNotFound(format!(
                    "bastion '{}'",
                    self.ctx.qualify(&bastion_name())
                ))
            })?;
        self.relay_through_bastion(&bastion, target, key_name, command)
            .await
    }

    /// Poll until the machine answers a no-op command
    pub async fn wait_until_reachable(&self, machine_id: &str, key_name: &str) -> Result<Machine> {
        let what = format!("instance '{}' to accept ssh", machine_id);
        wait_until(&self.ctx.waits().reachability, &what, || {
            self.check_reachable(machine_id, key_name)
        })
        .await
    }

    async fn check_reachable(
        &self,
        machine_id: &str,
        key_name: &str,
    ) -> Result<Attempt<Machine>> {
        let machine = self.ctx.instances().get(machine_id).await?.ok_or_else(|| {
            CloudError::ResourceNotFound(format!("instance '{}'", machine_id))
        })?;
        if machine.state != InstanceState::Running {
            return Err(CloudError::UnexpectedState {
                resource: "instance",
                id: machine.id,
                state: machine.state.to_string(),
                expected: InstanceState::Running.to_string(),
            });
        }

        match self.run(&machine, key_name, &[]).await {
            Ok(_) => {
                self.ctx
                    .log()
                    .progress(format_args!("'{}' is reachable", machine.name));
                Ok(Attempt::Ready(machine))
            }
            Err(e) if e.is_retryable_in_wait() => Ok(Attempt::Pending(e.to_string())),
            Err(e) => Err(e),
        }
    }
}
