use std::env;
use std::path::PathBuf;
use std::process::Command;

use tracing::{debug, warn};

use crate::db::Settings;
use crate::error::CommandError;
use crate::host::{Host, DEFAULT_PORT};

/// `key_path` / `default_key` value meaning "let the ssh agent authenticate".
pub const AGENT_SENTINEL: &str = "agent";

/// Tried in order when nothing else decides which key to use.
pub const FALLBACK_KEYS: [&str; 2] = ["~/.ssh/id_ed25519", "~/.ssh/id_rsa"];

/// Read-only questions the builder asks about the local machine.
pub trait Environment {
    fn agent_available(&self) -> bool;
    fn key_exists(&self, path: &str) -> bool;
}

/// Answers from the real process environment and filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemEnvironment;

impl Environment for SystemEnvironment {
    fn agent_available(&self) -> bool {
        env::var_os("SSH_AUTH_SOCK")
            .map(|sock| !sock.is_empty())
            .unwrap_or(false)
    }

    fn key_exists(&self, path: &str) -> bool {
        expand_tilde(path).is_file()
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Outcome of the authentication-key precedence chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyChoice {
    /// From the host's `key_path` or the `default_key` setting.
    Configured(String),
    /// First existing entry of [`FALLBACK_KEYS`].
    Fallback(String),
    /// Rely on the ssh agent.
    Agent,
    /// No key flag; ssh falls back to password or its own config.
    Nothing,
}

impl KeyChoice {
    pub fn path(&self) -> Option<&str> {
        match self {
            KeyChoice::Configured(path) | KeyChoice::Fallback(path) => Some(path),
            KeyChoice::Agent | KeyChoice::Nothing => None,
        }
    }
}

/// Decides which identity file, if any, a hop should pass with `-i`.
pub fn resolve_key(
    key_path: Option<&str>,
    default_key: Option<&str>,
    env: &impl Environment,
) -> KeyChoice {
    let configured = key_path
        .filter(|k| !k.trim().is_empty())
        .or(default_key.filter(|k| !k.trim().is_empty()));

    match configured {
        Some(AGENT_SENTINEL) => {
            if !env.agent_available() {
                warn!("key set to agent but no ssh agent detected");
            }
            KeyChoice::Agent
        }
        Some(path) => KeyChoice::Configured(path.to_string()),
        None if env.agent_available() => KeyChoice::Agent,
        None => FALLBACK_KEYS
            .iter()
            .find(|candidate| env.key_exists(candidate))
            .map(|found| KeyChoice::Fallback(found.to_string()))
            .unwrap_or(KeyChoice::Nothing),
    }
}

/// Per-invocation overrides for [`CommandBuilder::build`].
#[derive(Clone, Debug, Default)]
pub struct CommandRequest {
    pub remote_command: Option<String>,
    pub dry_run: bool,
}

/// A fully described ssh invocation. Nothing is executed by building one.
/// Only [`CommandBuilder`] creates these, so `argv` always starts with the binary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SshCommand {
    argv: Vec<String>,
    display: String,
    dry_run: bool,
}

impl SshCommand {
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// The argv quoted for a POSIX shell.
    pub fn display(&self) -> &str {
        &self.display
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }

    /// A `Command` ready for the caller to spawn.
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(self.program());
        cmd.args(self.args());
        cmd
    }
}

enum Hop {
    Jump(String),
    Proxy(String),
}

impl Hop {
    fn flags(self) -> [String; 2] {
        match self {
            Hop::Jump(chain) => ["-J".into(), chain],
            Hop::Proxy(cmd) => ["-o".into(), format!("ProxyCommand={cmd}")],
        }
    }
}

pub struct CommandBuilder<'a, E: Environment> {
    hosts: &'a [Host],
    settings: &'a Settings,
    env: &'a E,
}

impl<'a, E: Environment> CommandBuilder<'a, E> {
    pub fn new(hosts: &'a [Host], settings: &'a Settings, env: &'a E) -> Self {
        Self {
            hosts,
            settings,
            env,
        }
    }

    pub fn build(&self, host: &Host, request: &CommandRequest) -> Result<SshCommand, CommandError> {
        let mut visited = vec![host.name.clone()];
        let hop = match &host.bastion {
            Some(bastion) => Some(self.hop(bastion, &mut visited)?),
            None => None,
        };
        let remote = request
            .remote_command
            .as_deref()
            .or(host.remote_command.as_deref())
            .filter(|cmd| !cmd.trim().is_empty());

        let argv = self.assemble(host, self.key_for(host), hop, false, remote)?;
        let rendered = shell_words::join(&argv);
        debug!(host = %host.name, command = %rendered, "built ssh command");

        Ok(SshCommand {
            argv,
            display: rendered,
            dry_run: request.dry_run,
        })
    }

    fn key_for(&self, host: &Host) -> KeyChoice {
        resolve_key(
            host.key_path.as_deref(),
            self.settings.default_key.as_deref(),
            self.env,
        )
    }

    fn assemble(
        &self,
        host: &Host,
        key: KeyChoice,
        hop: Option<Hop>,
        forward: bool,
        remote: Option<&str>,
    ) -> Result<Vec<String>, CommandError> {
        let mut argv = vec![self.settings.binary().to_string()];

        if let Some(port) = checked_port(host)? {
            argv.push("-p".into());
            argv.push(port.to_string());
        }
        if let Some(path) = key.path() {
            argv.push("-i".into());
            argv.push(path.to_string());
        }
        if let Some(hop) = hop {
            argv.extend(hop.flags());
        }
        argv.extend(host.options.iter().cloned());
        if forward {
            argv.push("-W".into());
            argv.push("%h:%p".into());
        }
        argv.push(host.target());
        if let Some(remote) = remote {
            argv.push(remote.to_string());
        }
        Ok(argv)
    }

    // Describes how to reach `name` as a jump point. Plain hops chain into a
    // single `-J`; a hop needing its own key or options becomes a ProxyCommand.
    fn hop(&self, name: &str, visited: &mut Vec<String>) -> Result<Hop, CommandError> {
        if visited.iter().any(|seen| seen == name) {
            return Err(CommandError::BastionCycle(name.to_string()));
        }
        visited.push(name.to_string());

        let bastion = self
            .hosts
            .iter()
            .find(|h| h.name == name)
            .ok_or_else(|| CommandError::UnresolvedBastion(name.to_string()))?;

        let upstream = match &bastion.bastion {
            Some(next) => Some(self.hop(next, visited)?),
            None => None,
        };
        let key = self.key_for(bastion);

        let plain = key.path().is_none()
            && bastion.options.is_empty()
            && !matches!(upstream, Some(Hop::Proxy(_)));
        if plain {
            let spec = jump_spec(bastion)?;
            return Ok(match upstream {
                Some(Hop::Jump(chain)) => Hop::Jump(format!("{chain},{spec}")),
                _ => Hop::Jump(spec),
            });
        }

        let argv = self.assemble(bastion, key, upstream, true, None)?;
        Ok(Hop::Proxy(shell_words::join(&argv)))
    }
}

fn checked_port(host: &Host) -> Result<Option<u16>, CommandError> {
    match host.port {
        None => Ok(None),
        Some(port) => match u16::try_from(port) {
            Ok(0) | Err(_) => Err(CommandError::InvalidPort(host.name.clone(), port)),
            Ok(DEFAULT_PORT) => Ok(None),
            Ok(port) => Ok(Some(port)),
        },
    }
}

fn jump_spec(host: &Host) -> Result<String, CommandError> {
    let address = if host.address.contains(':') {
        format!("[{}]", host.address)
    } else {
        host.address.clone()
    };
    let mut spec = match &host.user {
        Some(user) => format!("{user}@{address}"),
        None => address,
    };
    if let Some(port) = checked_port(host)? {
        spec.push_str(&format!(":{port}"));
    }
    Ok(spec)
}
