use anyhow::Context;
use ssh2_config::{ParseRule, SshConfig};

use crate::host::Host;

/// One concrete `Host` alias from an OpenSSH client config.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SshConfigItem {
    pub alias: String,
    pub hostname: String,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub identity_file: Option<String>,
}

impl SshConfigItem {
    pub fn into_host(self) -> Host {
        Host {
            user: self.user,
            port: self.port.map(i64::from),
            key_path: self.identity_file,
            description: Some(format!("imported from ssh config ({})", self.alias)),
            ..Host::new(self.alias, self.hostname)
        }
    }
}

/// Reads `~/.ssh/config`.
pub fn retrieve_ssh_configs() -> anyhow::Result<Vec<SshConfigItem>> {
    let config = SshConfig::parse_default_file(ParseRule::ALLOW_UNKNOWN_FIELDS)
        .context("failed to parse ~/.ssh/config")?;
    Ok(collect(&config))
}

fn collect(config: &SshConfig) -> Vec<SshConfigItem> {
    let mut items = Vec::new();
    for host in config.get_hosts() {
        // without a hostname there is nothing to connect to
        let Some(hostname) = host.params.host_name.clone() else {
            continue;
        };
        let identity_file = host
            .params
            .identity_file
            .as_ref()
            .and_then(|files| files.first())
            .map(|path| path.to_string_lossy().into_owned());

        for clause in host.pattern.iter() {
            if clause.negated || is_wildcard(&clause.pattern) {
                continue;
            }
            items.push(SshConfigItem {
                alias: clause.pattern.clone(),
                hostname: hostname.clone(),
                user: host.params.user.clone(),
                port: host.params.port,
                identity_file: identity_file.clone(),
            });
        }
    }
    items
}

fn is_wildcard(pattern: &str) -> bool {
    pattern.contains(['*', '?', '!'])
}
