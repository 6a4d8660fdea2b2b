use std::net::Ipv6Addr;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::ParseError;
use crate::host::Host;

/// OpenSSH flags that take an argument.
const FLAGS_WITH_VALUE: &str = "BbcDEeFIiJLlmOoPpQRSWw";

/// What a raw quick-connect string asked for, before registry lookup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuickSpec {
    pub address: String,
    pub user: Option<String>,
    pub port: Option<i64>,
    pub key_path: Option<String>,
    /// Raw `-J` value; may name a registry host or be a literal jump spec.
    pub jump: Option<String>,
    pub options: Vec<String>,
    pub remote_command: Option<String>,
}

/// Outcome of matching a [`QuickSpec`] against the registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QuickMatch {
    Existing(String),
    New(Host),
}

fn target_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?:(?P<user>[^@\s]+)@)?(?:\[(?P<v6>[0-9A-Za-z:.%]+)\]|(?P<host>[A-Za-z0-9_.\-]+))(?::(?P<port>\d+))?$",
        )
        .expect("target pattern is valid")
    })
}

/// Splits `user@host[:port]`. `None` when the token is not target-shaped.
/// A bare IPv6 address is taken whole and carries no port.
fn split_target(token: &str) -> Option<Result<(Option<String>, String, Option<i64>), ParseError>> {
    if let Some((user, address)) = split_bare_ipv6(token) {
        return Some(Ok((user, address, None)));
    }
    let caps = target_pattern().captures(token)?;
    let user = caps.name("user").map(|m| m.as_str().to_string());
    let address = caps
        .name("v6")
        .or_else(|| caps.name("host"))
        .map(|m| m.as_str().to_string())?;
    let port = match caps.name("port") {
        Some(raw) => match parse_port(raw.as_str()) {
            Ok(port) => Some(port),
            Err(err) => return Some(Err(err)),
        },
        None => None,
    };
    Some(Ok((user, address, port)))
}

fn split_bare_ipv6(token: &str) -> Option<(Option<String>, String)> {
    let (user, address) = match token.rsplit_once('@') {
        Some((user, address)) if !user.is_empty() => (Some(user.to_string()), address),
        Some(_) => return None,
        None => (None, token),
    };
    // the zone suffix (`%eth0`) is not part of the address syntax
    let without_zone = address.split('%').next().unwrap_or(address);
    without_zone
        .parse::<Ipv6Addr>()
        .ok()
        .map(|_| (user, address.to_string()))
}

fn parse_port(raw: &str) -> Result<i64, ParseError> {
    match raw.parse::<u16>() {
        Ok(port) if port != 0 => Ok(port as i64),
        _ => Err(ParseError::InvalidPort(raw.to_string())),
    }
}

/// Parses `user@host`, `user@host:port` or a full `ssh ...` invocation.
pub fn parse(input: &str) -> Result<QuickSpec, ParseError> {
    if input.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    let tokens = shell_words::split(input).map_err(|e| ParseError::Tokenize(e.to_string()))?;
    let mut tokens = tokens.into_iter().peekable();
    if tokens
        .peek()
        .map(|first| first == "ssh" || first.ends_with("/ssh"))
        .unwrap_or(false)
    {
        tokens.next();
    }

    let mut spec = QuickSpec::default();
    let mut login: Option<String> = None;
    let mut flag_port: Option<i64> = None;
    let mut target_port: Option<i64> = None;
    let mut found_target = false;
    let mut remote = Vec::new();

    while let Some(token) = tokens.next() {
        if token == "--" {
            continue;
        }
        if token.len() > 1 && token.starts_with('-') {
            // flags may be bundled (`-Ap 2222`); the first one that takes a
            // value consumes the rest of the token or the next token
            let body = &token[1..];
            let mut bundle = String::new();
            for (at, flag) in body.char_indices() {
                if !FLAGS_WITH_VALUE.contains(flag) {
                    bundle.push(flag);
                    continue;
                }
                let attached = &body[at + flag.len_utf8()..];
                let value = if attached.is_empty() {
                    tokens
                        .next()
                        .ok_or_else(|| ParseError::MissingValue(format!("-{flag}")))?
                } else {
                    attached.to_string()
                };
                if !bundle.is_empty() {
                    spec.options.push(format!("-{}", std::mem::take(&mut bundle)));
                }
                match flag {
                    'p' => flag_port = Some(parse_port(&value)?),
                    'i' => spec.key_path = Some(value),
                    'J' => spec.jump = Some(value),
                    'l' => login = Some(value),
                    _ => {
                        spec.options.push(format!("-{flag}"));
                        spec.options.push(value);
                    }
                }
                break;
            }
            if !bundle.is_empty() {
                spec.options.push(format!("-{bundle}"));
            }
            continue;
        }

        if found_target {
            remote.push(token);
            remote.extend(tokens.by_ref());
            break;
        }
        match split_target(&token) {
            Some(parsed) => {
                let (user, address, port) = parsed?;
                spec.user = user;
                spec.address = address;
                target_port = port;
                found_target = true;
            }
            None => return Err(ParseError::MissingHost),
        }
    }

    if !found_target {
        return Err(ParseError::MissingHost);
    }
    spec.user = login.or(spec.user);
    spec.port = flag_port.or(target_port);
    if !remote.is_empty() {
        spec.remote_command = Some(remote.join(" "));
    }
    Ok(spec)
}

/// Reuses a host with the same address, user and port, or builds a new
/// record with a name that does not collide.
pub fn resolve(spec: QuickSpec, hosts: &[Host]) -> QuickMatch {
    let port = spec.port.unwrap_or(crate::host::DEFAULT_PORT as i64);
    if let Some(existing) = hosts.iter().find(|h| {
        h.address == spec.address && h.user == spec.user && h.effective_port() == port
    }) {
        return QuickMatch::Existing(existing.name.clone());
    }

    let mut options = Vec::new();
    let bastion = match spec.jump {
        Some(jump) => match find_jump_host(&jump, hosts) {
            Some(name) => Some(name),
            None => {
                options.push("-J".to_string());
                options.push(jump);
                None
            }
        },
        None => None,
    };
    options.extend(spec.options);

    let base = match &spec.user {
        Some(user) if hosts.iter().any(|h| h.name == spec.address) => {
            format!("{user}@{}", spec.address)
        }
        _ => spec.address.clone(),
    };

    QuickMatch::New(Host {
        name: unique_name(&base, hosts),
        address: spec.address,
        user: spec.user,
        port: spec.port,
        key_path: spec.key_path,
        bastion,
        options,
        remote_command: spec.remote_command,
        ..Host::default()
    })
}

fn find_jump_host(jump: &str, hosts: &[Host]) -> Option<String> {
    if let Some(host) = hosts.iter().find(|h| h.name == jump) {
        return Some(host.name.clone());
    }
    let (user, address, port) = split_target(jump)?.ok()?;
    let port = port.unwrap_or(crate::host::DEFAULT_PORT as i64);
    hosts
        .iter()
        .find(|h| {
            h.address == address
                && h.effective_port() == port
                && (user.is_none() || h.user == user)
        })
        .map(|h| h.name.clone())
}

/// `base`, or `base-2`, `base-3`, ... whichever is free first.
pub fn unique_name(base: &str, hosts: &[Host]) -> String {
    let taken = |name: &str| hosts.iter().any(|h| h.name == name);
    if !taken(base) {
        return base.to_string();
    }
    (2..)
        .map(|i| format!("{base}-{i}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_user_at_host() {
        let spec = parse("alice@db1.internal").unwrap();
        assert_eq!(spec.user.as_deref(), Some("alice"));
        assert_eq!(spec.address, "db1.internal");
        assert_eq!(spec.port, None);
        assert_eq!(spec.remote_command, None);
    }

    #[test]
    fn parses_full_ssh_invocation() {
        let spec = parse("ssh -p 2222 -i /keys/id_ed25519 bob@10.0.0.5 uptime").unwrap();
        assert_eq!(spec.port, Some(2222));
        assert_eq!(spec.key_path.as_deref(), Some("/keys/id_ed25519"));
        assert_eq!(spec.user.as_deref(), Some("bob"));
        assert_eq!(spec.address, "10.0.0.5");
        assert_eq!(spec.remote_command.as_deref(), Some("uptime"));
    }

    #[test]
    fn parses_port_suffix_and_ipv6() {
        let spec = parse("root@example.com:2200").unwrap();
        assert_eq!(spec.port, Some(2200));
        let spec = parse("admin@[fd00::1]:2222").unwrap();
        assert_eq!(spec.address, "fd00::1");
        assert_eq!(spec.port, Some(2222));
    }

    #[test]
    fn parses_bare_ipv6_targets() {
        let spec = parse("alice@fd00::1").unwrap();
        assert_eq!(spec.user.as_deref(), Some("alice"));
        assert_eq!(spec.address, "fd00::1");
        assert_eq!(spec.port, None);

        let spec = parse("ssh -p 2200 fe80::1%eth0 uptime").unwrap();
        assert_eq!(spec.address, "fe80::1%eth0");
        assert_eq!(spec.port, Some(2200));
        assert_eq!(spec.remote_command.as_deref(), Some("uptime"));
    }

    #[test]
    fn bundled_flags_take_their_value() {
        let spec = parse("ssh -Ap 2222 web").unwrap();
        assert_eq!(spec.port, Some(2222));
        assert_eq!(spec.options, vec!["-A"]);
        assert_eq!(spec.address, "web");
        assert_eq!(spec.remote_command, None);

        let spec = parse("ssh -vi /k web").unwrap();
        assert_eq!(spec.key_path.as_deref(), Some("/k"));
        assert_eq!(spec.options, vec!["-v"]);
        assert_eq!(spec.address, "web");

        let spec = parse("ssh -tp2022 web").unwrap();
        assert_eq!(spec.port, Some(2022));
        assert_eq!(spec.options, vec!["-t"]);

        let spec = parse("ssh -AvL 8080:localhost:80 web").unwrap();
        assert_eq!(spec.options, vec!["-Av", "-L", "8080:localhost:80"]);
    }

    #[test]
    fn collects_options_in_order() {
        let spec = parse("ssh -A -o StrictHostKeyChecking=no -L 8080:localhost:80 -v web").unwrap();
        assert_eq!(
            spec.options,
            vec![
                "-A",
                "-o",
                "StrictHostKeyChecking=no",
                "-L",
                "8080:localhost:80",
                "-v"
            ]
        );
        assert_eq!(spec.address, "web");
    }

    #[test]
    fn options_after_target_are_still_flags() {
        let spec = parse("web -p 2022 -t htop").unwrap();
        assert_eq!(spec.port, Some(2022));
        assert_eq!(spec.options, vec!["-t"]);
        assert_eq!(spec.remote_command.as_deref(), Some("htop"));
    }

    #[test]
    fn quoted_remote_command_and_later_targets_fold_into_tail() {
        let spec = parse(r#"ops@gw "tail -f /var/log/syslog" other@host"#).unwrap();
        assert_eq!(spec.address, "gw");
        assert_eq!(
            spec.remote_command.as_deref(),
            Some("tail -f /var/log/syslog other@host")
        );
    }

    #[test]
    fn login_flag_and_jump() {
        let spec = parse("ssh -l carol -J jump web").unwrap();
        assert_eq!(spec.user.as_deref(), Some("carol"));
        assert_eq!(spec.jump.as_deref(), Some("jump"));
    }

    #[test]
    fn reports_malformed_input() {
        assert_eq!(parse("   "), Err(ParseError::Empty));
        assert_eq!(parse("ssh"), Err(ParseError::MissingHost));
        assert_eq!(parse("ssh -v"), Err(ParseError::MissingHost));
        assert_eq!(parse("ssh -p"), Err(ParseError::MissingValue("-p".into())));
        assert_eq!(
            parse("ssh -p 99999 web"),
            Err(ParseError::InvalidPort("99999".into()))
        );
        assert_eq!(
            parse("ssh -p abc web"),
            Err(ParseError::InvalidPort("abc".into()))
        );
        assert!(matches!(parse("ssh 'web"), Err(ParseError::Tokenize(_))));
    }

    #[test]
    fn new_host_named_after_address() {
        let spec = parse("alice@db1.internal").unwrap();
        match resolve(spec, &[]) {
            QuickMatch::New(host) => {
                assert_eq!(host.name, "db1.internal");
                assert_eq!(host.user.as_deref(), Some("alice"));
                assert_eq!(host.port, None);
            }
            other => panic!("expected new host, got {other:?}"),
        }
    }

    #[test]
    fn reuses_host_on_address_user_port() {
        let hosts = vec![Host {
            user: Some("alice".into()),
            port: Some(22),
            ..Host::new("db", "db1.internal")
        }];
        let spec = parse("alice@db1.internal").unwrap();
        assert_eq!(resolve(spec, &hosts), QuickMatch::Existing("db".into()));

        let other_port = parse("alice@db1.internal:2222").unwrap();
        assert!(matches!(resolve(other_port, &hosts), QuickMatch::New(_)));
    }

    #[test]
    fn colliding_name_falls_back_to_user_at_host() {
        let hosts = vec![Host {
            user: Some("root".into()),
            ..Host::new("db1.internal", "db1.internal")
        }];
        let spec = parse("alice@db1.internal").unwrap();
        match resolve(spec, &hosts) {
            QuickMatch::New(host) => assert_eq!(host.name, "alice@db1.internal"),
            other => panic!("expected new host, got {other:?}"),
        }
    }

    #[test]
    fn jump_resolves_to_registry_host_or_passes_through() {
        let hosts = vec![Host {
            user: Some("ops".into()),
            ..Host::new("jump-eu", "52.17.9.3")
        }];
        let known = parse("ssh -J ops@52.17.9.3 web").unwrap();
        match resolve(known, &hosts) {
            QuickMatch::New(host) => {
                assert_eq!(host.bastion.as_deref(), Some("jump-eu"));
                assert!(host.options.is_empty());
            }
            other => panic!("expected new host, got {other:?}"),
        }

        let unknown = parse("ssh -J gw.example.com -A web").unwrap();
        match resolve(unknown, &hosts) {
            QuickMatch::New(host) => {
                assert_eq!(host.bastion, None);
                assert_eq!(host.options, vec!["-J", "gw.example.com", "-A"]);
            }
            other => panic!("expected new host, got {other:?}"),
        }
    }

    #[test]
    fn unique_name_counts_from_two() {
        let hosts = vec![Host::new("web", "a"), Host::new("web-2", "b")];
        assert_eq!(unique_name("web", &hosts), "web-3");
        assert_eq!(unique_name("db", &hosts), "db");
    }
}
