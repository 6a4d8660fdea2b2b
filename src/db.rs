use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    env,
    ffi::OsString,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use crate::error::{LoadError, PersistenceError};
use crate::host::Host;

pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
pub const CONFIG_FILE: &str = "config.toml";
pub const CONFIG_ENV: &str = "SSHDECK_CONFIG";
pub const CONFIG_VERSION: u32 = 1;

const BACKUP_SUFFIX: &str = ".bak";
const CORRUPT_SUFFIX: &str = ".corrupt";

/// Top-level settings stored next to the hosts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub version: u32,
    pub default_key: Option<String>,
    pub ssh_binary: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            default_key: None,
            ssh_binary: None,
        }
    }
}

impl Settings {
    pub fn binary(&self) -> &str {
        self.ssh_binary
            .as_deref()
            .filter(|b| !b.trim().is_empty())
            .unwrap_or("ssh")
    }
}

/// The on-disk shape of the registry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_binary: Option<String>,
    #[serde(default)]
    pub hosts: Vec<Host>,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

impl Document {
    pub fn new(settings: &Settings, hosts: &[Host]) -> Self {
        Self {
            version: settings.version,
            default_key: settings.default_key.clone(),
            ssh_binary: settings.ssh_binary.clone(),
            hosts: hosts.to_vec(),
        }
    }

    pub fn into_parts(self) -> (Settings, Vec<Host>) {
        let settings = Settings {
            version: self.version,
            default_key: self.default_key,
            ssh_binary: self.ssh_binary,
        };
        (settings, self.hosts)
    }

    fn check_structure(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for (index, host) in self.hosts.iter().enumerate() {
            if host.name.trim().is_empty() {
                return Err(format!("host #{} has an empty name", index + 1));
            }
            if !seen.insert(host.name.as_str()) {
                return Err(format!("host name '{}' appears more than once", host.name));
            }
        }
        Ok(())
    }
}

/// The persisted registry file and its siblings.
#[derive(Clone, Debug)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: PathBuf::from(path.as_ref()),
        }
    }

    /// `$SSHDECK_CONFIG`, else `<config dir>/sshdeck/config.toml`.
    pub fn default_location() -> Self {
        if let Some(path) = env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
            return Self::open(path);
        }
        let dir = dirs::config_dir()
            .map(|dir| dir.join(CRATE_NAME))
            .or_else(|| dirs::home_dir().map(|home| home.join(format!(".{CRATE_NAME}"))))
            .unwrap_or_else(|| PathBuf::from(format!(".{CRATE_NAME}")));
        Self::open(dir.join(CONFIG_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        with_suffix(&self.path, BACKUP_SUFFIX)
    }

    pub fn corrupt_path(&self) -> PathBuf {
        with_suffix(&self.path, CORRUPT_SUFFIX)
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Reads and checks the document. `Ok(None)` when the file does not exist.
    /// Never writes.
    pub fn read(&self) -> Result<Option<Document>, LoadError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(LoadError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let document: Document = toml::from_str(&content).map_err(|source| LoadError::Parse {
            path: self.path.clone(),
            source,
        })?;
        document
            .check_structure()
            .map_err(|reason| LoadError::Invalid {
                path: self.path.clone(),
                reason,
            })?;
        Ok(Some(document))
    }

    /// Writes a complete new copy: temp file, synced, previous version copied
    /// to the backup, then the temp file renamed over the primary.
    pub fn write(&self, document: &Document) -> Result<(), PersistenceError> {
        let dir = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| PersistenceError::io("failed to create", dir, e))?;

        let content = toml::to_string_pretty(document)?;
        let temp = self.temp_path(dir);
        if let Err(err) = write_synced(&temp, content.as_bytes()) {
            let _ = fs::remove_file(&temp);
            return Err(err);
        }

        if self.path.exists() {
            let backup = self.backup_path();
            if let Err(e) = fs::copy(&self.path, &backup) {
                let _ = fs::remove_file(&temp);
                return Err(PersistenceError::io("failed to back up to", backup, e));
            }
        }

        fs::rename(&temp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&temp);
            PersistenceError::io("failed to install", &self.path, e)
        })
    }

    /// Copies an unreadable primary aside so a later save cannot rotate it away.
    pub fn preserve_corrupt(&self) -> Result<PathBuf, PersistenceError> {
        let target = self.corrupt_path();
        fs::copy(&self.path, &target)
            .map_err(|e| PersistenceError::io("failed to preserve", &target, e))?;
        Ok(target)
    }

    fn temp_path(&self, dir: &Path) -> PathBuf {
        let name = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(CONFIG_FILE);
        dir.join(format!(".{name}.tmp-{}", std::process::id()))
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    let mut file =
        File::create(path).map_err(|e| PersistenceError::io("failed to create", path, e))?;
    file.write_all(bytes)
        .map_err(|e| PersistenceError::io("failed to write", path, e))?;
    file.sync_all()
        .map_err(|e| PersistenceError::io("failed to sync", path, e))
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> Document {
        Document {
            version: CONFIG_VERSION,
            default_key: Some("agent".into()),
            ssh_binary: None,
            hosts: vec![
                Host {
                    user: Some("deploy".into()),
                    port: Some(2222),
                    tags: ["web".to_string(), "blue".to_string()].into(),
                    options: vec!["-L".into(), "8080:localhost:80".into()],
                    ..Host::new("prod-web", "52.14.33.10")
                },
                Host {
                    bastion: Some("prod-web".into()),
                    description: Some("Staging database".into()),
                    ..Host::new("staging-db", "35.12.2.4")
                },
            ],
        }
    }

    #[test]
    fn writes_and_reads_document() {
        let dir = tempdir().unwrap();
        let file = ConfigFile::open(dir.path().join("config.toml"));
        file.write(&sample()).unwrap();
        assert_eq!(file.read().unwrap(), Some(sample()));
    }

    #[test]
    fn missing_file_reads_as_none_without_creating_it() {
        let dir = tempdir().unwrap();
        let file = ConfigFile::open(dir.path().join("config.toml"));
        assert!(file.read().unwrap().is_none());
        assert!(!file.exists());
    }

    #[test]
    fn second_write_keeps_previous_version_as_backup() {
        let dir = tempdir().unwrap();
        let file = ConfigFile::open(dir.path().join("config.toml"));
        file.write(&Document::default()).unwrap();
        let first = fs::read_to_string(file.path()).unwrap();
        file.write(&sample()).unwrap();

        assert_eq!(fs::read_to_string(file.backup_path()).unwrap(), first);
        assert_eq!(file.read().unwrap(), Some(sample()));
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn corrupt_file_is_reported_and_left_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "hosts = [[[ nope").unwrap();
        let file = ConfigFile::open(&path);
        assert!(matches!(file.read(), Err(LoadError::Parse { .. })));
        assert_eq!(fs::read_to_string(&path).unwrap(), "hosts = [[[ nope");
    }

    #[test]
    fn duplicate_names_are_structurally_invalid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[[hosts]]\nname = \"a\"\nhost = \"1.1.1.1\"\n\n[[hosts]]\nname = \"a\"\nhost = \"2.2.2.2\"\n",
        )
        .unwrap();
        let err = ConfigFile::open(&path).read().unwrap_err();
        assert!(matches!(err, LoadError::Invalid { .. }), "{err}");
    }

    #[test]
    fn out_of_range_port_still_loads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[[hosts]]\nname = \"a\"\nhost = \"1.1.1.1\"\nport = 70000\n").unwrap();
        let document = ConfigFile::open(&path).read().unwrap().unwrap();
        assert_eq!(document.hosts[0].port, Some(70000));
        assert_eq!(document.version, CONFIG_VERSION);
    }

    #[test]
    fn preserves_corrupt_copy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "garbage = ").unwrap();
        let file = ConfigFile::open(&path);
        let kept = file.preserve_corrupt().unwrap();
        assert_eq!(kept, dir.path().join("config.toml.corrupt"));
        assert_eq!(fs::read_to_string(kept).unwrap(), "garbage = ");
    }

    #[test]
    fn binary_defaults_to_ssh() {
        assert_eq!(Settings::default().binary(), "ssh");
        let custom = Settings {
            ssh_binary: Some("/opt/ssh".into()),
            ..Settings::default()
        };
        assert_eq!(custom.binary(), "/opt/ssh");
    }
}
