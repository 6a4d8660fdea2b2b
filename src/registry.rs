use tracing::{info, warn};

use crate::command::{CommandBuilder, CommandRequest, Environment, SshCommand};
use crate::db::{ConfigFile, Document, Settings};
use crate::error::{CommandError, LoadError, StoreError};
use crate::host::{validate, Host, ValidationWarning};
use crate::quick::{self, QuickMatch};
use crate::undo::{UndoEntry, UndoStack};

/// Result of a quick-connect intent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuickConnect {
    pub name: String,
    pub created: bool,
    pub remote_command: Option<String>,
}

/// Result of importing host aliases from another source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub added: Vec<String>,
    pub skipped: Vec<String>,
}

/// The authoritative host registry and its file.
#[derive(Debug)]
pub struct Registry {
    file: ConfigFile,
    settings: Settings,
    hosts: Vec<Host>,
    undo: UndoStack,
    // The file on disk failed to load; keep a copy before the first save.
    unreadable: bool,
    dirty: bool,
}

impl Registry {
    /// Loads the file, creating an empty one when none exists.
    pub fn load(file: ConfigFile) -> Result<Self, LoadError> {
        let (settings, hosts) = read_or_init(&file)?;
        info!(path = %file.path().display(), hosts = hosts.len(), "registry loaded");
        Ok(Self {
            file,
            settings,
            hosts,
            undo: UndoStack::default(),
            unreadable: false,
            dirty: false,
        })
    }

    /// An empty in-memory registry for when [`Registry::load`] failed.
    /// Nothing is written until a mutation or an explicit [`Registry::save`].
    pub fn empty(file: ConfigFile) -> Self {
        let unreadable = file.exists();
        Self {
            file,
            settings: Settings::default(),
            hosts: Vec::new(),
            undo: UndoStack::default(),
            unreadable,
            dirty: false,
        }
    }

    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    pub fn get(&self, name: &str) -> Option<&Host> {
        self.hosts.iter().find(|h| h.name == name)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn file(&self) -> &ConfigFile {
        &self.file
    }

    /// True when memory holds changes that failed to reach disk.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn create(&mut self, record: Host) -> Result<Vec<ValidationWarning>, StoreError> {
        let warnings = validate(&record, &self.hosts, None)?;
        log_warnings(&record.name, &warnings);
        let name = record.name.clone();
        self.hosts.push(record);
        self.undo.push(UndoEntry::Created(name.clone()));
        info!(host = %name, "host created");
        self.persist()?;
        Ok(warnings)
    }

    pub fn edit(&mut self, name: &str, record: Host) -> Result<Vec<ValidationWarning>, StoreError> {
        let index = self.index_of(name)?;
        let warnings = validate(&record, &self.hosts, Some(name))?;
        log_warnings(&record.name, &warnings);
        let new_name = record.name.clone();
        let previous = std::mem::replace(&mut self.hosts[index], record);
        self.undo.push(UndoEntry::Edited {
            name: new_name.clone(),
            previous,
        });
        info!(host = %name, new_name = %new_name, "host edited");
        self.persist()?;
        Ok(warnings)
    }

    /// Renames a host and repoints every bastion reference to it.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<(), StoreError> {
        let index = self.index_of(from)?;
        let mut renamed = self.hosts[index].clone();
        renamed.name = to.to_string();
        validate(&renamed, &self.hosts, Some(from))?;

        self.hosts[index].name = to.to_string();
        let mut rewired = Vec::new();
        for (i, host) in self.hosts.iter_mut().enumerate() {
            if i != index && host.bastion.as_deref() == Some(from) {
                host.bastion = Some(to.to_string());
                rewired.push(host.name.clone());
            }
        }
        self.undo.push(UndoEntry::Renamed {
            from: from.to_string(),
            to: to.to_string(),
            rewired,
        });
        info!(host = %from, new_name = %to, "host renamed");
        self.persist()?;
        Ok(())
    }

    /// Removes a host. Asking the user for confirmation is the caller's job.
    pub fn delete(&mut self, name: &str) -> Result<(), StoreError> {
        let index = self.index_of(name)?;
        let previous = self.hosts.remove(index);
        self.undo.push(UndoEntry::Deleted { previous, index });
        info!(host = %name, "host deleted");
        self.persist()?;
        Ok(())
    }

    /// Copies a host under `<name>-copy`, `<name>-copy-2`, ...
    pub fn duplicate(&mut self, name: &str) -> Result<String, StoreError> {
        let index = self.index_of(name)?;
        let new_name = quick::unique_name(&format!("{name}-copy"), &self.hosts);
        let mut copy = self.hosts[index].clone();
        copy.name = new_name.clone();
        self.hosts.push(copy);
        self.undo.push(UndoEntry::Duplicated(new_name.clone()));
        info!(host = %name, copy = %new_name, "host duplicated");
        self.persist()?;
        Ok(new_name)
    }

    /// Reverses the most recent change. Undo itself is not recorded.
    pub fn undo(&mut self) -> Result<UndoEntry, StoreError> {
        let entry = self.undo.pop().ok_or(StoreError::EmptyUndoStack)?;
        match &entry {
            UndoEntry::Created(name) | UndoEntry::Duplicated(name) => {
                self.hosts.retain(|h| &h.name != name);
            }
            UndoEntry::Deleted { previous, index } => {
                let index = (*index).min(self.hosts.len());
                self.hosts.insert(index, previous.clone());
            }
            UndoEntry::Edited { name, previous } => {
                match self.hosts.iter().position(|h| &h.name == name) {
                    Some(index) => self.hosts[index] = previous.clone(),
                    None => self.hosts.push(previous.clone()),
                }
            }
            UndoEntry::Renamed { from, to, rewired } => {
                if let Some(host) = self.hosts.iter_mut().find(|h| &h.name == to) {
                    host.name = from.clone();
                }
                for host in self.hosts.iter_mut() {
                    if rewired.contains(&host.name) {
                        host.bastion = Some(from.clone());
                    }
                }
            }
        }
        info!(change = %entry.describe(), "undone");
        self.persist()?;
        Ok(entry)
    }

    /// Replaces memory with the file's contents and forgets undo history.
    /// On error the current registry is kept as it was.
    pub fn reload(&mut self) -> Result<(), LoadError> {
        let (settings, hosts) = read_or_init(&self.file)?;
        self.settings = settings;
        self.hosts = hosts;
        self.undo.clear();
        self.unreadable = false;
        self.dirty = false;
        info!(path = %self.file.path().display(), hosts = self.hosts.len(), "registry reloaded");
        Ok(())
    }

    /// Writes memory to disk. Used to retry after a failed save.
    pub fn save(&mut self) -> Result<(), StoreError> {
        self.persist()
    }

    /// Changes the `default_key` setting. Not recorded for undo.
    pub fn set_default_key(&mut self, key: Option<String>) -> Result<(), StoreError> {
        self.settings.default_key = key.filter(|k| !k.trim().is_empty());
        info!(default_key = ?self.settings.default_key, "default key changed");
        self.persist()
    }

    /// Parses `raw`, reusing a matching host or creating one.
    pub fn quick_connect(&mut self, raw: &str) -> Result<QuickConnect, StoreError> {
        let spec = quick::parse(raw)?;
        let remote_command = spec.remote_command.clone();
        match quick::resolve(spec, &self.hosts) {
            QuickMatch::Existing(name) => Ok(QuickConnect {
                name,
                created: false,
                remote_command,
            }),
            QuickMatch::New(host) => {
                let name = host.name.clone();
                self.create(host)?;
                Ok(QuickConnect {
                    name,
                    created: true,
                    remote_command,
                })
            }
        }
    }

    /// Adds hosts whose names are free; the rest are skipped.
    pub fn import(&mut self, candidates: Vec<Host>) -> Result<ImportSummary, StoreError> {
        let mut summary = ImportSummary::default();
        for host in candidates {
            if validate(&host, &self.hosts, None).is_err() {
                summary.skipped.push(host.name);
                continue;
            }
            let name = host.name.clone();
            self.hosts.push(host);
            self.undo.push(UndoEntry::Created(name.clone()));
            summary.added.push(name);
        }
        if !summary.added.is_empty() {
            info!(added = summary.added.len(), skipped = summary.skipped.len(), "hosts imported");
            self.persist()?;
        }
        Ok(summary)
    }

    /// Describes the ssh command for `name` without running anything.
    pub fn command<E: Environment>(
        &self,
        name: &str,
        request: &CommandRequest,
        env: &E,
    ) -> Result<SshCommand, ConnectError> {
        let host = self
            .get(name)
            .ok_or_else(|| ConnectError::NotFound(name.to_string()))?;
        Ok(CommandBuilder::new(&self.hosts, &self.settings, env).build(host, request)?)
    }

    fn index_of(&self, name: &str) -> Result<usize, StoreError> {
        self.hosts
            .iter()
            .position(|h| h.name == name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        if self.unreadable {
            match self.file.preserve_corrupt() {
                Ok(kept) => info!(path = %kept.display(), "kept unreadable registry file"),
                Err(err) => {
                    self.dirty = true;
                    return Err(err.into());
                }
            }
            self.unreadable = false;
        }
        let document = Document::new(&self.settings, &self.hosts);
        match self.file.write(&document) {
            Ok(()) => {
                self.dirty = false;
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "saving registry failed");
                self.dirty = true;
                Err(err.into())
            }
        }
    }
}

/// Errors from [`Registry::command`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConnectError {
    #[error("no host named '{0}'")]
    NotFound(String),

    #[error(transparent)]
    Command(#[from] CommandError),
}

fn read_or_init(file: &ConfigFile) -> Result<(Settings, Vec<Host>), LoadError> {
    match file.read() {
        Ok(Some(document)) => Ok(document.into_parts()),
        Ok(None) => {
            let settings = Settings::default();
            file.write(&Document::new(&settings, &[]))
                .map_err(|source| LoadError::Init {
                    path: file.path().to_path_buf(),
                    source,
                })?;
            info!(path = %file.path().display(), "created empty registry");
            Ok((settings, Vec::new()))
        }
        Err(err) => {
            warn!(error = %err, "registry file could not be loaded");
            Err(err)
        }
    }
}

fn log_warnings(name: &str, warnings: &[ValidationWarning]) {
    for warning in warnings {
        match warning {
            ValidationWarning::MissingBastion(bastion) => {
                warn!(host = %name, bastion = %bastion, "bastion does not exist yet")
            }
        }
    }
}
