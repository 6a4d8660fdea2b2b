use std::collections::VecDeque;

use crate::host::Host;

pub const UNDO_DEPTH: usize = 50;

/// A recorded registry mutation, holding what is needed to reverse it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UndoEntry {
    Created(String),
    Deleted { previous: Host, index: usize },
    /// `name` is the record's current name, which differs from
    /// `previous.name` when the edit renamed it.
    Edited { name: String, previous: Host },
    Duplicated(String),
    /// Hosts in `rewired` had their bastion pointed from `from` to `to`.
    Renamed {
        from: String,
        to: String,
        rewired: Vec<String>,
    },
}

impl UndoEntry {
    pub fn describe(&self) -> String {
        match self {
            UndoEntry::Created(name) => format!("creation of {name}"),
            UndoEntry::Deleted { previous, .. } => format!("deletion of {}", previous.name),
            UndoEntry::Edited { name, .. } => format!("edit of {name}"),
            UndoEntry::Duplicated(name) => format!("duplicate {name}"),
            UndoEntry::Renamed { from, to, .. } => format!("rename of {from} to {to}"),
        }
    }
}

/// Bounded history; the oldest entry is dropped once full.
#[derive(Debug)]
pub struct UndoStack {
    entries: VecDeque<UndoEntry>,
    depth: usize,
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::with_depth(UNDO_DEPTH)
    }
}

impl UndoStack {
    pub fn with_depth(depth: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(depth.min(UNDO_DEPTH)),
            depth: depth.max(1),
        }
    }

    pub fn push(&mut self, entry: UndoEntry) {
        if self.entries.len() == self.depth {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn pop(&mut self) -> Option<UndoEntry> {
        self.entries.pop_back()
    }

    pub fn peek(&self) -> Option<&UndoEntry> {
        self.entries.back()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
