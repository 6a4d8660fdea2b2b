use crossterm::event::Event;
use unicode_width::UnicodeWidthStr;

use tui_input::{backend::crossterm::EventHandler, Input};

/// What a line of typed text is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptKind {
    Search,
    QuickConnect,
    RemoteCommand,
}

impl PromptKind {
    fn symbol(self) -> &'static str {
        match self {
            PromptKind::Search => "/ ",
            PromptKind::QuickConnect => "ssh ",
            PromptKind::RemoteCommand => "$ ",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            PromptKind::Search => "Search",
            PromptKind::QuickConnect => "Quick connect (user@host or ssh ...)",
            PromptKind::RemoteCommand => "Remote command",
        }
    }
}

/// Single-line editor shown under the host table.
pub(crate) struct InputBuffer {
    input: Input,
    kind: PromptKind,
}

impl InputBuffer {
    pub fn new(kind: PromptKind) -> Self {
        Self {
            input: Input::default(),
            kind,
        }
    }

    pub(crate) fn kind(&self) -> PromptKind {
        self.kind
    }

    pub(crate) fn text(&self) -> &str {
        self.input.value()
    }

    /// The prompt symbol followed by the typed text.
    pub(crate) fn line(&self) -> String {
        format!("{}{}", self.kind.symbol(), self.input.value())
    }

    pub(crate) fn visual_cursor(&self) -> usize {
        UnicodeWidthStr::width(self.kind.symbol()) + self.input.visual_cursor()
    }

    pub(crate) fn handle_event(&mut self, event: &Event) {
        self.input.handle_event(event);
    }
}
