use std::{
    io::{stdout, Stdout},
    ops::{Deref, DerefMut},
};

use crossterm::{
    cursor::Show,
    execute,
    terminal::{
        disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};

use ratatui::{self, backend::CrosstermBackend};

type TerminalBackend = ratatui::Terminal<CrosstermBackend<Stdout>>;

/// Raw-mode alternate screen, restored on drop.
pub struct Terminal {
    inner: TerminalBackend,
    active: bool,
}

impl Terminal {
    pub fn new() -> anyhow::Result<Self> {
        enter()?;
        let backend = CrosstermBackend::new(stdout());
        let inner = ratatui::Terminal::new(backend)?;
        Ok(Self {
            inner,
            active: true,
        })
    }

    /// Hands the real terminal back, e.g. to a child ssh process.
    pub fn suspend(&mut self) -> anyhow::Result<()> {
        if self.active {
            leave()?;
            self.active = false;
        }
        Ok(())
    }

    pub fn resume(&mut self) -> anyhow::Result<()> {
        if !self.active {
            enter()?;
            self.active = true;
            self.inner.clear()?;
        }
        Ok(())
    }
}

impl Deref for Terminal {
    type Target = TerminalBackend;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for Terminal {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        let _ = self.suspend();
    }
}

fn enter() -> anyhow::Result<()> {
    enable_raw_mode()?;
    execute!(stdout(), EnterAlternateScreen, Clear(ClearType::All))?;
    Ok(())
}

fn leave() -> anyhow::Result<()> {
    disable_raw_mode()?;
    execute!(stdout(), LeaveAlternateScreen, Show)?;
    Ok(())
}
