use std::process::ExitStatus;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::prelude::*;
use ratatui::widgets::*;
use tracing::{info, warn};

use crate::command::{CommandRequest, Environment, SshCommand, SystemEnvironment};
use crate::error::StoreError;
use crate::input::{InputBuffer, PromptKind};
use crate::registry::Registry;
use crate::select_box::SelectBox;
use crate::sshconfig::{retrieve_ssh_configs, SshConfigItem};
use crate::terminal::Terminal;

const HELP_BROWSE: &str = "(Enter) connect | (c) command | (g) quick | (/) search | (y) dup | (d) delete | (u) undo | (r) reload | (s) save | (i) import | (D) dry-run | (q) quit";
const HELP_PROMPT: &str = "(Esc) cancel | (Enter) confirm";
const HELP_CONFIRM: &str = "(y) delete | any other key to keep";

/// What the event loop should do after a key press.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Quit,
    Launch(SshCommand),
}

/// One-line feedback shown under the table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    Info(String),
    Warn(String),
    Error(String),
}

impl Status {
    pub fn text(&self) -> &str {
        match self {
            Status::Info(text) | Status::Warn(text) | Status::Error(text) => text,
        }
    }

    fn style(&self) -> Style {
        match self {
            Status::Info(_) => Style::default().fg(Color::Green),
            Status::Warn(_) => Style::default().fg(Color::Yellow),
            Status::Error(_) => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        }
    }
}

enum Mode {
    Browse,
    Prompt(InputBuffer),
    ConfirmDelete(String),
}

/// Turns key presses into registry intents and ssh launches.
pub struct App<E: Environment = SystemEnvironment> {
    registry: Registry,
    env: E,
    table: SelectBox,
    mode: Mode,
    status: Option<Status>,
    dry_run: bool,
}

impl App<SystemEnvironment> {
    pub fn new(registry: Registry) -> Self {
        Self::with_env(registry, SystemEnvironment)
    }
}

impl<E: Environment> App<E> {
    pub fn with_env(registry: Registry, env: E) -> Self {
        let mut table = SelectBox::new();
        table.refresh(registry.hosts(), "");
        Self {
            registry,
            env,
            table,
            mode: Mode::Browse,
            status: None,
            dry_run: false,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }

    pub fn set_status(&mut self, status: Status) {
        self.status = Some(status);
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn run(&mut self, terminal: &mut Terminal) -> anyhow::Result<()> {
        loop {
            terminal.draw(|frame| self.render(frame))?;
            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match self.on_key(key) {
                Some(Action::Quit) => break,
                Some(Action::Launch(cmd)) => {
                    terminal.suspend()?;
                    let outcome = launch(&cmd);
                    terminal.resume()?;
                    self.report_launch(&cmd, outcome);
                }
                None => {}
            }
        }
        Ok(())
    }

    pub fn on_key(&mut self, key: KeyEvent) -> Option<Action> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Some(Action::Quit);
        }
        match std::mem::replace(&mut self.mode, Mode::Browse) {
            Mode::Browse => self.on_browse_key(key),
            Mode::Prompt(buffer) => self.on_prompt_key(buffer, key),
            Mode::ConfirmDelete(name) => {
                self.on_confirm_key(name, key);
                None
            }
        }
    }

    fn on_browse_key(&mut self, key: KeyEvent) -> Option<Action> {
        match key.code {
            KeyCode::Char('q') => return Some(Action::Quit),
            KeyCode::Esc if self.table.pattern().is_empty() => return Some(Action::Quit),
            KeyCode::Esc => self.refresh(""),
            KeyCode::Up | KeyCode::Char('k') => self.table.up(),
            KeyCode::Down | KeyCode::Char('j') => self.table.down(),
            KeyCode::Enter => {
                let name = self.selected_name()?;
                return self.connect(&name, None);
            }
            KeyCode::Char('/') => self.prompt(PromptKind::Search),
            KeyCode::Char('g') => self.prompt(PromptKind::QuickConnect),
            KeyCode::Char('c') => {
                if self.selected_name().is_some() {
                    self.prompt(PromptKind::RemoteCommand);
                }
            }
            KeyCode::Char('y') => {
                let name = self.selected_name()?;
                let result = self.registry.duplicate(&name);
                if let Some(copy) = self.apply(result) {
                    self.table.select_name(self.registry.hosts(), &copy);
                    self.status = Some(Status::Info(format!("Duplicated {name} as {copy}")));
                }
            }
            KeyCode::Char('d') => {
                let name = self.selected_name()?;
                self.mode = Mode::ConfirmDelete(name);
            }
            KeyCode::Char('u') => {
                let result = self.registry.undo();
                if let Some(entry) = self.apply(result) {
                    self.status = Some(Status::Info(format!("Undid {}", entry.describe())));
                }
            }
            KeyCode::Char('r') => match self.registry.reload() {
                Ok(()) => {
                    self.refresh_current();
                    self.status = Some(Status::Info(format!(
                        "Reloaded {} hosts",
                        self.registry.hosts().len()
                    )));
                }
                Err(err) => self.status = Some(Status::Error(err.to_string())),
            },
            KeyCode::Char('s') => {
                let result = self.registry.save();
                if self.apply(result).is_some() {
                    self.status = Some(Status::Info(format!(
                        "Saved to {}",
                        self.registry.file().path().display()
                    )));
                }
            }
            KeyCode::Char('i') => self.import(),
            KeyCode::Char('D') => {
                self.dry_run = !self.dry_run;
                let state = if self.dry_run { "on" } else { "off" };
                self.status = Some(Status::Info(format!("Dry-run {state}")));
            }
            _ => {}
        }
        None
    }

    fn on_prompt_key(&mut self, mut buffer: InputBuffer, key: KeyEvent) -> Option<Action> {
        match key.code {
            KeyCode::Esc => {
                if buffer.kind() == PromptKind::Search {
                    self.refresh("");
                }
                None
            }
            KeyCode::Enter => self.submit(buffer),
            _ => {
                buffer.handle_event(&Event::Key(key));
                if buffer.kind() == PromptKind::Search {
                    self.table.refresh(self.registry.hosts(), buffer.text());
                }
                self.mode = Mode::Prompt(buffer);
                None
            }
        }
    }

    fn on_confirm_key(&mut self, name: String, key: KeyEvent) {
        if !matches!(key.code, KeyCode::Char('y') | KeyCode::Char('Y')) {
            self.status = Some(Status::Info(format!("Kept {name}")));
            return;
        }
        let result = self.registry.delete(&name);
        if self.apply(result).is_some() {
            self.status = Some(Status::Info(format!("Deleted {name} (u to undo)")));
        }
    }

    fn submit(&mut self, buffer: InputBuffer) -> Option<Action> {
        let text = buffer.text().trim().to_string();
        match buffer.kind() {
            PromptKind::Search => None,
            PromptKind::RemoteCommand => {
                let name = self.selected_name()?;
                let remote = Some(text).filter(|t| !t.is_empty());
                self.connect(&name, remote)
            }
            PromptKind::QuickConnect => {
                let result = self.registry.quick_connect(&text);
                let quick = self.apply(result)?;
                self.table.select_name(self.registry.hosts(), &quick.name);
                if quick.created {
                    info!(host = %quick.name, "quick connect added host");
                }
                let action = self.connect(&quick.name, quick.remote_command);
                if quick.created && self.status.is_none() {
                    self.status = Some(Status::Info(format!("Added {}", quick.name)));
                }
                action
            }
        }
    }

    fn connect(&mut self, name: &str, remote_command: Option<String>) -> Option<Action> {
        let request = CommandRequest {
            remote_command,
            dry_run: self.dry_run,
        };
        match self.registry.command(name, &request, &self.env) {
            Ok(cmd) if self.dry_run => {
                info!(host = %name, command = %cmd.display(), "dry run");
                self.status = Some(Status::Info(format!("Dry-run: {}", cmd.display())));
                None
            }
            Ok(cmd) => {
                self.status = None;
                Some(Action::Launch(cmd))
            }
            Err(err) => {
                self.status = Some(Status::Error(err.to_string()));
                None
            }
        }
    }

    fn import(&mut self) {
        let items = match retrieve_ssh_configs() {
            Ok(items) => items,
            Err(err) => {
                self.status = Some(Status::Error(format!("{err:#}")));
                return;
            }
        };
        let hosts = items.into_iter().map(SshConfigItem::into_host).collect();
        let result = self.registry.import(hosts);
        if let Some(summary) = self.apply(result) {
            self.status = Some(Status::Info(format!(
                "Imported {} hosts, skipped {}",
                summary.added.len(),
                summary.skipped.len()
            )));
        }
    }

    /// Refreshes the table after a mutation and turns errors into status.
    fn apply<T>(&mut self, result: Result<T, StoreError>) -> Option<T> {
        self.refresh_current();
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                let text = if self.registry.is_dirty() {
                    format!("{err} (changes kept in memory, s to retry)")
                } else {
                    err.to_string()
                };
                self.status = Some(Status::Error(text));
                None
            }
        }
    }

    fn report_launch(&mut self, cmd: &SshCommand, outcome: std::io::Result<ExitStatus>) {
        self.status = match outcome {
            Ok(status) if status.success() => {
                Some(Status::Info(format!("Closed: {}", cmd.display())))
            }
            Ok(status) => {
                warn!(command = %cmd.display(), %status, "ssh exited with failure");
                Some(Status::Warn(format!("ssh exited with {status}")))
            }
            Err(err) => {
                warn!(command = %cmd.display(), error = %err, "failed to start ssh");
                Some(Status::Error(format!("failed to start {}: {err}", cmd.program())))
            }
        };
    }

    fn prompt(&mut self, kind: PromptKind) {
        self.mode = Mode::Prompt(InputBuffer::new(kind));
    }

    fn selected_name(&self) -> Option<String> {
        self.table
            .selected(self.registry.hosts())
            .map(|host| host.name.clone())
    }

    fn refresh(&mut self, pattern: &str) {
        self.table.refresh(self.registry.hosts(), pattern);
    }

    fn refresh_current(&mut self) {
        let pattern = self.table.pattern().to_string();
        self.refresh(&pattern);
    }

    fn render(&mut self, f: &mut Frame) {
        let prompt_height = if matches!(self.mode, Mode::Prompt(_)) { 3 } else { 0 };
        let recs = Layout::vertical([
            Constraint::Min(3),
            Constraint::Length(prompt_height),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(f.size());

        self.table.render(f, recs[0], self.registry.hosts());

        let help = match &self.mode {
            Mode::Browse => HELP_BROWSE,
            Mode::Prompt(_) => HELP_PROMPT,
            Mode::ConfirmDelete(_) => HELP_CONFIRM,
        };

        if let Mode::Prompt(buffer) = &self.mode {
            let input = Paragraph::new(
                Text::from(buffer.line()).style(Style::default().fg(Color::Cyan)),
            )
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(buffer.kind().title()),
            );
            f.render_widget(input, recs[1]);
            f.set_cursor(recs[1].x + 1 + buffer.visual_cursor() as u16, recs[1].y + 1);
        }

        let mut status = match (&self.mode, &self.status) {
            (Mode::ConfirmDelete(name), _) => Line::from(Span::styled(
                format!("Delete {name}?"),
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )),
            (_, Some(status)) => {
                Line::from(Span::styled(status.text().to_string(), status.style()))
            }
            (_, None) => Line::default(),
        };
        if self.dry_run {
            status.spans.insert(0, Span::styled("[dry-run] ", Style::default().fg(Color::Magenta)));
        }
        if self.registry.is_dirty() {
            status.spans.insert(0, Span::styled("[unsaved] ", Style::default().fg(Color::Red)));
        }
        f.render_widget(Paragraph::new(status), recs[2]);
        f.render_widget(
            Paragraph::new(Line::from(help)).style(Style::default().fg(Color::DarkGray)).centered(),
            recs[3],
        );
    }
}

/// Runs ssh in the foreground with the real terminal attached.
fn launch(cmd: &SshCommand) -> std::io::Result<ExitStatus> {
    info!(command = %cmd.display(), "launching");
    cmd.to_command().status()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ConfigFile;
    use crate::host::Host;

    struct Agent;

    impl Environment for Agent {
        fn agent_available(&self) -> bool {
            true
        }

        fn key_exists(&self, _path: &str) -> bool {
            false
        }
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn typed(app: &mut App<Agent>, text: &str) {
        for c in text.chars() {
            assert_eq!(app.on_key(press(KeyCode::Char(c))), None);
        }
    }

    fn app(dir: &tempfile::TempDir) -> App<Agent> {
        let mut registry =
            Registry::load(ConfigFile::open(dir.path().join("config.toml"))).unwrap();
        registry
            .create(Host {
                user: Some("deploy".into()),
                ..Host::new("prod-web", "52.14.33.10")
            })
            .unwrap();
        registry.create(Host::new("staging-db", "35.12.2.4")).unwrap();
        App::with_env(registry, Agent)
    }

    #[test]
    fn enter_launches_selected_host() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(&dir);
        match app.on_key(press(KeyCode::Enter)) {
            Some(Action::Launch(cmd)) => assert_eq!(cmd.argv(), vec!["ssh", "deploy@52.14.33.10"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn dry_run_reports_instead_of_launching() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(&dir);
        app.on_key(press(KeyCode::Char('D')));
        assert!(app.dry_run());
        app.on_key(press(KeyCode::Down));
        assert_eq!(app.on_key(press(KeyCode::Enter)), None);
        assert_eq!(app.status(), Some(&Status::Info("Dry-run: ssh 35.12.2.4".into())));
    }

    #[test]
    fn delete_waits_for_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(&dir);
        app.on_key(press(KeyCode::Char('d')));
        app.on_key(press(KeyCode::Char('n')));
        assert_eq!(app.registry().hosts().len(), 2);

        app.on_key(press(KeyCode::Char('d')));
        app.on_key(press(KeyCode::Char('y')));
        assert!(app.registry().get("prod-web").is_none());

        app.on_key(press(KeyCode::Char('u')));
        assert_eq!(app.registry().hosts()[0].name, "prod-web");
    }

    #[test]
    fn quick_connect_adds_host_and_launches() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(&dir);
        app.on_key(press(KeyCode::Char('g')));
        typed(&mut app, "bob@10.0.0.9 -p 2222");
        match app.on_key(press(KeyCode::Enter)) {
            Some(Action::Launch(cmd)) => {
                assert_eq!(cmd.argv(), vec!["ssh", "-p", "2222", "bob@10.0.0.9"])
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(app.registry().get("10.0.0.9").is_some());
    }

    #[test]
    fn search_narrows_and_escape_clears() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(&dir);
        app.on_key(press(KeyCode::Char('/')));
        typed(&mut app, "stag");
        app.on_key(press(KeyCode::Enter));
        assert_eq!(app.selected_name().as_deref(), Some("staging-db"));
        assert_eq!(app.table.len(), 1);

        // first Esc clears the filter, the second quits
        assert_eq!(app.on_key(press(KeyCode::Esc)), None);
        assert_eq!(app.table.len(), 2);
        assert_eq!(app.on_key(press(KeyCode::Esc)), Some(Action::Quit));
    }

    #[test]
    fn remote_command_prompt_is_appended() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(&dir);
        app.on_key(press(KeyCode::Char('c')));
        typed(&mut app, "uptime");
        match app.on_key(press(KeyCode::Enter)) {
            Some(Action::Launch(cmd)) => {
                assert_eq!(cmd.argv(), vec!["ssh", "deploy@52.14.33.10", "uptime"])
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
