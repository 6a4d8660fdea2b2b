use std::fs::{self, OpenOptions};
use std::sync::Mutex;

use sshdeck::{App, ConfigFile, Registry, Status, Terminal};
use tracing::error;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "SSHDECK_LOG";
const LOG_FILE: &str = "sshdeck.log";

fn init_logging(config: &ConfigFile) -> anyhow::Result<()> {
    let dir = match config.path().parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => std::env::current_dir()?,
    };
    fs::create_dir_all(&dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(LOG_FILE))?;

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let config = ConfigFile::default_location();
    // the TUI owns stdout, so a log file is the only place for diagnostics
    if let Err(err) = init_logging(&config) {
        eprintln!("logging disabled: {err:#}");
    }

    let mut app = match Registry::load(config.clone()) {
        Ok(registry) => App::new(registry),
        Err(err) => {
            error!(error = %err, "starting with an empty registry");
            let mut app = App::new(Registry::empty(config));
            app.set_status(Status::Error(format!(
                "{err} (nothing saved until you change something)"
            )));
            app
        }
    };

    let mut terminal = Terminal::new()?;
    let result = app.run(&mut terminal);

    // drop is needed to cleanup the terminal
    drop(terminal);

    result
}
