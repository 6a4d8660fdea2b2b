mod app;
pub mod command;
pub mod db;
pub mod error;
pub mod host;
mod input;
pub mod quick;
pub mod registry;
mod select_box;
pub mod sshconfig;
mod terminal;
pub mod undo;

pub use app::{Action, App, Status};
pub use command::{CommandBuilder, CommandRequest, Environment, SshCommand, SystemEnvironment};
pub use db::{ConfigFile, Settings};
pub use host::Host;
pub use registry::Registry;
pub use sshconfig::*;
pub use terminal::Terminal;
