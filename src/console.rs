/// Admin console: one command per line on stdin
use log::{error, info, warn};
use std::io::BufRead;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::error::ConsoleError;
use crate::models::NewUser;
use crate::store::{KeyValueStore, Session};
use crate::users::UserDirectory;
use crate::views::devices::DeviceCommand;

const HELP: &[&str] = &[
    "add-device <id> <position>",
    "remove-device <id>",
    "list-users",
    "add-user <username> <email> <password> [device=<id>] [phone=<number>] [gender=<gender>]",
    "delete-user <id>",
    "sign-out",
    "help",
];

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Device(DeviceCommand),
    ListUsers,
    AddUser(NewUser),
    DeleteUser(String),
    SignOut,
    Help,
}

/// Parse one console line. Blank lines parse to `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>, ConsoleError> {
    let mut words = line.split_whitespace();
    let name = match words.next() {
        Some(name) => name,
        None => return Ok(None),
    };

    let command = match name {
        "add-device" => {
            let id = words.next().ok_or(ConsoleError::Usage(HELP[0]))?;
            let position = words.collect::<Vec<_>>().join(" ");
            if position.is_empty() {
                return Err(ConsoleError::Usage(HELP[0]));
            }
            Command::Device(DeviceCommand::Register {
                id: id.to_string(),
                position,
            })
        }
        "remove-device" => {
            let id = words.next().ok_or(ConsoleError::Usage(HELP[1]))?;
            Command::Device(DeviceCommand::Unregister { id: id.to_string() })
        }
        "list-users" => Command::ListUsers,
        "add-user" => Command::AddUser(parse_new_user(words)?),
        "delete-user" => {
            let id = words.next().ok_or(ConsoleError::Usage(HELP[4]))?;
            Command::DeleteUser(id.to_string())
        }
        "sign-out" => Command::SignOut,
        "help" => Command::Help,
        other => return Err(ConsoleError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

fn parse_new_user<'a>(mut words: impl Iterator<Item = &'a str>) -> Result<NewUser, ConsoleError> {
    let usage = ConsoleError::Usage(HELP[3]);
    let (username, email, password) = match (words.next(), words.next(), words.next()) {
        (Some(username), Some(email), Some(password)) => (username, email, password),
        _ => return Err(usage),
    };

    let mut user = NewUser {
        username: username.to_string(),
        email: email.to_string(),
        password: password.to_string(),
        ..Default::default()
    };
    for option in words {
        match option.split_once('=') {
            Some(("device", value)) => user.device_id = Some(value.to_string()),
            Some(("phone", value)) => user.phone_number = Some(value.to_string()),
            Some(("gender", value)) => user.gender = Some(value.to_string()),
            _ => return Err(usage),
        }
    }
    Ok(user)
}

pub struct Console {
    session: Session,
    store: Arc<dyn KeyValueStore>,
    users: UserDirectory,
    devices: Option<mpsc::UnboundedSender<DeviceCommand>>,
}

impl Console {
    /// `devices` is the device page's command channel, absent when it is not running
    pub fn new(
        session: Session,
        store: Arc<dyn KeyValueStore>,
        users: UserDirectory,
        devices: Option<mpsc::UnboundedSender<DeviceCommand>>,
    ) -> Self {
        Console {
            session,
            store,
            users,
            devices,
        }
    }

    fn require_admin(&self, action: &'static str) -> Result<(), ConsoleError> {
        if self.session.is_admin() {
            Ok(())
        } else {
            Err(ConsoleError::AdminOnly(action))
        }
    }

    pub async fn execute(&self, command: Command) -> Result<(), ConsoleError> {
        match command {
            Command::Device(command) => {
                self.require_admin("manage devices")?;
                let devices = self.devices.as_ref().ok_or(ConsoleError::DevicesClosed)?;
                devices.send(command).map_err(|_| ConsoleError::DevicesClosed)?;
            }
            Command::ListUsers => {
                self.require_admin("list users")?;
                let users = self.users.list().await?;
                info!("{} users", users.len());
                for user in users {
                    info!(
                        "  {} {} <{}> device: {}",
                        user.id,
                        user.username,
                        user.email,
                        user.device_id.as_deref().unwrap_or("-")
                    );
                }
            }
            Command::AddUser(user) => {
                self.require_admin("add users")?;
                self.users.create(user).await?;
            }
            Command::DeleteUser(id) => {
                self.require_admin("delete users")?;
                self.users.delete(&id).await?;
            }
            Command::SignOut => {
                Session::sign_out(self.store.as_ref())?;
                info!("Signed out {}", self.session.display_name());
            }
            Command::Help => {
                for line in HELP {
                    info!("  {}", line);
                }
            }
        }
        Ok(())
    }

    async fn handle_line(&self, line: &str) {
        let result = match parse_command(line) {
            Ok(Some(command)) => self.execute(command).await,
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!("{}", e);
        }
    }

    pub async fn run(self, mut lines: mpsc::Receiver<String>, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                line = lines.recv() => match line {
                    Some(line) => self.handle_line(&line).await,
                    None => break,
                },
                _ = shutdown.changed() => break,
            }
        }
    }
}

/// Forward stdin lines to the console
pub fn read_stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    // Plain thread: a blocked read on it never holds up runtime shutdown
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to read console input: {}", e);
                    break;
                }
            }
        }
    });
    rx
}
