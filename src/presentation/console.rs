//! Line-oriented console front end: parses typed commands, drives the
//! manager and prints link events.

use crate::domain::commands::{Joint, RobotCommand, SpeedLevel};
use crate::domain::models::{LinkEvent, MessageSeverity, StatusMessage};
use crate::domain::settings::SettingsService;
use crate::infrastructure::link::ConnectionManager;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{error, info};

pub const HELP: &str = "\
Commands:
  connect [ADDRESS]     connect (defaults to the last connected device)
  disconnect            disconnect and stop auto-reconnect
  forward | reverse | stop
  speed up|down|1-3     change climber speed
  joint A-F ANGLE       move an arm joint (0-180)
  send TEXT             send TEXT verbatim
  auto on|off           enable or disable auto-reconnect
  status                show connection status
  devices               list remembered devices
  help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Connect(Option<String>),
    Disconnect,
    Robot(RobotCommand),
    SpeedUp,
    SpeedDown,
    AutoReconnect(bool),
    Status,
    Devices,
    Help,
    Quit,
}

impl FromStr for ConsoleCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        match verb.to_lowercase().as_str() {
            "connect" => Ok(Self::Connect((!rest.is_empty()).then(|| rest.to_string()))),
            "disconnect" => Ok(Self::Disconnect),
            "forward" => Ok(Self::Robot(RobotCommand::Forward)),
            "reverse" => Ok(Self::Robot(RobotCommand::Reverse)),
            "stop" => Ok(Self::Robot(RobotCommand::Stop)),
            "ping" => Ok(Self::Robot(RobotCommand::Ping)),
            "speed" => match rest {
                "up" | "+" => Ok(Self::SpeedUp),
                "down" | "-" => Ok(Self::SpeedDown),
                level => level
                    .parse::<u8>()
                    .ok()
                    .and_then(SpeedLevel::new)
                    .map(|level| Self::Robot(RobotCommand::Speed(level)))
                    .ok_or_else(|| format!("Invalid speed '{}', expected up, down or 1-3", level)),
            },
            "joint" => {
                let mut parts = rest.split_whitespace();
                let joint = parts
                    .next()
                    .and_then(|p| p.chars().next())
                    .and_then(Joint::from_prefix)
                    .ok_or("Expected a joint letter A-F")?;
                let angle = parts
                    .next()
                    .and_then(|a| a.parse::<u16>().ok())
                    .ok_or("Expected an angle 0-180")?;
                Ok(Self::Robot(RobotCommand::joint(joint, angle)))
            }
            "send" if !rest.is_empty() => Ok(Self::Robot(RobotCommand::Raw(rest.to_string()))),
            "send" => Err("Nothing to send".to_string()),
            "auto" => match rest {
                "on" => Ok(Self::AutoReconnect(true)),
                "off" => Ok(Self::AutoReconnect(false)),
                _ => Err("Expected 'auto on' or 'auto off'".to_string()),
            },
            "status" => Ok(Self::Status),
            "devices" => Ok(Self::Devices),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(format!("Unknown command '{}'", other)),
        }
    }
}

pub struct Console {
    manager: ConnectionManager,
    settings: Arc<Mutex<SettingsService>>,
    speed: SpeedLevel,
}

impl Console {
    pub fn new(manager: ConnectionManager, settings: Arc<Mutex<SettingsService>>) -> Self {
        Self {
            manager,
            settings,
            speed: SpeedLevel::default(),
        }
    }

    /// Run one command. Returns `false` when the console should exit.
    pub async fn execute(&mut self, command: ConsoleCommand) -> bool {
        match command {
            ConsoleCommand::Connect(address) => {
                let address = address.or_else(|| {
                    self.settings
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .get()
                        .last_connected_address
                        .clone()
                });
                match address {
                    Some(address) => {
                        self.manager.connect(&address).await;
                    }
                    None => println!("No address given and no remembered device"),
                }
            }
            ConsoleCommand::Disconnect => self.manager.disconnect().await,
            ConsoleCommand::Robot(command) => {
                if let RobotCommand::Speed(level) = command {
                    self.speed = level;
                }
                self.manager.send(&command);
            }
            ConsoleCommand::SpeedUp => self.set_speed(self.speed.increase()),
            ConsoleCommand::SpeedDown => self.set_speed(self.speed.decrease()),
            ConsoleCommand::AutoReconnect(enabled) => {
                self.manager.enable_auto_reconnect(enabled).await
            }
            ConsoleCommand::Status => {
                let status = self.manager.status();
                println!(
                    "State: {:?} | Device: {} | Address: {} | Speed: {}",
                    status.state,
                    if status.device_name.is_empty() {
                        "-"
                    } else {
                        status.device_name.as_str()
                    },
                    status
                        .endpoint
                        .as_ref()
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    self.speed.label()
                );
            }
            ConsoleCommand::Devices => {
                let settings = self.settings.lock().unwrap_or_else(PoisonError::into_inner);
                if settings.get().known_addresses.is_empty() {
                    println!("No remembered devices");
                }
                for address in &settings.get().known_addresses {
                    println!("  {}", address);
                }
            }
            ConsoleCommand::Help => println!("{}", HELP),
            ConsoleCommand::Quit => return false,
        }
        true
    }

    fn set_speed(&mut self, level: SpeedLevel) {
        self.speed = level;
        println!("{}", level.label());
        self.manager.send(&RobotCommand::Speed(level));
    }
}

/// Print every event; remember the endpoint of each successful connection.
pub async fn print_events(
    mut events: mpsc::UnboundedReceiver<LinkEvent>,
    manager: ConnectionManager,
    settings: Arc<Mutex<SettingsService>>,
) {
    while let Some(event) = events.recv().await {
        let status = StatusMessage::from(&event);
        let marker = match status.severity {
            MessageSeverity::Info => "  ",
            MessageSeverity::Success => "OK",
            MessageSeverity::Warning => "!!",
            MessageSeverity::Error => "XX",
        };
        match &event {
            LinkEvent::Message(message) => println!("<< {}", message),
            _ => println!("{} {}", marker, status.message),
        }

        if let LinkEvent::Connected { .. } = event {
            if let Some(endpoint) = manager.status().endpoint {
                let mut settings = settings.lock().unwrap_or_else(PoisonError::into_inner);
                match settings.remember_address(endpoint.address()) {
                    Ok(()) => info!("Remembered device {}", endpoint),
                    Err(e) => error!("Failed to save settings: {}", e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<ConsoleCommand, String> {
        line.parse()
    }

    #[test]
    fn test_parse_connect() {
        assert_eq!(parse("connect"), Ok(ConsoleCommand::Connect(None)));
        assert_eq!(
            parse("  CONNECT aa:bb:cc:dd:ee:ff "),
            Ok(ConsoleCommand::Connect(Some("aa:bb:cc:dd:ee:ff".into())))
        );
    }

    #[test]
    fn test_parse_robot_commands() {
        assert_eq!(parse("forward"), Ok(ConsoleCommand::Robot(RobotCommand::Forward)));
        assert_eq!(
            parse("speed 2"),
            Ok(ConsoleCommand::Robot(RobotCommand::Speed(SpeedLevel::MEDIUM)))
        );
        assert_eq!(parse("speed up"), Ok(ConsoleCommand::SpeedUp));
        assert_eq!(
            parse("joint b 45"),
            Ok(ConsoleCommand::Robot(RobotCommand::joint(Joint::Shoulder, 45)))
        );
        assert_eq!(
            parse("send LED ON*"),
            Ok(ConsoleCommand::Robot(RobotCommand::Raw("LED ON*".into())))
        );
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse("speed 7").is_err());
        assert!(parse("joint z 10").is_err());
        assert!(parse("joint a").is_err());
        assert!(parse("send").is_err());
        assert!(parse("auto maybe").is_err());
        assert!(parse("dance").is_err());
    }

    #[test]
    fn test_parse_switches() {
        assert_eq!(parse("auto off"), Ok(ConsoleCommand::AutoReconnect(false)));
        assert_eq!(parse("exit"), Ok(ConsoleCommand::Quit));
    }
}
