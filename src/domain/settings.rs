use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Logging options. Missing fields fall back to [`LogSettings::default`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Filter directive: "trace", "debug", "info", "warn", "error" or a full
    /// `EnvFilter` string such as "treebot_link=debug".
    pub level: String,
    pub file_logging_enabled: bool,
    pub console_logging_enabled: bool,
    pub log_dir: String,
    pub file_name_prefix: String,
    pub show_file_line: bool,
    pub show_thread_ids: bool,
    pub show_target: bool,
    pub ansi_colors: bool,
    /// "daily", "hourly", "minutely" or "never"
    pub rotation: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_logging_enabled: false,
            console_logging_enabled: true,
            log_dir: "logs".to_string(),
            file_name_prefix: "treebot_link".to_string(),
            show_file_line: false,
            show_thread_ids: false,
            show_target: true,
            ansi_colors: true,
            rotation: "daily".to_string(),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Link behavior
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    // Keep-alive (0 disables)
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,
    #[serde(default = "default_keepalive_command")]
    pub keepalive_command: String,

    // Remembered devices
    #[serde(default)]
    pub last_connected_address: Option<String>,
    #[serde(default)]
    pub known_addresses: Vec<String>,

    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            connect_timeout_secs: default_connect_timeout_secs(),
            keepalive_interval_secs: default_keepalive_interval_secs(),
            keepalive_command: default_keepalive_command(),
            last_connected_address: None,
            known_addresses: Vec::new(),
            log_settings: LogSettings::default(),
        }
    }
}

fn default_connect_timeout_secs() -> u64 {
    15
}
fn default_keepalive_interval_secs() -> u64 {
    5
}
fn default_keepalive_command() -> String {
    "PING".to_string()
}

impl Settings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    /// `None` when keep-alive is disabled.
    pub fn keepalive_interval(&self) -> Option<Duration> {
        (self.keepalive_interval_secs > 0).then(|| Duration::from_secs(self.keepalive_interval_secs))
    }
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::load_from(settings_path))
    }

    /// Load from an explicit path, falling back to defaults if the file is
    /// missing or unreadable.
    pub fn load_from(settings_path: PathBuf) -> Self {
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();
        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("TreeBotLink");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Record a successful connection and persist it.
    pub fn remember_address(&mut self, address: &str) -> anyhow::Result<()> {
        self.settings.last_connected_address = Some(address.to_string());
        if !self.settings.known_addresses.iter().any(|a| a == address) {
            self.settings.known_addresses.push(address.to_string());
        }
        self.save()
    }
}
