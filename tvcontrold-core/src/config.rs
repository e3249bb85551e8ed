use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::device::DeviceSettings;
use crate::engine::ScriptPaths;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

const SYSTEM_CONFIG: &str = "/etc/tvcontrold/tvcontrold.toml";

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    scripts: ScriptsConfig,
    #[serde(default)]
    devices: DevicesConfig,
}

#[derive(Deserialize, Default)]
struct ServerConfig {
    port: Option<u16>,
    bind: Option<String>,
    client_timeout_secs: Option<u64>,
    max_request_len: Option<usize>,
}

#[derive(Deserialize, Default)]
struct ScriptsConfig {
    system: Option<PathBuf>,
    user: Option<PathBuf>,
}

#[derive(Deserialize, Default)]
struct DevicesConfig {
    port: Option<u16>,
    reconnect_delay_secs: Option<u64>,
}

pub struct DaemonConfig {
    server: ServerConfig,
    scripts: ScriptsConfig,
    devices: DevicesConfig,
}

impl DaemonConfig {
    /// Built-in defaults overlaid with the system file, the user file and
    /// `extra`, in that order.
    pub fn load(extra: Option<&Path>) -> Self {
        let mut config = Self::embedded();
        let system = Some(PathBuf::from(SYSTEM_CONFIG));
        for path in [system, user_config_path(), extra.map(Path::to_path_buf)]
            .into_iter()
            .flatten()
        {
            config.overlay_file(&path, extra == Some(path.as_path()));
        }
        config
    }

    fn embedded() -> Self {
        let base = match toml::from_str::<ConfigFile>(DEFAULT_CONFIG) {
            Ok(base) => base,
            Err(e) => {
                log::error!(target: "config", "embedded config.toml is malformed: {}", e);
                ConfigFile::default()
            }
        };
        Self {
            server: base.server,
            scripts: base.scripts,
            devices: base.devices,
        }
    }

    /// Built-in defaults overlaid with `contents`.
    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        let mut config = Self::embedded();
        config.merge(toml::from_str(contents)?);
        Ok(config)
    }

    fn overlay_file(&mut self, path: &Path, required: bool) {
        if !path.exists() {
            if required {
                log::warn!(target: "config", "config file {} not found", path.display());
            }
            return;
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                Ok(file) => {
                    log::info!(target: "config", "loaded {}", path.display());
                    self.merge(file);
                }
                Err(e) => {
                    log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                }
            },
            Err(e) => {
                log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
            }
        }
    }

    fn merge(&mut self, file: ConfigFile) {
        merge_server(&mut self.server, file.server);
        merge_scripts(&mut self.scripts, file.scripts);
        merge_devices(&mut self.devices, file.devices);
    }

    pub fn port(&self) -> u16 {
        self.server.port.unwrap_or(1423)
    }

    pub fn set_port(&mut self, port: u16) {
        self.server.port = Some(port);
    }

    pub fn bind_address(&self) -> IpAddr {
        let fallback = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        match self.server.bind.as_deref() {
            Some(bind) => bind.parse().unwrap_or_else(|_| {
                log::warn!(target: "config", "invalid bind address \"{}\", using {}", bind, fallback);
                fallback
            }),
            None => fallback,
        }
    }

    /// Idle time after which a TCP client is dropped; `None` never drops.
    pub fn client_timeout(&self) -> Option<Duration> {
        match self.server.client_timeout_secs.unwrap_or(30) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Longest accepted HTTP request head, clamped to 64..=65536.
    pub fn max_request_len(&self) -> usize {
        self.server.max_request_len.unwrap_or(4096).clamp(64, 65_536)
    }

    /// Script files to run at startup. The user script is resolved against
    /// `home` when relative, and dropped when `home` is unknown or
    /// `user_scripts` is false.
    pub fn script_paths(&self, home: Option<&Path>, user_scripts: bool) -> ScriptPaths {
        let system = self
            .scripts
            .system
            .clone()
            .filter(|p| !p.as_os_str().is_empty());
        let user = match (&self.scripts.user, home) {
            _ if !user_scripts => None,
            (Some(p), _) if p.as_os_str().is_empty() => None,
            (Some(p), _) if p.is_absolute() => Some(p.clone()),
            (Some(p), Some(home)) => Some(home.join(p)),
            (Some(p), None) => {
                log::warn!(
                    target: "config",
                    "no home directory, skipping user script {}",
                    p.display()
                );
                None
            }
            (None, _) => None,
        };
        ScriptPaths { system, user }
    }

    pub fn device_settings(&self) -> DeviceSettings {
        let fallback = DeviceSettings::default();
        DeviceSettings {
            default_port: self.devices.port.unwrap_or(fallback.default_port),
            reconnect_delay: self
                .devices
                .reconnect_delay_secs
                .map(Duration::from_secs)
                .unwrap_or(fallback.reconnect_delay),
        }
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tvcontrold").join("config.toml"))
}

fn merge_server(base: &mut ServerConfig, user: ServerConfig) {
    if user.port.is_some() {
        base.port = user.port;
    }
    if user.bind.is_some() {
        base.bind = user.bind;
    }
    if user.client_timeout_secs.is_some() {
        base.client_timeout_secs = user.client_timeout_secs;
    }
    if user.max_request_len.is_some() {
        base.max_request_len = user.max_request_len;
    }
}

fn merge_scripts(base: &mut ScriptsConfig, user: ScriptsConfig) {
    if user.system.is_some() {
        base.system = user.system;
    }
    if user.user.is_some() {
        base.user = user.user;
    }
}

fn merge_devices(base: &mut DevicesConfig, user: DevicesConfig) {
    if user.port.is_some() {
        base.port = user.port;
    }
    if user.reconnect_delay_secs.is_some() {
        base.reconnect_delay_secs = user.reconnect_delay_secs;
    }
}
