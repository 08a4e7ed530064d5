use crate::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Built-in configuration, shipped with the daemon.
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../../configs/softap.toml");

/// 顶层应用配置
#[derive(Debug, Clone)]
pub struct SoftapConfig {
    pub supplicant: SupplicantConfig,
    pub notifier: NotifierConfig,
}

/// wpa_supplicant 相关的运行时配置
#[derive(Debug, Clone)]
pub struct SupplicantConfig {
    pub interface_name: String,
    pub ctrl_dir: PathBuf,

    // === STA 配置文件的备份/恢复 ===
    pub live_config_path: PathBuf,
    pub backup_config_path: PathBuf,
    pub config_owner_uid: u32,
    pub config_owner_gid: u32,

    // === 外部进程控制 ===
    pub start_command: Vec<String>,
    pub stop_command: Vec<String>,
    pub driver_load_command: Vec<String>,

    // === 超时与重试 ===
    pub connect_retries: u32,
    pub connect_retry_delay: Duration,
    pub request_timeout: Duration,
    pub drain_join_timeout: Duration,
}

/// modem access daemon 通知配置
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub enabled: bool,
    /// `None` selects the system bus.
    pub bus_address: Option<String>,
    pub service: String,
    pub object_path: String,
}

/// 用于解析 TOML 的临时结构
#[derive(Deserialize, Default)]
#[serde(default)]
struct SoftapConfigFile {
    supplicant: SupplicantToml,
    notifier: NotifierToml,
}

#[derive(Deserialize)]
#[serde(default)]
struct SupplicantToml {
    interface_name: String,
    ctrl_dir: PathBuf,
    live_config_path: PathBuf,
    backup_config_path: PathBuf,
    config_owner_uid: u32,
    config_owner_gid: u32,
    start_command: Vec<String>,
    stop_command: Vec<String>,
    driver_load_command: Vec<String>,
    connect_retries: u32,
    connect_retry_delay_ms: u64,
    request_timeout_ms: u64,
    drain_join_timeout_ms: u64,
}

impl Default for SupplicantToml {
    fn default() -> Self {
        Self {
            interface_name: "wlan0".into(),
            ctrl_dir: "/data/misc/wifi/sockets".into(),
            live_config_path: "/data/misc/wifi/wpa_supplicant.conf".into(),
            backup_config_path: "/data/misc/wifi/wpa_supplicant.storage".into(),
            config_owner_uid: 1000,
            config_owner_gid: 1010,
            start_command: vec!["start".into(), "wpa_supplicant".into()],
            stop_command: vec!["stop".into(), "wpa_supplicant".into()],
            driver_load_command: Vec::new(),
            connect_retries: 3,
            connect_retry_delay_ms: 5000,
            request_timeout_ms: 10_000,
            drain_join_timeout_ms: 5000,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct NotifierToml {
    enabled: bool,
    bus_address: String,
    service: String,
    object_path: String,
}

impl Default for NotifierToml {
    fn default() -> Self {
        Self {
            enabled: true,
            bus_address: String::new(),
            service: "com.stericsson.mad".into(),
            object_path: "/com/stericsson/mad".into(),
        }
    }
}

impl From<SupplicantToml> for SupplicantConfig {
    fn from(t: SupplicantToml) -> Self {
        SupplicantConfig {
            interface_name: t.interface_name,
            ctrl_dir: t.ctrl_dir,
            live_config_path: t.live_config_path,
            backup_config_path: t.backup_config_path,
            config_owner_uid: t.config_owner_uid,
            config_owner_gid: t.config_owner_gid,
            start_command: t.start_command,
            stop_command: t.stop_command,
            driver_load_command: t.driver_load_command,
            connect_retries: t.connect_retries,
            connect_retry_delay: Duration::from_millis(t.connect_retry_delay_ms),
            request_timeout: Duration::from_millis(t.request_timeout_ms),
            drain_join_timeout: Duration::from_millis(t.drain_join_timeout_ms),
        }
    }
}

impl From<NotifierToml> for NotifierConfig {
    fn from(t: NotifierToml) -> Self {
        let bus_address = Some(t.bus_address).filter(|addr| !addr.trim().is_empty());
        NotifierConfig {
            enabled: t.enabled,
            bus_address,
            service: t.service,
            object_path: t.object_path,
        }
    }
}

impl From<SoftapConfigFile> for SoftapConfig {
    fn from(t: SoftapConfigFile) -> Self {
        SoftapConfig {
            supplicant: t.supplicant.into(),
            notifier: t.notifier.into(),
        }
    }
}

impl Default for SoftapConfig {
    fn default() -> Self {
        SoftapConfigFile::default().into()
    }
}

impl SoftapConfig {
    /// 从 TOML 字符串加载配置
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let parsed: SoftapConfigFile = toml::from_str(s)?;
        Ok(parsed.into())
    }

    /// 从磁盘上的 TOML 文件加载配置
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        tracing::debug!("Loaded config from {}", path.display());
        Self::from_toml_str(&contents)
    }

    /// The configuration compiled into the binary.
    pub fn embedded() -> Result<Self> {
        Self::from_toml_str(DEFAULT_CONFIG_TOML)
    }
}
