//! 通过 ADD_NETWORK / SET_NETWORK 序列配置 AP 网络。

use crate::command::{CommandChannel, SET_NETWORK};
use crate::lifecycle::DriverLifecycle;
use crate::{Error, Result};

pub const DEFAULT_SSID: &str = "AndroidAP";
pub const DEFAULT_PSK: &str = "12345678";
pub const DEFAULT_CHANNEL: u8 = 6;

/// Minimum argument vector: [reserved, reserved, wlan-iface, softap-iface].
pub const MIN_ARGS: usize = 4;

const ARG_SSID: usize = 4;
const ARG_SECURITY: usize = 5;
const ARG_KEY: usize = 6;
const ARG_CHANNEL: usize = 7;

/// 2.4 GHz 信道 1-14 的中心频率 (MHz)
const FREQUENCIES: [&str; 14] = [
    "2412", "2417", "2422", "2427", "2432", "2437", "2442", "2447", "2452", "2457", "2462", "2467",
    "2472", "2484",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityMode {
    Open,
    WpaPsk,
}

impl SecurityMode {
    /// `"open"` selects an open network; anything else gets WPA2-PSK.
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg {
            Some("open") => SecurityMode::Open,
            _ => SecurityMode::WpaPsk,
        }
    }
}

/// Settings for one AP session, taken from the `softap set` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub ssid: String,
    pub security: SecurityMode,
    pub psk: String,
    pub channel: u8,
}

impl NetworkConfig {
    /// 解析参数向量：
    /// [reserved, reserved, wlan-iface, softap-iface, ssid, security, key,
    /// channel, preamble, max-clients]. Preamble and max-clients are ignored.
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        if args.len() < MIN_ARGS {
            return Err(Error::MissingArguments {
                got: args.len(),
                need: MIN_ARGS,
            });
        }
        let arg = |i: usize| args.get(i).map(AsRef::as_ref);

        let channel = match arg(ARG_CHANNEL) {
            None => DEFAULT_CHANNEL,
            Some(raw) => match raw.trim().parse::<u8>() {
                Ok(0) => DEFAULT_CHANNEL,
                Ok(n) if usize::from(n) <= FREQUENCIES.len() => n,
                _ => return Err(Error::InvalidChannel(raw.to_string())),
            },
        };

        Ok(Self {
            ssid: arg(ARG_SSID).unwrap_or(DEFAULT_SSID).to_string(),
            security: SecurityMode::from_arg(arg(ARG_SECURITY)),
            psk: arg(ARG_KEY).unwrap_or(DEFAULT_PSK).to_string(),
            channel,
        })
    }

    pub fn frequency(&self) -> &'static str {
        frequency_for_channel(self.channel).unwrap_or(FREQUENCIES[usize::from(DEFAULT_CHANNEL) - 1])
    }
}

/// Maps a 1-based 2.4 GHz channel to its frequency; 0 means the default
/// channel 6. Anything past 14 has no frequency.
pub fn frequency_for_channel(channel: u8) -> Option<&'static str> {
    let channel = if channel == 0 { DEFAULT_CHANNEL } else { channel };
    FREQUENCIES.get(usize::from(channel) - 1).copied()
}

/// 配网流程：启动 supplicant，添加网络并设置 SSID、安全参数和频率。
/// A failure after the driver start rolls the whole driver back.
pub async fn set_softap<S: AsRef<str>>(
    driver: &mut DriverLifecycle,
    channel: &mut CommandChannel,
    args: &[S],
) -> Result<()> {
    tracing::debug!("set_softap: ENTER");

    if let Err(e) = driver.start_driver().await {
        tracing::error!("Supplicant start failed: {}", e);
        return Err(rollback(driver, e).await);
    }

    // the supplicant is already up here, bad arguments take it down again
    let network = match NetworkConfig::from_args(args) {
        Ok(network) => network,
        Err(e) => {
            tracing::error!("Bad softap arguments: {}", e);
            return Err(rollback(driver, e).await);
        }
    };

    if let Err(e) = provision(channel, &network).await {
        tracing::error!("Provisioning AP network failed: {}", e);
        return Err(rollback(driver, e).await);
    }

    tracing::info!(
        ssid = %network.ssid,
        security = ?network.security,
        channel = network.channel,
        network_id = channel.network_id(),
        "AP network provisioned"
    );
    Ok(())
}

async fn provision(channel: &mut CommandChannel, network: &NetworkConfig) -> Result<()> {
    channel.add_network().await?;

    channel.send(SET_NETWORK, Some("ssid"), Some(&network.ssid)).await?;
    channel.send(SET_NETWORK, Some("mode"), Some("2")).await?;

    match network.security {
        SecurityMode::Open => {
            channel.send(SET_NETWORK, Some("key_mgmt"), Some("NONE")).await?;
        }
        SecurityMode::WpaPsk => {
            channel.send(SET_NETWORK, Some("key_mgmt"), Some("WPA-PSK")).await?;
            channel.send(SET_NETWORK, Some("pairwise"), Some("CCMP")).await?;
            channel.send(SET_NETWORK, Some("group"), Some("CCMP")).await?;
            channel.send(SET_NETWORK, Some("proto"), Some("WPA2")).await?;
            channel.send(SET_NETWORK, Some("psk"), Some(&network.psk)).await?;
        }
    }

    channel.send(SET_NETWORK, Some("frequency"), Some(network.frequency())).await
}

async fn rollback(driver: &mut DriverLifecycle, cause: Error) -> Error {
    if let Err(e) = driver.stop_driver().await {
        tracing::error!("Rollback after failed provisioning incomplete: {}", e);
    }
    cause
}
