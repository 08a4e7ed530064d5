//! 通过 wpa_supplicant 控制接口发送单行命令。

use crate::traits::SupplicantControl;
use crate::{Error, Result};
use std::sync::Arc;

/// Capacity of one outgoing command line, terminator included.
pub const MAX_COMMAND_SIZE: usize = 512;

pub const ADD_NETWORK: &str = "ADD_NETWORK";
pub const SET_NETWORK: &str = "SET_NETWORK";
pub const ENABLE_NETWORK: &str = "ENABLE_NETWORK";
pub const DISABLE_NETWORK: &str = "DISABLE_NETWORK";
pub const REMOVE_NETWORK: &str = "REMOVE_NETWORK";
pub const SET_AP_SCAN: &str = "SET ap_scan";
pub const TERMINATE: &str = "TERMINATE";

/// Network id before ADD_NETWORK has assigned one.
pub const NO_NETWORK: i32 = -1;

/// Builds a command line from a command, an optional network property and
/// an optional value, substituting `network_id` where the command needs it.
pub fn format_command(
    cmd: &str,
    network_id: i32,
    property: Option<&str>,
    value: Option<&str>,
) -> Result<String> {
    let line = match (property, value) {
        (Some(prop @ ("ssid" | "psk")), Some(value)) => {
            format!("{} {} {} \"{}\"", cmd, network_id, prop, value)
        }
        (Some(prop), Some(value)) => format!("{} {} {} {}", cmd, network_id, prop, value),
        (_, Some(value)) => format!("{} {}", cmd, value),
        _ if cmd == TERMINATE => cmd.to_string(),
        _ => format!("{} {}", cmd, network_id),
    };

    if line.len() >= MAX_COMMAND_SIZE {
        return Err(Error::CommandTooLong {
            len: line.len(),
            max: MAX_COMMAND_SIZE - 1,
        });
    }
    Ok(line)
}

/// wpa_supplicant 命令通道，同时记录当前会话的 network id。
pub struct CommandChannel {
    control: Arc<dyn SupplicantControl>,
    network_id: i32,
}

impl CommandChannel {
    pub fn new(control: Arc<dyn SupplicantControl>) -> Self {
        Self {
            control,
            network_id: NO_NETWORK,
        }
    }

    pub fn network_id(&self) -> i32 {
        self.network_id
    }

    /// Forgets the network id of the finished session.
    pub fn reset(&mut self) {
        self.network_id = NO_NETWORK;
    }

    /// 发送一个命令，回复必须是 `OK`。
    pub async fn send(&self, cmd: &str, property: Option<&str>, value: Option<&str>) -> Result<()> {
        let line = format_command(cmd, self.network_id, property, value)?;
        let reply = self.control.request(&line).await;

        match reply {
            Ok(reply) => {
                let reply = reply.trim_end();
                tracing::debug!("Command [{}] Reply [{}]", line, reply);
                if reply == "OK" {
                    Ok(())
                } else {
                    Err(Error::Protocol {
                        command: line,
                        reply: reply.to_string(),
                    })
                }
            }
            Err(e) => {
                tracing::debug!("Command [{}] failed: {}", line, e);
                Err(e)
            }
        }
    }

    /// Sends an unformatted command and returns the reply as is.
    pub async fn request(&self, line: &str) -> Result<String> {
        if line.len() >= MAX_COMMAND_SIZE {
            return Err(Error::CommandTooLong {
                len: line.len(),
                max: MAX_COMMAND_SIZE - 1,
            });
        }
        let reply = self.control.request(line).await?;
        tracing::debug!("Command [{}] Reply [{}]", line, reply.trim_end());
        Ok(reply)
    }

    /// ADD_NETWORK，并把返回的 id 记为当前 network id。
    pub async fn add_network(&mut self) -> Result<i32> {
        let reply = self.request(ADD_NETWORK).await?;
        let id = reply
            .trim()
            .parse::<i32>()
            .ok()
            .filter(|id| *id >= 0)
            .ok_or_else(|| Error::Protocol {
                command: ADD_NETWORK.to_string(),
                reply: reply.trim_end().to_string(),
            })?;

        self.network_id = id;
        tracing::debug!(network_id = id, "Supplicant assigned network id");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSupplicant;

    #[test]
    fn quoted_properties() {
        assert_eq!(
            format_command(SET_NETWORK, 3, Some("ssid"), Some("Test")).unwrap(),
            "SET_NETWORK 3 ssid \"Test\""
        );
        assert_eq!(
            format_command(SET_NETWORK, 3, Some("psk"), Some("secret pass")).unwrap(),
            "SET_NETWORK 3 psk \"secret pass\""
        );
    }

    #[test]
    fn unquoted_properties() {
        assert_eq!(
            format_command(SET_NETWORK, 3, Some("frequency"), Some("2437")).unwrap(),
            "SET_NETWORK 3 frequency 2437"
        );
        assert_eq!(
            format_command(SET_NETWORK, 0, Some("key_mgmt"), Some("WPA-PSK")).unwrap(),
            "SET_NETWORK 0 key_mgmt WPA-PSK"
        );
    }

    #[test]
    fn value_only_and_bare_commands() {
        assert_eq!(format_command(SET_AP_SCAN, 3, None, Some("2")).unwrap(), "SET ap_scan 2");
        assert_eq!(format_command(TERMINATE, 3, None, None).unwrap(), "TERMINATE");
        assert_eq!(format_command(ENABLE_NETWORK, 3, None, None).unwrap(), "ENABLE_NETWORK 3");
        assert_eq!(
            format_command(REMOVE_NETWORK, NO_NETWORK, None, None).unwrap(),
            "REMOVE_NETWORK -1"
        );
    }

    #[test]
    fn oversized_command_is_rejected() {
        let ssid = "x".repeat(MAX_COMMAND_SIZE);
        let err = format_command(SET_NETWORK, 3, Some("ssid"), Some(&ssid)).unwrap_err();
        assert!(matches!(err, Error::CommandTooLong { max: 511, .. }));

        // 511 bytes still fits
        let fits = "y".repeat(MAX_COMMAND_SIZE - 1 - "SET ap_scan ".len());
        assert_eq!(format_command(SET_AP_SCAN, 3, None, Some(&fits)).unwrap().len(), 511);
    }

    #[tokio::test]
    async fn only_ok_counts_as_success() {
        let mock = MockSupplicant::connected();
        let channel = CommandChannel::new(mock.clone());

        channel.send(SET_AP_SCAN, None, Some("2")).await.unwrap();

        mock.reply_with("SET ap_scan 2", "FAIL\n");
        let err = channel.send(SET_AP_SCAN, None, Some("2")).await.unwrap_err();
        assert!(matches!(err, Error::Protocol { ref reply, .. } if reply == "FAIL"));

        mock.reply_with("SET ap_scan 2", "");
        assert!(channel.send(SET_AP_SCAN, None, Some("2")).await.is_err());
    }

    #[tokio::test]
    async fn add_network_records_id() {
        let mock = MockSupplicant::connected();
        mock.reply_with(ADD_NETWORK, "3\n");
        let mut channel = CommandChannel::new(mock.clone());

        assert_eq!(channel.add_network().await.unwrap(), 3);
        channel.send(SET_NETWORK, Some("ssid"), Some("Test")).await.unwrap();
        assert_eq!(mock.commands().last().unwrap(), "SET_NETWORK 3 ssid \"Test\"");

        channel.reset();
        assert_eq!(channel.network_id(), NO_NETWORK);
    }

    #[tokio::test]
    async fn add_network_rejects_bad_ids() {
        let mock = MockSupplicant::connected();
        let mut channel = CommandChannel::new(mock.clone());

        mock.reply_with(ADD_NETWORK, "FAIL\n");
        assert!(matches!(channel.add_network().await, Err(Error::Protocol { .. })));

        mock.reply_with(ADD_NETWORK, "-4\n");
        assert!(matches!(channel.add_network().await, Err(Error::Protocol { .. })));
        assert_eq!(channel.network_id(), NO_NETWORK);
    }

    #[tokio::test]
    async fn requests_need_a_connection() {
        let mock = MockSupplicant::new();
        let channel = CommandChannel::new(mock.clone());

        let err = channel.send(ENABLE_NETWORK, None, None).await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
        assert!(!mock.is_connected());
    }
}
