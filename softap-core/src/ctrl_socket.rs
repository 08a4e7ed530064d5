//! wpa_supplicant 控制套接字客户端（基于 wpa-ctrl）。
//!
//! Two controllers are opened per connection, the way wpa_cli does it: one
//! for request/reply traffic and one registered with `ATTACH` that receives
//! the unsolicited `<N>EVENT ...` messages. wpa-ctrl is blocking, so every
//! call runs inside `spawn_blocking`.

use crate::config::SupplicantConfig;
use crate::traits::SupplicantControl;
use crate::{Error, Result};
use async_trait::async_trait;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinError;
use wpa_ctrl::{WpaControlReq, WpaController, WpaControllerBuilder};

/// Read timeout of the monitor controller; a pending `wait_for_event`
/// checks for `close` this often.
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(250);

type Shared = Arc<Mutex<Option<WpaController>>>;

/// Drops the `<level>` prefix of an event message.
pub fn strip_level(msg: &str) -> &str {
    if msg.starts_with('<') {
        if let Some(end) = msg.find('>') {
            return &msg[end + 1..];
        }
    }
    msg
}

fn lock(shared: &Shared) -> MutexGuard<'_, Option<WpaController>> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn closed_error() -> Error {
    Error::Connection("supplicant connection closed".into())
}

fn blocking_failed(e: JoinError) -> Error {
    Error::Connection(format!("control socket task failed: {}", e))
}

/// Receives the reply to the last request, skipping unsolicited messages.
fn recv_reply(ctrl: &mut WpaController, wait: Duration) -> io::Result<String> {
    let deadline = Instant::now() + wait;
    loop {
        match ctrl.recv()? {
            Some(msg) if msg.is_unsolicited() => {
                tracing::trace!("WPA_CMD_RECV (unsolicited): {}", msg.raw.trim_end());
            }
            Some(msg) => return Ok(msg.raw.to_string()),
            None if Instant::now() >= deadline => {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no reply from supplicant"));
            }
            None => {}
        }
    }
}

/// Waits one poll interval for an event on the monitor controller.
fn poll_event(monitor: &Shared) -> Result<Option<String>> {
    let mut guard = lock(monitor);
    let ctrl = guard.as_mut().ok_or_else(closed_error)?;
    match ctrl.recv()? {
        Some(msg) if msg.is_unsolicited() => Ok(Some(strip_level(msg.raw.trim_end()).to_string())),
        Some(msg) => {
            tracing::trace!("Ignoring reply on monitor: {}", msg.raw.trim_end());
            Ok(None)
        }
        None => Ok(None),
    }
}

pub struct CtrlSocket {
    ctrl_dir: String,
    interface: String,
    request_timeout: Duration,
    cmd: Shared,
    monitor: Shared,
    closed: watch::Sender<bool>,
}

impl CtrlSocket {
    pub fn new(config: &SupplicantConfig) -> Self {
        let (closed, _) = watch::channel(true);
        Self {
            ctrl_dir: config.ctrl_dir.to_string_lossy().into_owned(),
            interface: config.interface_name.clone(),
            request_timeout: config.request_timeout,
            cmd: Arc::new(Mutex::new(None)),
            monitor: Arc::new(Mutex::new(None)),
            closed,
        }
    }
}

#[async_trait]
impl SupplicantControl for CtrlSocket {
    async fn connect(&self) -> Result<()> {
        let ctrl_dir = self.ctrl_dir.clone();
        let interface = self.interface.clone();
        let timeout = self.request_timeout;

        let (cmd, monitor) = tokio::task::spawn_blocking(move || -> Result<_> {
            let open = |read_timeout: Duration| {
                WpaControllerBuilder::new()
                    .set_root(&ctrl_dir)
                    .set_read_timeout(Some(read_timeout))
                    .open(&interface)
                    .map_err(|e| Error::Connection(format!("{}/{}: {}", ctrl_dir, interface, e)))
            };
            let cmd = open(timeout)?;
            let mut monitor = open(EVENT_POLL_INTERVAL)?;

            monitor.request(WpaControlReq::raw("ATTACH"))?;
            let reply = recv_reply(&mut monitor, timeout)?;
            if reply.trim_end() != "OK" {
                return Err(Error::Protocol {
                    command: "ATTACH".into(),
                    reply: reply.trim_end().to_string(),
                });
            }
            Ok((cmd, monitor))
        })
        .await
        .map_err(blocking_failed)??;

        *lock(&self.cmd) = Some(cmd);
        *lock(&self.monitor) = Some(monitor);
        self.closed.send_replace(false);
        tracing::debug!("Connected to supplicant at {}/{}", self.ctrl_dir, self.interface);
        Ok(())
    }

    async fn request(&self, command: &str) -> Result<String> {
        let cmd = self.cmd.clone();
        let command = command.to_string();
        let timeout = self.request_timeout;

        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&cmd);
            let ctrl = guard
                .as_mut()
                .ok_or_else(|| Error::Connection("not connected to supplicant".into()))?;
            ctrl.request(WpaControlReq::raw(&command))?;
            Ok(recv_reply(ctrl, timeout)?)
        })
        .await
        .map_err(blocking_failed)?
    }

    async fn wait_for_event(&self) -> Result<String> {
        let mut closed = self.closed.subscribe();
        loop {
            let is_closed = *closed.borrow_and_update();
            if is_closed {
                return Err(closed_error());
            }

            let monitor = self.monitor.clone();
            let poll = tokio::task::spawn_blocking(move || poll_event(&monitor));
            tokio::select! {
                polled = poll => {
                    if let Some(event) = polled.map_err(blocking_failed)?? {
                        return Ok(event);
                    }
                }
                _ = closed.changed() => return Err(closed_error()),
            }
        }
    }

    async fn close(&self) {
        self.closed.send_replace(true);

        // a poll in flight holds the monitor for at most one interval
        let cmd = self.cmd.clone();
        let monitor = self.monitor.clone();
        let dropped = tokio::task::spawn_blocking(move || {
            lock(&cmd).take();
            lock(&monitor).take();
        })
        .await;
        if let Err(e) = dropped {
            tracing::warn!("Failed to release supplicant controllers: {}", e);
        }
        tracing::debug!("Closed supplicant connection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::config_in;
    use std::path::Path;
    use tempfile::TempDir;
    use tokio::net::UnixDatagram;

    /// Minimal supplicant: answers ATTACH and PING, pushes events around them.
    fn spawn_fake_supplicant(path: &Path) -> tokio::task::JoinHandle<()> {
        let server = UnixDatagram::bind(path).unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 256];
            loop {
                let Ok((n, peer)) = server.recv_from(&mut buf).await else {
                    return;
                };
                let Some(peer) = peer.as_pathname().map(Path::to_path_buf) else {
                    continue;
                };
                match &buf[..n] {
                    b"ATTACH" => {
                        let _ = server.send_to(b"OK\n", &peer).await;
                        let _ = server.send_to(b"<2>CTRL-EVENT-SCAN-STARTED ", &peer).await;
                        let _ = server.send_to(b"<3>CTRL-EVENT-TERMINATING ", &peer).await;
                    }
                    b"PING" => {
                        let _ = server.send_to(b"<3>CTRL-EVENT-BSS-ADDED 0 02:00:00:00:00:01", &peer).await;
                        let _ = server.send_to(b"PONG\n", &peer).await;
                    }
                    _ => {
                        let _ = server.send_to(b"UNKNOWN COMMAND\n", &peer).await;
                    }
                }
            }
        })
    }

    #[test]
    fn level_prefix_is_stripped() {
        assert_eq!(strip_level("<3>CTRL-EVENT-TERMINATING "), "CTRL-EVENT-TERMINATING ");
        assert_eq!(strip_level("OK"), "OK");
        assert_eq!(strip_level("<broken"), "<broken");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn talks_to_a_supplicant_socket() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(dir.path()).unwrap();
        config.request_timeout = Duration::from_secs(2);
        let server = spawn_fake_supplicant(&dir.path().join(&config.interface_name));
        let ctrl = CtrlSocket::new(&config);

        assert!(matches!(ctrl.request("PING").await, Err(Error::Connection(_))));

        ctrl.connect().await.unwrap();
        assert_eq!(ctrl.request("PING").await.unwrap().trim_end(), "PONG");
        assert_eq!(ctrl.wait_for_event().await.unwrap(), "CTRL-EVENT-SCAN-STARTED");
        assert_eq!(ctrl.wait_for_event().await.unwrap(), "CTRL-EVENT-TERMINATING");

        ctrl.close().await;
        assert!(ctrl.wait_for_event().await.is_err());
        assert!(ctrl.request("PING").await.is_err());
        server.abort();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn close_wakes_a_pending_event_wait() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(dir.path()).unwrap();
        config.request_timeout = Duration::from_secs(2);
        let server = spawn_fake_supplicant(&dir.path().join(&config.interface_name));
        let ctrl = Arc::new(CtrlSocket::new(&config));
        ctrl.connect().await.unwrap();
        // drain the two events sent after ATTACH
        ctrl.wait_for_event().await.unwrap();
        ctrl.wait_for_event().await.unwrap();

        let waiter = tokio::spawn({
            let ctrl = ctrl.clone();
            async move { ctrl.wait_for_event().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        ctrl.close().await;

        let waited = tokio::time::timeout(Duration::from_secs(2), waiter).await.unwrap().unwrap();
        assert!(matches!(waited, Err(Error::Connection(_))));
        server.abort();
    }

    #[tokio::test]
    async fn missing_supplicant_is_a_connection_error() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path()).unwrap();
        let ctrl = CtrlSocket::new(&config);

        assert!(matches!(ctrl.connect().await, Err(Error::Connection(_))));
    }
}
