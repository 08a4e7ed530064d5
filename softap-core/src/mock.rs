//! A scripted stand-in for wpa_supplicant, for dry runs and tests.
//! It simulates the control socket and the process without any real
//! hardware interaction, and records everything it was asked to do.

use crate::config::{SoftapConfig, SupplicantConfig};
use crate::traits::{StateMessage, StateReporter, SupplicantControl, SupplicantProcess};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};

#[derive(Debug, Default)]
struct MockState {
    connected: bool,
    commands: Vec<String>,
    replies: HashMap<String, String>,
    broken_commands: HashSet<String>,
    connect_failures: u32,
    connect_calls: u32,
    close_calls: u32,
    start_calls: u32,
    stop_calls: u32,
    load_driver_calls: u32,
    fail_start: bool,
    fail_stop: bool,
    fail_load_driver: bool,
    next_network_id: i32,
}

#[derive(Debug)]
pub struct MockSupplicant {
    state: Mutex<MockState>,
    events_tx: mpsc::UnboundedSender<String>,
    events_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    closed: watch::Sender<bool>,
}

impl MockSupplicant {
    pub fn new() -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(true);
        Arc::new(Self {
            state: Mutex::new(MockState::default()),
            events_tx,
            events_rx: tokio::sync::Mutex::new(events_rx),
            closed,
        })
    }

    /// A mock whose control connection is already open.
    pub fn connected() -> Arc<Self> {
        let mock = Self::new();
        mock.lock().connected = true;
        mock.closed.send_replace(false);
        mock
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // a panicking test must not hide the state from the others
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // === 脚本 ===

    /// Replies to `command` with `reply` instead of the default.
    pub fn reply_with(&self, command: &str, reply: &str) {
        self.lock().replies.insert(command.to_string(), reply.to_string());
    }

    /// Makes the transport fail for `command`.
    pub fn break_command(&self, command: &str) {
        self.lock().broken_commands.insert(command.to_string());
    }

    pub fn fail_connects(&self, count: u32) {
        self.lock().connect_failures = count;
    }

    pub fn fail_start(&self) {
        self.lock().fail_start = true;
    }

    pub fn fail_stop(&self) {
        self.lock().fail_stop = true;
    }

    pub fn fail_load_driver(&self) {
        self.lock().fail_load_driver = true;
    }

    pub fn emit_event(&self, event: &str) {
        let _ = self.events_tx.send(event.to_string());
    }

    /// Drops the connection as if the supplicant went away.
    pub fn close_now(&self) {
        self.lock().connected = false;
        self.closed.send_replace(true);
    }

    // === 记录 ===

    pub fn commands(&self) -> Vec<String> {
        self.lock().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.lock().commands.clear();
    }

    pub fn connect_calls(&self) -> u32 {
        self.lock().connect_calls
    }

    pub fn close_calls(&self) -> u32 {
        self.lock().close_calls
    }

    pub fn start_calls(&self) -> u32 {
        self.lock().start_calls
    }

    pub fn stop_calls(&self) -> u32 {
        self.lock().stop_calls
    }

    pub fn load_driver_calls(&self) -> u32 {
        self.lock().load_driver_calls
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }
}

#[async_trait]
impl SupplicantControl for MockSupplicant {
    async fn connect(&self) -> Result<()> {
        let mut state = self.lock();
        state.connect_calls += 1;
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(Error::Connection("mock: supplicant not answering".into()));
        }
        state.connected = true;
        self.closed.send_replace(false);
        Ok(())
    }

    async fn request(&self, command: &str) -> Result<String> {
        let reply = {
            let mut state = self.lock();
            state.commands.push(command.to_string());
            if !state.connected {
                return Err(Error::Connection("mock: not connected".into()));
            }
            if state.broken_commands.contains(command) {
                return Err(Error::Connection(format!("mock: {} lost", command)));
            }
            match state.replies.get(command) {
                Some(reply) => reply.clone(),
                None if command == "ADD_NETWORK" => {
                    let id = state.next_network_id;
                    state.next_network_id += 1;
                    format!("{}\n", id)
                }
                None => "OK\n".to_string(),
            }
        };

        // the real supplicant announces its exit to every monitor
        if command == "TERMINATE" && reply.trim_end() == "OK" {
            self.emit_event("CTRL-EVENT-TERMINATING ");
        }
        Ok(reply)
    }

    async fn wait_for_event(&self) -> Result<String> {
        let mut closed = self.closed.subscribe();
        let is_closed = *closed.borrow_and_update();
        if is_closed {
            return Err(Error::Connection("mock: connection closed".into()));
        }

        let mut events = self.events_rx.lock().await;
        tokio::select! {
            event = events.recv() => event.ok_or_else(|| Error::Connection("mock: event queue gone".into())),
            _ = closed.changed() => Err(Error::Connection("mock: connection closed".into())),
        }
    }

    async fn close(&self) {
        self.lock().close_calls += 1;
        self.close_now();
    }
}

#[async_trait]
impl SupplicantProcess for MockSupplicant {
    async fn start(&self) -> Result<()> {
        let mut state = self.lock();
        state.start_calls += 1;
        if state.fail_start {
            return Err(Error::Io(std::io::Error::other("mock: start failed")));
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let mut state = self.lock();
        state.stop_calls += 1;
        if state.fail_stop {
            return Err(Error::Io(std::io::Error::other("mock: stop failed")));
        }
        Ok(())
    }

    async fn load_driver(&self) -> Result<()> {
        let mut state = self.lock();
        state.load_driver_calls += 1;
        if state.fail_load_driver {
            return Err(Error::Io(std::io::Error::other("mock: driver load failed")));
        }
        Ok(())
    }
}

/// Remembers every state report.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    messages: Mutex<Vec<StateMessage>>,
}

impl RecordingReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<StateMessage> {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl StateReporter for RecordingReporter {
    async fn report(&self, message: StateMessage) {
        tracing::info!("Mock state report: {}", message);
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message);
    }
}

/// Supplicant settings that keep the station config files under `dir`,
/// owned by whoever owns `dir`, with no real delays.
pub fn config_in(dir: &Path) -> Result<SupplicantConfig> {
    let meta = std::fs::metadata(dir)?;
    let mut config = SoftapConfig::default().supplicant;
    config.ctrl_dir = dir.to_path_buf();
    config.live_config_path = dir.join("wpa_supplicant.conf");
    config.backup_config_path = dir.join("wpa_supplicant.storage");
    config.config_owner_uid = meta.uid();
    config.config_owner_gid = meta.gid();
    config.start_command = Vec::new();
    config.stop_command = Vec::new();
    Ok(config)
}
