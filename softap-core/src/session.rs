//! SoftAP 会话状态机：Idle <-> Active。

use crate::command::{CommandChannel, DISABLE_NETWORK, ENABLE_NETWORK, REMOVE_NETWORK, SET_AP_SCAN, TERMINATE};
use crate::config::SoftapConfig;
use crate::lifecycle::DriverLifecycle;
use crate::provisioning;
use crate::traits::{Feature, StateMessage, StateReporter, SupplicantControl, SupplicantProcess};
use crate::{Error, Failures, Result};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
}

/// Owns everything a SoftAP session needs. Operations take `&mut self`;
/// callers serialize them.
pub struct SessionController {
    state: SessionState,
    driver: DriverLifecycle,
    channel: CommandChannel,
    reporter: Arc<dyn StateReporter>,
}

impl SessionController {
    pub fn new(
        config: &SoftapConfig,
        control: Arc<dyn SupplicantControl>,
        process: Arc<dyn SupplicantProcess>,
        reporter: Arc<dyn StateReporter>,
    ) -> Self {
        Self {
            state: SessionState::Idle,
            driver: DriverLifecycle::new(&config.supplicant, control.clone(), process),
            channel: CommandChannel::new(control),
            reporter,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_softap_started(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn network_id(&self) -> i32 {
        self.channel.network_id()
    }

    /// 启用已配置的 AP 网络。已经启动时直接返回成功。
    pub async fn start_softap(&mut self) -> Result<()> {
        tracing::debug!("start_softap: ENTER");

        if self.state == SessionState::Active {
            tracing::warn!("SoftAP already started");
            return Ok(());
        }

        if let Err(e) = self.channel.send(SET_AP_SCAN, None, Some("2")).await {
            tracing::warn!("Setting ap_scan=2 failed: {}", e);
        }
        self.channel.send(ENABLE_NETWORK, None, None).await?;

        self.state = SessionState::Active;
        tracing::info!(network_id = self.channel.network_id(), "SoftAP started");
        self.reporter
            .report(StateMessage::new(Feature::TxBackoff, true))
            .await;
        Ok(())
    }

    /// 停止 AP 并恢复 STA 模式。Every teardown step runs, and the state
    /// change is reported even when some of them failed.
    pub async fn stop_softap(&mut self) -> Result<()> {
        tracing::debug!("stop_softap: ENTER");

        if self.state == SessionState::Idle {
            tracing::warn!("SoftAP already stopped");
            return Ok(());
        }

        let mut failures = Failures::new();
        failures.note(self.channel.send(DISABLE_NETWORK, None, None).await);
        failures.note(self.channel.send(REMOVE_NETWORK, None, None).await);
        failures.note(self.channel.send(TERMINATE, None, None).await);
        failures.note(self.driver.finish_session().await);

        self.channel.reset();
        self.state = SessionState::Idle;
        if failures.is_empty() {
            tracing::info!("SoftAP stopped");
        } else {
            tracing::error!("SoftAP stopped with errors: {:?}", failures);
        }
        self.reporter
            .report(StateMessage::new(Feature::TxBackoff, false))
            .await;
        failures.into_result()
    }

    /// Leaves the device in station mode, whatever state the session is in.
    /// Covers a provisioned but never started AP, and a `set` that was cut
    /// short after the station config had been moved aside.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.state == SessionState::Active {
            return self.stop_softap().await;
        }
        if !self.driver.is_running() && !self.driver.config_store().has_backup() {
            tracing::debug!("shutdown: nothing to tear down");
            return Ok(());
        }

        tracing::info!("Tearing down unfinished SoftAP setup");
        self.channel.reset();
        self.driver.stop_driver().await
    }

    /// Provisions the AP network from a `softap set` argument vector.
    pub async fn set_softap<S: AsRef<str>>(&mut self, args: &[S]) -> Result<()> {
        provisioning::set_softap(&mut self.driver, &mut self.channel, args).await
    }

    /// Makes sure the wlan driver is loaded; the arguments are accepted for
    /// compatibility and ignored.
    pub async fn fw_reload_softap<S: AsRef<str>>(&mut self, _args: &[S]) -> Result<()> {
        tracing::debug!("fw_reload_softap: ENTER");
        self.driver.reload_driver().await
    }

    /// Connected station list.
    pub async fn clients_softap(&self) -> Result<Vec<String>> {
        Err(Error::Unsupported("softap client list"))
    }

    /// Reports a USB tethering state change.
    pub async fn report_tethering(&self, active: bool) {
        self.reporter
            .report(StateMessage::new(Feature::UsbTether, active))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockSupplicant, RecordingReporter, config_in};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        mock: Arc<MockSupplicant>,
        reporter: Arc<RecordingReporter>,
        session: SessionController,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let mut config = SoftapConfig::default();
        config.supplicant = config_in(dir.path()).unwrap();
        config.supplicant.drain_join_timeout = Duration::from_millis(200);
        std::fs::write(&config.supplicant.live_config_path, b"sta config\n").unwrap();

        let mock = MockSupplicant::new();
        let reporter = RecordingReporter::new();
        let session = SessionController::new(&config, mock.clone(), mock.clone(), reporter.clone());
        Fixture {
            _dir: dir,
            mock,
            reporter,
            session,
        }
    }

    fn set_args() -> Vec<String> {
        ["softap", "set", "wlan0", "wl0.1", "MyAP", "wpa2-psk", "password", "1"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[tokio::test]
    async fn full_session() {
        let mut f = fixture();
        f.session.set_softap(&set_args()).await.unwrap();
        f.mock.clear_commands();

        f.session.start_softap().await.unwrap();
        assert!(f.session.is_softap_started());
        assert_eq!(f.mock.commands(), vec!["SET ap_scan 2", "ENABLE_NETWORK 0"]);

        f.mock.clear_commands();
        f.session.stop_softap().await.unwrap();
        assert_eq!(f.session.state(), SessionState::Idle);
        assert_eq!(
            f.mock.commands(),
            vec!["DISABLE_NETWORK 0", "REMOVE_NETWORK 0", "TERMINATE"]
        );
        assert_eq!(f.session.network_id(), -1);
        assert_eq!(f.mock.stop_calls(), 1);

        let live = f._dir.path().join("wpa_supplicant.conf");
        assert_eq!(std::fs::read(live).unwrap(), b"sta config\n");
        assert_eq!(
            f.reporter.messages(),
            vec![
                StateMessage::new(Feature::TxBackoff, true),
                StateMessage::new(Feature::TxBackoff, false),
            ]
        );
    }

    #[tokio::test]
    async fn second_start_is_a_noop() {
        let mut f = fixture();
        f.session.set_softap(&set_args()).await.unwrap();
        f.session.start_softap().await.unwrap();
        f.mock.clear_commands();

        f.session.start_softap().await.unwrap();
        assert!(f.mock.commands().is_empty());
        assert_eq!(f.reporter.messages().len(), 1);

        f.session.stop_softap().await.unwrap();
    }

    #[tokio::test]
    async fn stop_when_idle_does_nothing() {
        let mut f = fixture();

        f.session.stop_softap().await.unwrap();
        assert!(f.mock.commands().is_empty());
        assert!(f.reporter.messages().is_empty());
        assert_eq!(f.mock.stop_calls(), 0);
    }

    #[tokio::test]
    async fn failed_enable_stays_idle() {
        let mut f = fixture();
        f.session.set_softap(&set_args()).await.unwrap();
        f.mock.reply_with("ENABLE_NETWORK 0", "FAIL\n");

        assert!(f.session.start_softap().await.is_err());
        assert_eq!(f.session.state(), SessionState::Idle);
        assert!(f.reporter.messages().is_empty());
    }

    #[tokio::test]
    async fn ap_scan_failure_is_not_fatal() {
        let mut f = fixture();
        f.session.set_softap(&set_args()).await.unwrap();
        f.mock.reply_with("SET ap_scan 2", "FAIL\n");

        f.session.start_softap().await.unwrap();
        assert!(f.session.is_softap_started());
        f.session.stop_softap().await.unwrap();
    }

    #[tokio::test]
    async fn stop_accumulates_failures_and_still_reports() {
        let mut f = fixture();
        f.session.set_softap(&set_args()).await.unwrap();
        f.session.start_softap().await.unwrap();
        f.mock.clear_commands();
        f.mock.reply_with("DISABLE_NETWORK 0", "FAIL\n");
        f.mock.break_command("REMOVE_NETWORK 0");

        let err = f.session.stop_softap().await.unwrap_err();
        assert!(matches!(err, Error::Teardown(ref errors) if errors.len() == 2));

        // every step still ran
        assert_eq!(
            f.mock.commands(),
            vec!["DISABLE_NETWORK 0", "REMOVE_NETWORK 0", "TERMINATE"]
        );
        assert_eq!(f.mock.stop_calls(), 1);
        assert_eq!(f.session.state(), SessionState::Idle);
        assert_eq!(
            f.reporter.messages().last(),
            Some(&StateMessage::new(Feature::TxBackoff, false))
        );
    }

    #[tokio::test]
    async fn tethering_and_reload() {
        let mut f = fixture();

        f.session.report_tethering(true).await;
        assert_eq!(
            f.reporter.messages(),
            vec![StateMessage::new(Feature::UsbTether, true)]
        );

        f.session.fw_reload_softap(&["softap", "fwreload", "wlan0", "AP"]).await.unwrap();
        assert_eq!(f.mock.load_driver_calls(), 1);

        f.mock.fail_load_driver();
        let err = f.session.fw_reload_softap(&["softap", "fwreload", "wlan0", "AP"]).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(f.mock.load_driver_calls(), 2);

        assert!(matches!(
            f.session.clients_softap().await,
            Err(Error::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn shutdown_after_set_without_start_restores_station() {
        let mut f = fixture();
        let live = f._dir.path().join("wpa_supplicant.conf");
        f.session.set_softap(&set_args()).await.unwrap();
        assert!(!live.exists());

        f.session.shutdown().await.unwrap();
        assert_eq!(std::fs::read(&live).unwrap(), b"sta config\n");
        assert_eq!(f.mock.stop_calls(), 1);
        assert_eq!(f.session.network_id(), -1);
        // never active, so nothing to report
        assert!(f.reporter.messages().is_empty());
    }

    #[tokio::test]
    async fn shutdown_restores_stranded_backup() {
        let mut f = fixture();
        let live = f._dir.path().join("wpa_supplicant.conf");
        let backup = f._dir.path().join("wpa_supplicant.storage");
        std::fs::rename(&live, &backup).unwrap();

        f.session.shutdown().await.unwrap();
        assert_eq!(std::fs::read(&live).unwrap(), b"sta config\n");
        assert!(!backup.exists());
    }

    #[tokio::test]
    async fn shutdown_stops_an_active_ap() {
        let mut f = fixture();
        f.session.set_softap(&set_args()).await.unwrap();
        f.session.start_softap().await.unwrap();

        f.session.shutdown().await.unwrap();
        assert_eq!(f.session.state(), SessionState::Idle);
        assert_eq!(
            f.reporter.messages().last(),
            Some(&StateMessage::new(Feature::TxBackoff, false))
        );

        // idle and clean: nothing left to do
        f.session.shutdown().await.unwrap();
        assert_eq!(f.mock.stop_calls(), 1);
    }
}
