//! 启动和停止 wpa_supplicant，管理事件排空任务的生命周期。

use crate::config::SupplicantConfig;
use crate::config_store::ConfigStore;
use crate::drain::DrainWorker;
use crate::traits::{SupplicantControl, SupplicantProcess};
use crate::{Error, Failures, Result};
use std::sync::Arc;
use std::time::Duration;

pub struct DriverLifecycle {
    config_store: ConfigStore,
    control: Arc<dyn SupplicantControl>,
    process: Arc<dyn SupplicantProcess>,
    drain: Option<DrainWorker>,
    connect_retries: u32,
    connect_retry_delay: Duration,
    drain_join_timeout: Duration,
}

impl DriverLifecycle {
    pub fn new(
        config: &SupplicantConfig,
        control: Arc<dyn SupplicantControl>,
        process: Arc<dyn SupplicantProcess>,
    ) -> Self {
        Self {
            config_store: ConfigStore::from_config(config),
            control,
            process,
            drain: None,
            connect_retries: config.connect_retries,
            connect_retry_delay: config.connect_retry_delay,
            drain_join_timeout: config.drain_join_timeout,
        }
    }

    pub fn config_store(&self) -> &ConfigStore {
        &self.config_store
    }

    /// Whether a drain worker is alive, i.e. the supplicant is up for us.
    pub fn is_running(&self) -> bool {
        self.drain.as_ref().is_some_and(|worker| !worker.is_finished())
    }

    /// 保存 STA 配置，启动 wpa_supplicant 并连接控制接口，然后开始排空事件。
    pub async fn start_driver(&mut self) -> Result<()> {
        tracing::debug!("start_driver: ENTER");

        if self.is_running() {
            tracing::debug!("Supplicant already started for this session");
            return Ok(());
        }
        if let Some(stale) = self.drain.take() {
            // exited on its own, reap it before starting over
            stale.join(self.drain_join_timeout).await;
        }

        if let Err(e) = self.config_store.store() {
            tracing::error!("Unable to store STA mode settings: {}", e);
            return Err(e);
        }

        if let Err(e) = self.process.start().await {
            tracing::error!("Unable to start supplicant: {}", e);
            return Err(e);
        }

        self.connect_with_retries().await?;

        self.drain = Some(DrainWorker::spawn(self.control.clone()));
        tracing::info!("Supplicant started and connected");
        Ok(())
    }

    async fn connect_with_retries(&self) -> Result<()> {
        let mut retries = 0;
        loop {
            match self.control.connect().await {
                Ok(()) => return Ok(()),
                Err(e) if retries < self.connect_retries => {
                    retries += 1;
                    tracing::warn!(
                        "Connection to supplicant failed ({}), retrying in {:?} ({}/{})",
                        e,
                        self.connect_retry_delay,
                        retries,
                        self.connect_retries
                    );
                    tokio::time::sleep(self.connect_retry_delay).await;
                }
                Err(e) => {
                    tracing::error!("Connection to supplicant failed: {}", e);
                    return Err(Error::Connection(format!(
                        "no supplicant connection after {} retries: {}",
                        self.connect_retries, e
                    )));
                }
            }
        }
    }

    /// 关闭连接、等待事件任务、停止 wpa_supplicant 并恢复 STA 配置。
    /// Every step runs; the result reports all that failed.
    pub async fn stop_driver(&mut self) -> Result<()> {
        tracing::debug!("stop_driver: ENTER");
        let mut failures = Failures::new();

        self.control.close().await;
        self.join_drain().await;
        failures.note(self.process.stop().await);
        failures.note(self.config_store.restore());

        log_outcome("stop_driver", &failures);
        failures.into_result()
    }

    /// Teardown once TERMINATE has been sent: the supplicant is on its way
    /// out and announces it to the drain worker before the connection is
    /// dropped.
    pub async fn finish_session(&mut self) -> Result<()> {
        tracing::debug!("finish_session: ENTER");
        let mut failures = Failures::new();

        self.join_drain().await;
        if let Err(e) = self.process.stop().await {
            tracing::error!("Unable to stop supplicant: {}", e);
            failures.push(e);
        }
        self.control.close().await;
        failures.note(self.config_store.restore());

        log_outcome("finish_session", &failures);
        failures.into_result()
    }

    async fn join_drain(&mut self) {
        match self.drain.take() {
            Some(worker) => {
                if worker.join(self.drain_join_timeout).await.is_none() {
                    tracing::error!("Event drain worker did not shut down cleanly");
                }
            }
            None => tracing::debug!("No event drain worker to join"),
        }
    }

    /// Loads the wlan driver firmware.
    pub async fn reload_driver(&self) -> Result<()> {
        self.process.load_driver().await
    }
}

fn log_outcome(step: &str, failures: &Failures) {
    if failures.is_empty() {
        tracing::debug!("{}: ok", step);
    } else {
        tracing::error!("{}: {:?}", step, failures);
    }
}
