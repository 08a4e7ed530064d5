//! AP / 共享网络状态上报（modem access daemon，D-Bus）。

use crate::config::NotifierConfig;
use crate::traits::{StateMessage, StateReporter};
use async_trait::async_trait;
use std::sync::Arc;

/// 空的状态上报器（mad feature 关闭或配置禁用时使用）
#[derive(Debug, Default)]
pub struct NullReporter;

#[async_trait]
impl StateReporter for NullReporter {
    async fn report(&self, message: StateMessage) {
        tracing::debug!("State report disabled, dropping {}", message);
    }
}

/// Picks the reporter for this build and configuration.
pub fn create_reporter(config: &NotifierConfig) -> Arc<dyn StateReporter> {
    #[cfg(feature = "mad")]
    {
        if config.enabled {
            tracing::info!("Reporting SoftAP state to {}", config.service);
            return Arc::new(mad::MadNotifier::new(config.clone()));
        }
        tracing::info!("State reporting disabled in config");
    }

    #[cfg(not(feature = "mad"))]
    {
        if config.enabled {
            tracing::warn!("State reporting configured but built without the `mad` feature");
        }
    }

    Arc::new(NullReporter)
}

#[cfg(feature = "mad")]
pub use mad::MadNotifier;

#[cfg(feature = "mad")]
mod mad {
    use super::*;
    use crate::traits::Feature;
    use crate::Result;
    use tokio::sync::Mutex;
    use zbus::Connection;
    use zbus::proxy::CacheProperties;
    use zbus_macros::proxy;

    #[proxy(interface = "com.stericsson.mad.txbo", gen_blocking = false)]
    trait MadTxBackoff {
        fn wifi_ap(&self, state: &str) -> zbus::Result<()>;
    }

    #[proxy(interface = "com.stericsson.mad.tether", gen_blocking = false)]
    trait MadTether {
        fn usb_tether(&self, state: &str) -> zbus::Result<()>;
    }

    /// Sends state changes to the modem access daemon and waits for its
    /// acknowledgement.
    #[derive(Debug)]
    pub struct MadNotifier {
        config: NotifierConfig,
        conn: Mutex<Option<Connection>>,
    }

    impl MadNotifier {
        pub fn new(config: NotifierConfig) -> Self {
            Self {
                config,
                conn: Mutex::new(None),
            }
        }

        /// 确保 D-Bus 连接存在
        async fn ensure_conn(&self) -> Result<Connection> {
            let mut guard = self.conn.lock().await;
            if let Some(c) = guard.as_ref() {
                return Ok(c.clone());
            }
            let c = match &self.config.bus_address {
                Some(address) => {
                    zbus::connection::Builder::address(address.as_str())?
                        .build()
                        .await?
                }
                None => Connection::system().await?,
            };
            *guard = Some(c.clone());
            Ok(c)
        }

        /// Delivers one state message; the error says why it did not arrive.
        pub async fn send(&self, message: StateMessage) -> Result<()> {
            let conn = self.ensure_conn().await?;
            let state = message.payload();

            let sent = match message.feature {
                Feature::TxBackoff => {
                    let proxy = MadTxBackoffProxy::builder(&conn)
                        .destination(self.config.service.as_str())?
                        .path(self.config.object_path.as_str())?
                        .cache_properties(CacheProperties::No)
                        .build()
                        .await?;
                    proxy.wifi_ap(state).await
                }
                Feature::UsbTether => {
                    let proxy = MadTetherProxy::builder(&conn)
                        .destination(self.config.service.as_str())?
                        .path(self.config.object_path.as_str())?
                        .cache_properties(CacheProperties::No)
                        .build()
                        .await?;
                    proxy.usb_tether(state).await
                }
            };

            if let Err(e) = &sent {
                // an error reply leaves the bus usable; anything else may not
                if !matches!(e, zbus::Error::MethodError(..)) {
                    self.conn.lock().await.take();
                }
            }
            sent?;
            tracing::debug!("Modem access daemon acknowledged {}", message);
            Ok(())
        }
    }

    #[async_trait]
    impl StateReporter for MadNotifier {
        async fn report(&self, message: StateMessage) {
            if let Err(e) = self.send(message).await {
                tracing::error!("Unable to send state {}: {}", message, e);
            }
        }
    }
}
