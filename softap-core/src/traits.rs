use async_trait::async_trait;
use std::fmt;

// 在这里定义 SoftAP 控制器与外部协作者之间的接口。

/// wpa_supplicant 控制接口（ctrl_iface）的最小能力集合。
#[async_trait]
pub trait SupplicantControl: Send + Sync {
    /// Opens the command and monitor connections to the supplicant.
    async fn connect(&self) -> crate::Result<()>;

    /// Sends one raw command line and returns the supplicant's reply.
    async fn request(&self, command: &str) -> crate::Result<String>;

    /// Waits for the next unsolicited event, with its `<N>` level prefix
    /// stripped. Returns an error once the connection is closed.
    async fn wait_for_event(&self) -> crate::Result<String>;

    /// Closes both connections. Pending `wait_for_event` calls return.
    async fn close(&self);
}

/// wpa_supplicant 进程和驱动的启动/停止。
#[async_trait]
pub trait SupplicantProcess: Send + Sync {
    async fn start(&self) -> crate::Result<()>;

    async fn stop(&self) -> crate::Result<()>;

    /// Makes sure the wlan driver firmware is loaded.
    async fn load_driver(&self) -> crate::Result<()>;
}

/// Features the modem access daemon tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    /// Wi-Fi AP TX backoff.
    TxBackoff,
    /// USB tethering.
    UsbTether,
}

/// 一次状态上报的内容
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateMessage {
    pub feature: Feature,
    pub active: bool,
}

impl StateMessage {
    pub fn new(feature: Feature, active: bool) -> Self {
        Self { feature, active }
    }

    /// The single string argument of the D-Bus call.
    pub fn payload(&self) -> &'static str {
        if self.active { "on" } else { "off" }
    }
}

impl fmt::Display for StateMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}={}", self.feature, self.payload())
    }
}

/// 状态上报接口
///
/// Reporting is best-effort: implementations log their failures and never
/// hand them back to the session.
#[async_trait]
pub trait StateReporter: Send + Sync {
    async fn report(&self, message: StateMessage);
}
