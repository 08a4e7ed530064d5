mod runner;

use anyhow::Context;
use softap_core::traits::{SupplicantControl, SupplicantProcess};
use softap_core::{SessionController, SoftapConfig, notifier};
use std::sync::Arc;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

// --- 1. 选择 supplicant 实现 ---
#[cfg(not(feature = "backend_mock"))]
fn get_supplicant(
    config: &SoftapConfig,
) -> (Arc<dyn SupplicantControl>, Arc<dyn SupplicantProcess>) {
    use softap_core::ctrl_socket::CtrlSocket;
    use softap_core::process::CommandProcess;

    tracing::info!(
        "Using wpa_supplicant control socket in {}",
        config.supplicant.ctrl_dir.display()
    );
    (
        Arc::new(CtrlSocket::new(&config.supplicant)),
        Arc::new(CommandProcess::new(&config.supplicant)),
    )
}

#[cfg(feature = "backend_mock")]
fn get_supplicant(
    _config: &SoftapConfig,
) -> (Arc<dyn SupplicantControl>, Arc<dyn SupplicantProcess>) {
    tracing::info!("Using mock supplicant");
    let mock = softap_core::mock::MockSupplicant::new();
    (mock.clone(), mock)
}

// --- 2. 加载配置：$SOFTAP_CONFIG > 第一个命令行参数 > 内置默认配置 ---
fn load_config() -> anyhow::Result<SoftapConfig> {
    let path = std::env::var_os("SOFTAP_CONFIG").or_else(|| std::env::args_os().nth(1));
    match path {
        Some(path) => SoftapConfig::load(&path)
            .with_context(|| format!("Failed to load config from {}", path.to_string_lossy())),
        None => SoftapConfig::embedded().context("Embedded config is invalid"),
    }
}

// --- 3. 运行命令循环 ---
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("softap_core=info,softap_daemon=info")),
        )
        .init();

    let config = load_config()?;
    let (control, process) = get_supplicant(&config);
    let reporter = notifier::create_reporter(&config.notifier);
    let mut session = SessionController::new(&config, control, process, reporter);

    tracing::info!("SoftAP controller ready, reading commands from stdin");
    tokio::select! {
        result = runner::run(&mut session, BufReader::new(tokio::io::stdin()), tokio::io::stdout()) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted"),
    }

    // 退出前恢复 STA 模式
    if let Err(e) = session.shutdown().await {
        tracing::error!("SoftAP teardown failed: {}", e);
    }
    Ok(())
}
