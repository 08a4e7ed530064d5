//! 通过外部命令启动/停止 wpa_supplicant 和加载驱动。

use crate::config::SupplicantConfig;
use crate::traits::SupplicantProcess;
use crate::{Error, Result};
use async_trait::async_trait;
use tokio::process::Command;

/// Runs the configured start / stop / driver-load commands, e.g.
/// `start wpa_supplicant` on Android or `wpa_supplicant -B ...` elsewhere.
#[derive(Debug, Clone)]
pub struct CommandProcess {
    start_command: Vec<String>,
    stop_command: Vec<String>,
    driver_load_command: Vec<String>,
}

impl CommandProcess {
    pub fn new(config: &SupplicantConfig) -> Self {
        Self {
            start_command: config.start_command.clone(),
            stop_command: config.stop_command.clone(),
            driver_load_command: config.driver_load_command.clone(),
        }
    }
}

/// Runs `argv` to completion. An empty command line is a no-op.
async fn run(what: &str, argv: &[String]) -> Result<()> {
    let Some((program, args)) = argv.split_first() else {
        tracing::debug!("No {} command configured", what);
        return Ok(());
    };

    tracing::debug!("Running {} command: {:?}", what, argv);
    let output = Command::new(program).args(args).output().await?;
    if !output.status.success() {
        let error_msg = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Io(std::io::Error::other(format!(
            "{} command {:?} failed ({}): {}",
            what,
            argv,
            output.status,
            error_msg.trim_end()
        ))));
    }
    Ok(())
}

#[async_trait]
impl SupplicantProcess for CommandProcess {
    async fn start(&self) -> Result<()> {
        run("supplicant start", &self.start_command).await?;
        tracing::info!("wpa_supplicant start requested");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        run("supplicant stop", &self.stop_command).await?;
        tracing::info!("wpa_supplicant stop requested");
        Ok(())
    }

    async fn load_driver(&self) -> Result<()> {
        run("driver load", &self.driver_load_command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn empty_command_is_noop() {
        run("test", &[]).await.unwrap();
    }

    #[tokio::test]
    async fn exit_status_is_checked() {
        run("test", &argv(&["sh", "-c", "exit 0"])).await.unwrap();

        let err = run("test", &argv(&["sh", "-c", "echo nope >&2; exit 3"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[tokio::test]
    async fn missing_program_is_an_io_error() {
        let err = run("test", &argv(&["/nonexistent/wpa_supplicant"])).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn process_runs_configured_commands() {
        let process = CommandProcess {
            start_command: argv(&["true"]),
            stop_command: argv(&["false"]),
            driver_load_command: Vec::new(),
        };

        process.start().await.unwrap();
        assert!(process.stop().await.is_err());
        process.load_driver().await.unwrap();
    }
}
