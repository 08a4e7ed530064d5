//! stdin 命令循环：每行一个 netd 风格的命令，每条命令回复一行结果。

use softap_core::SessionController;
use std::fmt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

const OK: u16 = 200;
const FAILED: u16 = 400;

/// One response line: `<code> <result> <message>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub result: i32,
    pub message: String,
}

impl Response {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            code: OK,
            result: 0,
            message: message.into(),
        }
    }

    fn failed(result: i32, message: impl Into<String>) -> Self {
        Self {
            code: FAILED,
            result,
            message: message.into(),
        }
    }

    fn from_result(result: softap_core::Result<()>, done: &str, failed: &str) -> Self {
        match result {
            Ok(()) => Self::ok(done),
            Err(e) => Self::failed(e.code(), format!("{}: {}", failed, e)),
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.code, self.result, self.message)
    }
}

fn syntax_error(message: &str) -> Response {
    Response::failed(-22, message)
}

/// Runs one command. `argv[0]` is the command family (`softap` or `tether`).
pub async fn dispatch(session: &mut SessionController, argv: &[&str]) -> Response {
    match argv {
        ["softap", "start", ..] => Response::from_result(
            session.start_softap().await,
            "Softap operation succeeded",
            "Softap start failed",
        ),
        ["softap", "stop", ..] => Response::from_result(
            session.stop_softap().await,
            "Softap operation succeeded",
            "Softap stop failed",
        ),
        ["softap", "status", ..] => {
            if session.is_softap_started() {
                Response::ok("Softap service is running")
            } else {
                Response::ok("Softap service is not running")
            }
        }
        ["softap", "clients", ..] => match session.clients_softap().await {
            Ok(clients) => Response::ok(clients.join(" ")),
            Err(e) => Response::failed(e.code(), format!("Failed to get clients: {}", e)),
        },
        ["softap", "fwreload", ..] => {
            if argv.len() < 4 {
                return syntax_error("Usage: softap fwreload <iface> <AP|STA|P2P>");
            }
            Response::from_result(
                session.fw_reload_softap(argv).await,
                "Softap operation succeeded",
                "Softap fwreload failed",
            )
        }
        ["softap", "set", ..] => Response::from_result(
            session.set_softap(argv).await,
            "Softap operation succeeded",
            "Softap set failed",
        ),
        ["softap", ..] => syntax_error("Softap Unknown cmd"),
        ["tether", "on"] => {
            session.report_tethering(true).await;
            Response::ok("Tether operation succeeded")
        }
        ["tether", "off"] => {
            session.report_tethering(false).await;
            Response::ok("Tether operation succeeded")
        }
        ["tether", ..] => syntax_error("Usage: tether on|off"),
        _ => syntax_error("Unknown command"),
    }
}

/// 读取命令直到输入结束
pub async fn run<R, W>(session: &mut SessionController, reader: R, mut writer: W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let argv: Vec<&str> = line.split_whitespace().collect();
        if argv.is_empty() {
            continue;
        }

        tracing::debug!("Command: {:?}", argv);
        let response = dispatch(session, &argv).await;
        if response.code != OK {
            tracing::warn!("{:?} -> {}", argv, response);
        }
        writer.write_all(format!("{}\n", response).as_bytes()).await?;
        writer.flush().await?;
    }
    tracing::info!("Command input closed");
    Ok(())
}
