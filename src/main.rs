//! Analyst - 数据分析智能体
//!
//! 入口：初始化日志、加载配置、组装引擎，逐行读取用户输入并输出每轮回复。
//! Ctrl-C 在轮次进行中取消当前轮（本轮以 System Failure 回复结束），空闲时退出；
//! 输入 `/reset` 清空历史，`/quit` 退出。

use std::path::PathBuf;
use std::sync::Arc;

use analyst::agent::{create_engine, Session};
use analyst::config::load_config;
use analyst::observability;
use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if let Ok(json) = serde_json::to_string(&event) {
                tracing::debug!(event = %json, "workflow event");
            }
        }
    });

    let engine = create_engine(&cfg)
        .context("Failed to create engine")?
        .with_event_tx(event_tx);
    let mut session = Session::new(Arc::new(engine), cfg.app.max_context_turns);

    // 信号处理器一经安装就常驻进程，只监听一次，转发到 channel
    let (interrupt_tx, mut interrupts) = mpsc::unbounded_channel::<()>();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if interrupt_tx.send(()).is_err() {
                break;
            }
        }
    });

    let name = cfg.app.name.clone().unwrap_or_else(|| "analyst".to_string());
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        stdout.write_all(format!("{name}> ").as_bytes()).await?;
        stdout.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            Some(()) = interrupts.recv() => None,
        };
        let Some(line) = line else {
            break;
        };
        let input = line.trim();
        match input {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                session.reset();
                continue;
            }
            _ => {}
        }

        let outcome = session.send_until_interrupted(input, &mut interrupts).await;

        stdout
            .write_all(format!("{}\n\n", outcome.reply).as_bytes())
            .await?;
    }

    Ok(())
}
