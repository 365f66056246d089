// NoNet Linux: LAN transport, session event loop and terminal chat.

mod config;
mod discovery;
mod event_loop;
mod transport;
mod ui;

use std::time::Duration;

use anyhow::Context;
use nonet_core::{LocalIdentity, Notifier, Session};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::event_loop::{ChannelNotifier, Command};
use crate::transport::LanTransport;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    for arg in std::env::args().skip(1) {
        if arg == "--version" || arg == "-V" {
            println!("nonet-linux {}", VERSION);
            return Ok(());
        }
    }

    init_logging();
    let cfg = config::load();
    let identity = cfg.identity();

    let rt = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    let result = rt.block_on(run(cfg, identity));
    // The stdin reader sits in a blocking read; don't wait for it.
    rt.shutdown_background();
    result
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run(cfg: config::Config, identity: LocalIdentity) -> anyhow::Result<()> {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (note_tx, note_rx) = mpsc::unbounded_channel();

    let transport = LanTransport::new(cfg.discovery_port, cfg.transport_port, cmd_tx.clone());
    info!(
        name = identity.name(),
        endpoint = %transport.local_id(),
        version = VERSION,
        "starting"
    );
    let mut session = Session::new(
        identity,
        cfg.session_config(),
        transport,
        ChannelNotifier::new(note_tx),
    );
    let ready = format!("Ready as {} (type /help)", session.local_name());
    session.notifier_mut().on_status(&ready);

    let printer = tokio::spawn(ui::print_notifications(note_rx));
    tokio::spawn(ui::read_commands(cmd_tx.clone()));
    let quit_tx = cmd_tx;
    tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(()) => {
                let _ = quit_tx.send(Command::Quit);
            }
            Err(e) => tracing::warn!(error = %e, "signal handler unavailable"),
        }
    });

    let session = event_loop::run(session, cmd_rx).await;
    session.transport().flush(Duration::from_millis(500)).await;
    // Dropping the session closes the notification channel so the printer drains and exits.
    drop(session);
    printer.await.context("printer task failed")?;
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
