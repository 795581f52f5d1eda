//! Lifecycle orchestration: wires the transport, entity registry, and
//! signal handling together.

use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};

use crate::bind_state::{DEFAULT_CONFIRM_TIMEOUT_SECS, DEFAULT_WAITING_TIMEOUT_SECS};
use crate::clock::{Clock, SystemClock};
use crate::entity::EntityRegistry;
use crate::error::Error;
use crate::message::Message;
use crate::qos::OutboundQueue;
use crate::transport;

/// How much of the inbound pipeline to run, per the
/// `reduce_processing` knob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReduceProcessing {
    /// Run the full pipeline: frame → message → entity update.
    Full,
    /// Stop at the packet/frame level; never construct messages.
    DontCreateMessages,
}

impl Default for ReduceProcessing {
    fn default() -> ReduceProcessing {
        ReduceProcessing::Full
    }
}

/// The handful of knobs the core needs from a host binary's configuration
/// (the Environment / CLI surface, realised as a typed struct the
/// core never loads from a file itself).
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub serial_port: String,
    #[serde(default)]
    pub enable_eavesdrop: bool,
    #[serde(default)]
    pub disable_sending: bool,
    #[serde(default)]
    pub reduce_processing: ReduceProcessing,
    #[serde(default = "default_confirm_timeout")]
    pub confirm_timeout_secs: u64,
    #[serde(default = "default_waiting_timeout")]
    pub waiting_timeout_secs: u64,
}

fn default_confirm_timeout() -> u64 {
    DEFAULT_CONFIRM_TIMEOUT_SECS
}

fn default_waiting_timeout() -> u64 {
    DEFAULT_WAITING_TIMEOUT_SECS
}

/// Owns the entity registry and outbound queue, and drives the reader/
/// writer tasks.
#[derive(Debug)]
pub struct Gateway {
    config: GatewayConfig,
    registry: Arc<Mutex<EntityRegistry>>,
    outbound: Arc<OutboundQueue>,
    clock: Arc<dyn Clock>,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Gateway {
        Gateway {
            config,
            registry: Arc::new(Mutex::new(EntityRegistry::new())),
            outbound: Arc::new(OutboundQueue::new()),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn registry(&self) -> Arc<Mutex<EntityRegistry>> {
        Arc::clone(&self.registry)
    }

    pub fn outbound(&self) -> Arc<OutboundQueue> {
        Arc::clone(&self.outbound)
    }

    /// Runs the gateway until a shutdown signal arrives. Spawns the
    /// reader, writer and (on unix) status-dump tasks, applies valid
    /// messages to the registry, and invokes `on_message` for each one (a
    /// callback invoked per valid Message").
    pub async fn run(&self, on_message: impl Fn(&Message) + Send + 'static) -> Result<(), Error> {
        let port = transport::open_serial_port(&self.config.serial_port)?;
        let (read_half, write_half) = tokio::io::split(port);
        let (messages_tx, mut messages_rx) = mpsc::channel::<Message>(256);
        let (responses_tx, responses_rx) = mpsc::channel::<Message>(256);

        let reader_clock = Arc::clone(&self.clock);
        let reader = tokio::spawn(transport::run_reader(read_half, reader_clock, messages_tx));

        let outbound = Arc::clone(&self.outbound);
        let write_port = Arc::new(Mutex::new(write_half));
        let writer = if self.config.disable_sending {
            None
        } else {
            Some(tokio::spawn(transport::run_writer(write_port, outbound, responses_rx)))
        };

        #[cfg(unix)]
        let status_dump = tokio::spawn(status_dump_task(self.registry()));

        let registry = Arc::clone(&self.registry);
        let enable_eavesdrop = self.config.enable_eavesdrop;
        let reduce_processing = self.config.reduce_processing;
        let processor = tokio::spawn(async move {
            while let Some(message) = messages_rx.recv().await {
                if reduce_processing == ReduceProcessing::DontCreateMessages {
                    continue;
                }
                let mut guard = registry.lock().await;
                if let Err(err) = guard.apply(&message, enable_eavesdrop) {
                    log::warn!("corrupt state applying message: {err}");
                }
                drop(guard);
                let _ = responses_tx.try_send(message.clone());
                on_message(&message);
            }
        });

        let shutdown = wait_for_shutdown_signal();
        tokio::select! {
            _ = reader => {}
            _ = processor => {}
            _ = async { if let Some(w) = writer { let _ = w.await; } else { std::future::pending::<()>().await } } => {}
            _ = shutdown => {
                log::info!("shutdown signal received, stopping gateway");
            }
        }

        #[cfg(unix)]
        status_dump.abort();

        Ok(())
    }
}

/// Waits for `SIGINT`/`SIGTERM`/`SIGHUP` (graceful shutdown) while
/// `SIGUSR1`/`SIGUSR2` are handled separately by [`status_dump_task`]
/// without interrupting traffic.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        let mut hup = signal(SignalKind::hangup()).expect("install SIGHUP handler");
        let int = tokio::signal::ctrl_c();
        tokio::pin!(int);
        tokio::select! {
            _ = term.recv() => {}
            _ = hup.recv() => {}
            _ = &mut int => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Dumps gateway status on `SIGUSR1`/`SIGUSR2` without interrupting
/// traffic. Runs as its own task alongside [`Gateway::run`].
#[cfg(unix)]
pub async fn status_dump_task(registry: Arc<Mutex<EntityRegistry>>) {
    use tokio::signal::unix::{signal, SignalKind};
    let mut usr1 = signal(SignalKind::user_defined1()).expect("install SIGUSR1 handler");
    let mut usr2 = signal(SignalKind::user_defined2()).expect("install SIGUSR2 handler");
    loop {
        tokio::select! {
            _ = usr1.recv() => log_status(&registry).await,
            _ = usr2.recv() => log_status(&registry).await,
        }
    }
}

#[cfg(unix)]
async fn log_status(registry: &Arc<Mutex<EntityRegistry>>) {
    let guard = registry.lock().await;
    log::info!(
        "status: main_controller={:?} num_zones={:?} oversized_zone_idx_hits={}",
        guard.main_controller(),
        guard.num_zones(),
        guard.saw_oversized_zone_idx,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_deserializes_with_defaults() {
        let config: GatewayConfig = serde_json::from_str(r#"{"serial_port": "/dev/ttyUSB0"}"#).unwrap();
        assert!(!config.enable_eavesdrop);
        assert_eq!(config.confirm_timeout_secs, DEFAULT_CONFIRM_TIMEOUT_SECS);
        assert_eq!(config.reduce_processing, ReduceProcessing::Full);
    }
}
