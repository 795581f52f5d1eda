//! The serial transport: reader/writer tasks, inter-packet pacing, and
//! retry/timeout correlation against the outbound queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tokio_serial::SerialPortBuilderExt;

use crate::clock::Clock;
use crate::error::Error;
use crate::message::Message;
use crate::qos::{Command, OutboundQueue, PendingCommand};

/// The minimum gap between two outbound writes.
pub const INTER_PACKET_GAP: Duration = Duration::from_millis(50);

/// Baud rate for an HGI80-compatible USB dongle (grounded in the
/// original's `PortPktProvider.BAUDRATE`).
pub const BAUD_RATE: u32 = 115_200;

/// Opens the serial port at `path`, matching the original's
/// `PortPktProvider` construction (fixed baud, no flow control beyond
/// what the dongle firmware itself paces).
pub fn open_serial_port(path: &str) -> Result<tokio_serial::SerialStream, Error> {
    Ok(tokio_serial::new(path, BAUD_RATE).open_native_async()?)
}

/// The reader task: reads lines off `port`, decodes them into
/// [`Message`]s, and forwards valid ones on `messages_tx`. Invalid lines
/// are logged and dropped, never stopping the stream.
pub async fn run_reader<R: AsyncRead + Unpin>(
    port: R,
    clock: Arc<dyn Clock>,
    messages_tx: mpsc::Sender<Message>,
) {
    let mut lines = BufReader::new(port).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match Message::from_line(&line, clock.as_ref()) {
                Ok(message) => {
                    log::debug!("decoded message: {message}");
                    if messages_tx.send(message).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    log::warn!("dropping invalid packet ({err}): {line}");
                }
            },
            Ok(None) => break,
            Err(err) => {
                log::warn!("serial read failed, will attempt to continue: {err}");
            }
        }
    }
}

/// The writer task: dequeues commands in priority order, writes the
/// framed ASCII command, paces by [`INTER_PACKET_GAP`], and tracks
/// in-flight commands awaiting a correlated response for retry.
pub async fn run_writer<W: AsyncWrite + Unpin>(
    port: Arc<Mutex<W>>,
    queue: Arc<OutboundQueue>,
    mut responses_rx: mpsc::Receiver<Message>,
) {
    let mut pending: Vec<PendingCommand> = Vec::new();

    loop {
        tokio::select! {
            maybe_command = queue.pop() => {
                if let Some(command) = maybe_command {
                    if let Err(err) = write_command(&port, &command).await {
                        log::warn!("failed writing command: {err}");
                        continue;
                    }
                    tokio::time::sleep(INTER_PACKET_GAP).await;
                    if command.expected_response_verb().is_some() {
                        pending.push(PendingCommand::new(command));
                    }
                } else {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
            Some(response) = responses_rx.recv() => {
                pending.retain(|p| !correlates(&p.command, &response));
            }
        }

        retry_expired(&queue, &mut pending).await;
    }
}

fn correlates(command: &Command, response: &Message) -> bool {
    command.expected_response_verb() == Some(response.verb) && command.code == response.code && command.dst == response.src
}

async fn retry_expired(queue: &Arc<OutboundQueue>, pending: &mut Vec<PendingCommand>) {
    let now = std::time::Instant::now();
    let mut remaining = Vec::with_capacity(pending.len());
    for mut p in pending.drain(..) {
        if p.is_expired(now) {
            if p.command.retries > 0 {
                p.command.retries -= 1;
                log::debug!("retrying command for code {} ({} retries left)", p.command.code, p.command.retries);
                queue.push(p.command.clone()).await;
            } else {
                log::warn!("command for code {} exhausted retries, giving up", p.command.code);
            }
        } else {
            remaining.push(p);
        }
    }
    *pending = remaining;
}

async fn write_command<W: AsyncWrite + Unpin>(port: &Arc<Mutex<W>>, command: &Command) -> Result<(), Error> {
    let line = format!("{} {} {}\r\n", command.verb, command.code, command.payload_hex);
    let mut guard = port.lock().await;
    guard.write_all(line.as_bytes()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::DeviceId;
    use crate::code::Code;
    use crate::qos::Priority;
    use crate::verb::Verb;

    fn cmd(verb: Verb, retries: u8) -> Command {
        Command::new(Priority::Normal, verb, Code::from_u16(0x2309), DeviceId::absent(), String::new(), retries, Duration::from_millis(0))
    }

    #[test]
    fn write_and_bind_commands_correlate_on_their_own_echo() {
        assert_eq!(cmd(Verb::W, 0).expected_response_verb(), Some(Verb::I));
        assert_eq!(cmd(Verb::I, 0).expected_response_verb(), Some(Verb::I));
        assert_eq!(cmd(Verb::RQ, 0).expected_response_verb(), Some(Verb::RP));
        assert_eq!(cmd(Verb::RP, 0).expected_response_verb(), None);
    }

    #[tokio::test]
    async fn expired_write_command_is_requeued_with_fewer_retries() {
        let queue = Arc::new(OutboundQueue::new());
        let mut pending = vec![PendingCommand::new(cmd(Verb::W, 2))];
        retry_expired(&queue, &mut pending).await;
        assert!(pending.is_empty());
        let retried = queue.pop().await.expect("expired write command requeued");
        assert_eq!(retried.verb, Verb::W);
        assert_eq!(retried.retries, 1);
    }

    #[tokio::test]
    async fn expired_command_with_no_retries_left_is_dropped() {
        let queue = Arc::new(OutboundQueue::new());
        let mut pending = vec![PendingCommand::new(cmd(Verb::W, 0))];
        retry_expired(&queue, &mut pending).await;
        assert!(pending.is_empty());
        assert!(queue.pop().await.is_none());
    }
}
