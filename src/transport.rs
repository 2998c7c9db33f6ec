//! UDP transport loop.
//!
//! One nonblocking socket is bound to the worker's listen address and used
//! both to receive job-control datagrams and to send replies to the host's
//! fixed address. The loop runs on its own thread and talks to the scheduler
//! only through the two bounded queues returned by [`spawn`].

use crate::config::WorkerConfig;
use crate::error::{CookieBakerError, Result};
use crate::protocol::{self, Message};
use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

/// Owns the transport thread. Dropping the handle stops the loop.
pub struct TransportHandle {
    is_running: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<()>>>,
    local_addr: SocketAddr,
}

impl TransportHandle {
    /// Address the receive socket actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    /// Whether the loop thread has exited, for whatever reason.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Asks the loop to flush and exit, then joins it.
    pub fn stop(&mut self) -> Result<()> {
        self.is_running.store(false, Ordering::Relaxed);
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| CookieBakerError::Transport("transport thread panicked".into()))?,
            None => Ok(()),
        }
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::warn!("Transport did not stop cleanly: {}", err);
        }
    }
}

/// Binds the socket, sends `UpAndRunning` and starts the loop thread.
///
/// Returns the handle, the inbound queue of host requests and the outbound
/// queue the scheduler pushes encoded messages into.
pub fn spawn(
    config: &WorkerConfig,
) -> Result<(TransportHandle, Receiver<Message>, Sender<Vec<u8>>)> {
    let socket = UdpSocket::bind(config.listen_addr())?;
    socket.set_nonblocking(true)?;
    let local_addr = socket.local_addr()?;
    let remote_addr = config.remote_addr();

    log::info!("Listening on {}, replying to {}", local_addr, remote_addr);

    let (inbound_tx, inbound_rx) = bounded(config.queue_capacity);
    let (outbound_tx, outbound_rx) = bounded(config.queue_capacity);

    let transport = Transport {
        socket,
        remote_addr,
        inbound: inbound_tx,
        outbound: outbound_rx,
        recv_buffer: vec![0; config.max_datagram_size.max(protocol::ENVELOPE_HEADER_LEN)],
        max_datagram_size: config.max_datagram_size,
        poll_interval: config.poll_interval,
    };
    transport.send_datagram(&protocol::encode(&Message::UpAndRunning));

    let is_running = Arc::new(AtomicBool::new(true));
    let loop_running = is_running.clone();
    let thread = std::thread::Builder::new()
        .name("cookie-baker-transport".into())
        .spawn(move || transport.run(&loop_running))?;

    Ok((
        TransportHandle {
            is_running,
            thread: Some(thread),
            local_addr,
        },
        inbound_rx,
        outbound_tx,
    ))
}

struct Transport {
    socket: UdpSocket,
    remote_addr: SocketAddr,
    inbound: Sender<Message>,
    outbound: Receiver<Vec<u8>>,
    recv_buffer: Vec<u8>,
    max_datagram_size: usize,
    poll_interval: Duration,
}

impl Transport {
    fn run(mut self, is_running: &AtomicBool) -> Result<()> {
        while is_running.load(Ordering::Relaxed) {
            let receive_open = self.receive_all()?;
            let send_open = self.flush_outbound();
            if !receive_open {
                log::debug!("Scheduler dropped the inbound queue, stopping transport");
                break;
            }
            if !send_open {
                log::debug!("Scheduler dropped the outbound queue, stopping transport");
                break;
            }
            std::thread::sleep(self.poll_interval);
        }

        self.flush_outbound();
        is_running.store(false, Ordering::Relaxed);
        log::info!("Transport stopped");
        Ok(())
    }

    /// Reads every datagram currently waiting on the socket. Returns false once
    /// nobody consumes the inbound queue any more.
    fn receive_all(&mut self) -> Result<bool> {
        loop {
            let len = match self.socket.recv_from(&mut self.recv_buffer) {
                Ok((len, _from)) => len,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(true),
                Err(err) if is_transient(err.kind()) => {
                    log::trace!("Ignoring transient receive error: {}", err);
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            let message = match protocol::decode(&self.recv_buffer[..len]) {
                Ok(message) => message,
                Err(err) => {
                    log::trace!("Dropping {} byte datagram: {}", len, err);
                    continue;
                }
            };

            if !message.tag().is_inbound() {
                log::trace!("Dropping outbound-only {:?} from host", message.tag());
                continue;
            }

            match self.inbound.try_send(message) {
                Ok(()) => {}
                Err(TrySendError::Full(message)) => {
                    log::warn!("Inbound queue full, dropping {:?}", message.tag())
                }
                Err(TrySendError::Disconnected(_)) => return Ok(false),
            }
        }
    }

    /// Sends everything the scheduler has queued. Returns false once the
    /// scheduler side of the queue is gone.
    fn flush_outbound(&mut self) -> bool {
        loop {
            match self.outbound.try_recv() {
                Ok(bytes) => self.send_datagram(&bytes),
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn send_datagram(&self, bytes: &[u8]) {
        if bytes.len() > self.max_datagram_size {
            log::warn!(
                "Dropping {} byte message, larger than the {} byte datagram limit",
                bytes.len(),
                self.max_datagram_size
            );
            return;
        }
        if let Err(err) = self.socket.send_to(bytes, self.remote_addr) {
            log::warn!("Failed to send to {}: {}", self.remote_addr, err);
        }
    }
}

/// Errors a connectionless socket reports for earlier sends to a closed port.
fn is_transient(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::ConnectionReset | ErrorKind::ConnectionRefused | ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MessageTag;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Instant;

    fn loopback_pair() -> (UdpSocket, WorkerConfig) {
        let host = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        host.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let config = WorkerConfig::new(0, host.local_addr().unwrap().port())
            .bind_host(IpAddr::V4(Ipv4Addr::LOCALHOST));
        (host, config)
    }

    fn recv_message(socket: &UdpSocket) -> Message {
        let mut buffer = vec![0; 2048];
        let (len, _) = socket.recv_from(&mut buffer).unwrap();
        protocol::decode(&buffer[..len]).unwrap()
    }

    fn recv_inbound(inbound: &Receiver<Message>) -> Message {
        inbound.recv_timeout(Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_handshake_and_outbound_flush() {
        let (host, config) = loopback_pair();
        let (mut handle, _inbound, outbound) = spawn(&config).unwrap();
        assert!(handle.is_running());

        assert_eq!(recv_message(&host), Message::UpAndRunning);

        outbound
            .send(protocol::encode(&Message::WorkloadComplete { workload_id: 3 }))
            .unwrap();
        assert_eq!(recv_message(&host), Message::WorkloadComplete { workload_id: 3 });

        handle.stop().unwrap();
        assert!(handle.is_finished());
    }

    #[test]
    fn test_forwards_only_inbound_kinds() {
        let (host, config) = loopback_pair();
        let (mut handle, inbound, _outbound) = spawn(&config).unwrap();
        recv_message(&host);
        let worker = SocketAddr::from((Ipv4Addr::LOCALHOST, handle.local_addr().port()));

        host.send_to(&protocol::encode(&Message::UpAndRunning), worker).unwrap();
        host.send_to(&[0xEE, 0, 0, 0, 0], worker).unwrap();
        host.send_to(&[MessageTag::CancelWorkload as u8, 4, 0], worker).unwrap();
        host.send_to(
            &protocol::encode(&Message::CancelWorkload { workload_id: 12 }),
            worker,
        )
        .unwrap();
        host.send_to(&protocol::encode(&Message::ShutdownMessage), worker).unwrap();

        assert_eq!(recv_inbound(&inbound), Message::CancelWorkload { workload_id: 12 });
        assert_eq!(recv_inbound(&inbound), Message::ShutdownMessage);
        assert!(inbound.try_recv().is_err());

        handle.stop().unwrap();
    }

    #[test]
    fn test_oversized_outbound_is_dropped() {
        let (host, config) = loopback_pair();
        let config = config.max_datagram_size(16);
        let (mut handle, _inbound, outbound) = spawn(&config).unwrap();
        recv_message(&host);

        outbound.send(vec![0; 64]).unwrap();
        outbound
            .send(protocol::encode(&Message::WorkloadReceived { workload_id: 1 }))
            .unwrap();
        assert_eq!(recv_message(&host), Message::WorkloadReceived { workload_id: 1 });

        handle.stop().unwrap();
    }

    #[test]
    fn test_stops_when_scheduler_side_drops() {
        let (_host, config) = loopback_pair();
        let (handle, inbound, outbound) = spawn(&config).unwrap();
        drop(inbound);
        drop(outbound);

        let deadline = Instant::now() + Duration::from_secs(2);
        while !handle.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(handle.is_finished());
    }
}
