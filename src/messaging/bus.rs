//! # Message Bus
//!
//! Thin layer over ZeroMQ push/pull sockets. Every process owns exactly one
//! [`Bus`] (one zmq context) and the sockets created from it; sockets are never
//! shared across process boundaries.
//!
//! Sending is explicit about failure: [`PushSocket::try_send`] never blocks and
//! reports "nobody is listening" as [`TransportError::NoPeers`], so callers can
//! branch on the returned status instead of on a caught failure.

use std::time::Duration;
use tracing::{debug, info};
use zmq::{Context, Socket, SocketType};

use crate::config::TransportConfig;
use crate::error::TransportError;

/// Per-process bus handle
pub struct Bus {
    context: Context,
    transport: TransportConfig,
}

impl Bus {
    pub fn new(transport: TransportConfig) -> Self {
        Self {
            context: Context::new(),
            transport,
        }
    }

    pub fn transport(&self) -> &TransportConfig {
        &self.transport
    }

    /// Fan-out push connection to every endpoint in `endpoints`
    pub fn push_connect(&self, endpoints: &[String]) -> Result<PushSocket, TransportError> {
        if endpoints.is_empty() {
            return Err(TransportError::NoEndpoints);
        }

        let socket = self.socket(SocketType::PUSH, "PUSH")?;
        for endpoint in endpoints {
            socket
                .connect(endpoint)
                .map_err(|e| TransportError::connect(endpoint, e))?;
            debug!(endpoint = %endpoint, "Push socket connected");
        }

        // Allow handshakes to complete before the first send
        if self.transport.connect_settle_ms > 0 {
            std::thread::sleep(Duration::from_millis(self.transport.connect_settle_ms));
        }

        Ok(PushSocket {
            socket,
            endpoints: endpoints.to_vec(),
        })
    }

    /// Push socket bound to `endpoint` (the coordinator's distribution side)
    pub fn push_bind(&self, endpoint: &str) -> Result<PushSocket, TransportError> {
        let socket = self.socket(SocketType::PUSH, "PUSH")?;
        socket
            .bind(endpoint)
            .map_err(|e| TransportError::bind(endpoint, e))?;
        info!(endpoint = %endpoint, "Push socket bound");

        Ok(PushSocket {
            socket,
            endpoints: vec![endpoint.to_string()],
        })
    }

    pub fn pull_bind(&self, endpoint: &str) -> Result<PullSocket, TransportError> {
        let socket = self.socket(SocketType::PULL, "PULL")?;
        socket
            .bind(endpoint)
            .map_err(|e| TransportError::bind(endpoint, e))?;
        info!(endpoint = %endpoint, "Pull socket bound");

        Ok(PullSocket {
            socket,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn pull_connect(&self, endpoint: &str) -> Result<PullSocket, TransportError> {
        let socket = self.socket(SocketType::PULL, "PULL")?;
        socket
            .connect(endpoint)
            .map_err(|e| TransportError::connect(endpoint, e))?;
        debug!(endpoint = %endpoint, "Pull socket connected");

        Ok(PullSocket {
            socket,
            endpoint: endpoint.to_string(),
        })
    }

    fn socket(&self, kind: SocketType, name: &'static str) -> Result<Socket, TransportError> {
        let socket = self
            .context
            .socket(kind)
            .map_err(|e| TransportError::socket_create(name, e))?;

        socket
            .set_linger(self.transport.linger_ms)
            .map_err(|e| TransportError::socket_option("linger", e))?;

        match kind {
            SocketType::PUSH => {
                socket
                    .set_sndhwm(self.transport.send_hwm)
                    .map_err(|e| TransportError::socket_option("sndhwm", e))?;
                socket
                    .set_immediate(self.transport.immediate)
                    .map_err(|e| TransportError::socket_option("immediate", e))?;
            }
            _ => {
                socket
                    .set_rcvhwm(self.transport.recv_hwm)
                    .map_err(|e| TransportError::socket_option("rcvhwm", e))?;
            }
        }

        Ok(socket)
    }
}

/// Sending half of a push/pull pair
pub struct PushSocket {
    socket: Socket,
    endpoints: Vec<String>,
}

impl PushSocket {
    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Queue `payload` without blocking
    pub fn try_send(&self, payload: &[u8]) -> Result<(), TransportError> {
        self.socket
            .send(payload, zmq::DONTWAIT)
            .map_err(TransportError::from_send)
    }

    /// Send `payload`, waiting at most `timeout` for a peer to accept it
    pub fn send_timeout(&self, payload: &[u8], timeout: Duration) -> Result<(), TransportError> {
        self.socket
            .set_sndtimeo(duration_to_millis(timeout))
            .map_err(|e| TransportError::socket_option("sndtimeo", e))?;
        self.socket.send(payload, 0).map_err(TransportError::from_send)
    }
}

/// Receiving half of a push/pull pair
pub struct PullSocket {
    socket: Socket,
    endpoint: String,
}

impl PullSocket {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Endpoint actually bound, resolving wildcard ports such as `tcp://127.0.0.1:*`
    pub fn bound_endpoint(&self) -> String {
        match self.socket.get_last_endpoint() {
            Ok(Ok(endpoint)) if !endpoint.is_empty() => endpoint,
            _ => self.endpoint.clone(),
        }
    }

    /// Receive one message if one is already queued
    pub fn try_recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        match self.socket.recv_bytes(zmq::DONTWAIT) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(zmq::Error::EAGAIN) | Err(zmq::Error::EINTR) => Ok(None),
            Err(e) => Err(TransportError::receive(e)),
        }
    }

    /// Wait up to `timeout` for one message
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        match self.socket.poll(zmq::POLLIN, duration_to_millis(timeout) as i64) {
            Ok(0) | Err(zmq::Error::EINTR) => Ok(None),
            Ok(_) => self.try_recv(),
            Err(e) => Err(TransportError::poll(e)),
        }
    }
}

/// Wait until any of `sockets` is readable; returns readiness per socket.
///
/// An interrupted wait reports nothing readable.
pub fn poll_readable(
    sockets: &[&PullSocket],
    timeout: Duration,
) -> Result<Vec<bool>, TransportError> {
    let mut items: Vec<zmq::PollItem<'_>> = sockets
        .iter()
        .map(|s| s.socket.as_poll_item(zmq::POLLIN))
        .collect();

    match zmq::poll(&mut items, duration_to_millis(timeout) as i64) {
        Ok(_) => Ok(items.iter().map(|item| item.is_readable()).collect()),
        Err(zmq::Error::EINTR) => Ok(vec![false; sockets.len()]),
        Err(e) => Err(TransportError::poll(e)),
    }
}

fn duration_to_millis(duration: Duration) -> i32 {
    i32::try_from(duration.as_millis()).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_transport() -> TransportConfig {
        TransportConfig {
            connect_settle_ms: 50,
            ..Default::default()
        }
    }

    #[test]
    fn test_push_without_endpoints_is_rejected() {
        let bus = Bus::new(quick_transport());
        assert!(matches!(
            bus.push_connect(&[]),
            Err(TransportError::NoEndpoints)
        ));
    }

    #[test]
    fn test_push_to_absent_peer_reports_no_peers() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = format!("ipc://{}/nobody.sock", dir.path().display());

        let bus = Bus::new(quick_transport());
        let push = bus.push_connect(&[endpoint]).unwrap();
        assert!(matches!(push.try_send(b"hello"), Err(TransportError::NoPeers)));
    }

    #[test]
    fn test_push_pull_delivery_and_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = format!("ipc://{}/pair.sock", dir.path().display());

        let bus = Bus::new(quick_transport());
        let pull = bus.pull_bind(&endpoint).unwrap();
        assert_eq!(pull.recv_timeout(Duration::from_millis(20)).unwrap(), None);

        let push = bus.push_connect(&[endpoint]).unwrap();
        push.try_send(b"payload").unwrap();

        let received = pull.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(received.as_deref(), Some(&b"payload"[..]));
    }

    #[test]
    fn test_wildcard_bind_reports_real_endpoint() {
        let bus = Bus::new(quick_transport());
        let pull = bus.pull_bind("tcp://127.0.0.1:*").unwrap();
        let bound = pull.bound_endpoint();
        assert!(bound.starts_with("tcp://127.0.0.1:"));
        assert!(!bound.ends_with('*'));
    }

    #[test]
    fn test_poll_readable_flags_ready_socket() {
        let dir = tempfile::tempdir().unwrap();
        let first = format!("ipc://{}/first.sock", dir.path().display());
        let second = format!("ipc://{}/second.sock", dir.path().display());

        let bus = Bus::new(quick_transport());
        let a = bus.pull_bind(&first).unwrap();
        let b = bus.pull_bind(&second).unwrap();
        let push = bus.push_connect(&[second]).unwrap();
        push.try_send(b"x").unwrap();

        let mut ready = vec![false, false];
        for _ in 0..50 {
            ready = poll_readable(&[&a, &b], Duration::from_millis(100)).unwrap();
            if ready[1] {
                break;
            }
        }
        assert_eq!(ready, vec![false, true]);
    }
}
