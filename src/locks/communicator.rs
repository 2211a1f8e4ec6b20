//! Out-of-band contention pings over UDP.
//!
//! A process waiting for a lock sends one datagram to the port the owner
//! advertised in the information region. The payload is the absolute path of
//! the target, length-prefixed UTF-8. There is no acknowledgement: this only
//! shortens the wait, the region lock stays the source of truth.

use super::codec::{self, CodecError};
use crate::error::{CacheLockError, Result};
use std::io::{self, Cursor};
use std::net::{Ipv4Addr, UdpSocket};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

const MAX_DATAGRAM_SIZE: usize = u16::MAX as usize + 2;

// Bounds how long `receive` can miss a `stop` whose wake-up datagram was lost.
const RECEIVE_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug)]
struct Bound {
    socket: Arc<UdpSocket>,
    port: u16,
}

/// Sends and receives contention pings.
///
/// All methods take `&self` so the receiving thread and the thread calling
/// [`stop`](Self::stop) can share one instance.
#[derive(Debug, Default)]
pub struct FileLockCommunicator {
    bound: Mutex<Option<Bound>>,
    stopped: AtomicBool,
}

impl FileLockCommunicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send one ping for `target` to `localhost:port`.
    pub fn ping_owner(port: u16, target: &Path) -> Result<()> {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))?;
        let bytes = encode_path(target)?;
        socket.send_to(&bytes, (Ipv4Addr::LOCALHOST, port))?;
        Ok(())
    }

    /// Bind an ephemeral local port.
    pub fn start(&self) -> Result<()> {
        let mut bound = self.bound.lock().unwrap_or_else(PoisonError::into_inner);
        if bound.is_some() || self.stopped.load(Ordering::SeqCst) {
            return Err(CacheLockError::CommunicatorAlreadyStarted);
        }
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))?;
        socket.set_read_timeout(Some(RECEIVE_POLL_INTERVAL))?;
        let port = socket.local_addr()?.port();
        *bound = Some(Bound {
            socket: Arc::new(socket),
            port,
        });
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.bound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// The bound port.
    pub fn port(&self) -> Result<u16> {
        self.bound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|bound| bound.port)
            .ok_or(CacheLockError::CommunicatorNotStarted)
    }

    /// Block until a ping arrives and return the pinged path.
    ///
    /// Returns `Ok(None)` once [`stop`](Self::stop) has been called, including
    /// when the stop happens while this call is blocked.
    pub fn receive(&self) -> Result<Option<PathBuf>> {
        let socket = {
            let bound = self.bound.lock().unwrap_or_else(PoisonError::into_inner);
            match bound.as_ref() {
                Some(bound) => Arc::clone(&bound.socket),
                None if self.stopped.load(Ordering::SeqCst) => return Ok(None),
                None => return Err(CacheLockError::CommunicatorNotStarted),
            }
        };

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            if self.stopped.load(Ordering::SeqCst) {
                return Ok(None);
            }
            match socket.recv_from(&mut buf) {
                Ok((len, _)) => {
                    if self.stopped.load(Ordering::SeqCst) {
                        return Ok(None);
                    }
                    return decode_path(&buf[..len])
                        .map(Some)
                        .map_err(CacheLockError::InvalidPing);
                }
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    continue;
                }
                Err(_) if self.stopped.load(Ordering::SeqCst) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Stop receiving and release the socket.
    ///
    /// A `receive` blocked on another thread returns `Ok(None)`.
    pub fn stop(&self) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        let bound = self
            .bound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(CacheLockError::CommunicatorNotStarted)?;

        // Wake a blocked receiver right away instead of at its next poll.
        if let Err(e) = bound.socket.send_to(&[], (Ipv4Addr::LOCALHOST, bound.port)) {
            tracing::debug!(port = bound.port, "failed to wake contention receiver: {}", e);
        }
        Ok(())
    }
}

fn encode_path(target: &Path) -> Result<Vec<u8>> {
    let absolute = std::path::absolute(target)?;
    let mut out = Vec::new();
    codec::write_utf(&mut out, &absolute.to_string_lossy()).map_err(CacheLockError::InvalidPing)?;
    Ok(out)
}

fn decode_path(bytes: &[u8]) -> std::result::Result<PathBuf, CodecError> {
    let mut cursor = Cursor::new(bytes);
    codec::read_utf(&mut cursor).map(PathBuf::from)
}
