//! The message-oriented channel a `Connection` sends and receives ATT PDUs over.
//!
//! The transport is a collaborator, not a subject of this crate: L2CAP preserves message
//! boundaries (one `read_message` yields exactly one ATT PDU) and this crate never reassembles
//! or fragments across calls. `Transport` is the seam; `linux::LinuxL2capSocket` is the one
//! concrete implementation this crate ships, gated behind the `linux-transport` feature so the
//! codec, connection engine, and GATT client build on any target.

use std::fmt;

#[cfg(feature = "linux-transport")]
pub mod linux;

/// A message-oriented byte channel. One call to `write_message` corresponds to exactly one call
/// to the peer's `read_message`; neither side splits or coalesces messages.
pub trait Transport {
    /// Block until the next message arrives. `Ok(None)` means the peer closed the channel
    /// cleanly; no further messages will arrive.
    fn read_message(&mut self) -> Result<Option<Vec<u8>>, TransportError>;

    /// Send one message. Blocks until the underlying channel has accepted it.
    fn write_message(&mut self, data: &[u8]) -> Result<(), TransportError>;
}

#[derive(Debug)]
pub enum TransportError {
    Io(std::io::Error),
    /// The channel was closed locally; further use is a programmer error, not a retryable I/O
    /// condition.
    Closed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransportError::Io(e) => write!(f, "transport I/O error: {}", e),
            TransportError::Closed => write!(f, "transport is closed"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Io(e) => Some(e),
            TransportError::Closed => None,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io(e)
    }
}

/// An in-memory pair of transports for tests, grounded in the same two-ends-of-one-channel shape
/// as a real L2CAP socket pair but backed by a `Mutex`+`Condvar` queue instead of a socket fd.
pub mod paired {
    use super::{Transport, TransportError};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Condvar, Mutex};

    type Queue = Arc<(Mutex<VecDeque<Vec<u8>>>, Condvar)>;

    pub struct PairedTransport {
        inbox: Queue,
        outbox: Queue,
        closed: Arc<AtomicBool>,
    }

    impl PairedTransport {
        /// Create two ends of one channel; each end's writes are the other's reads.
        pub fn pair() -> (PairedTransport, PairedTransport) {
            let a: Queue = Arc::new((Mutex::new(VecDeque::new()), Condvar::new()));
            let b: Queue = Arc::new((Mutex::new(VecDeque::new()), Condvar::new()));
            let closed = Arc::new(AtomicBool::new(false));

            (
                PairedTransport { inbox: a.clone(), outbox: b.clone(), closed: closed.clone() },
                PairedTransport { inbox: b, outbox: a, closed },
            )
        }

        /// Mark the channel closed and wake any end blocked in `read_message`.
        pub fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
            let (lock, cvar) = &*self.inbox;
            drop(lock.lock().unwrap());
            cvar.notify_all();
            let (lock, cvar) = &*self.outbox;
            drop(lock.lock().unwrap());
            cvar.notify_all();
        }
    }

    impl Transport for PairedTransport {
        fn read_message(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
            let (lock, cvar) = &*self.inbox;
            let mut queue = lock.lock().unwrap();
            loop {
                if let Some(message) = queue.pop_front() {
                    return Ok(Some(message));
                }
                if self.closed.load(Ordering::SeqCst) {
                    return Ok(None);
                }
                queue = cvar.wait(queue).unwrap();
            }
        }

        fn write_message(&mut self, data: &[u8]) -> Result<(), TransportError> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(TransportError::Closed);
            }
            let (lock, cvar) = &*self.outbox;
            lock.lock().unwrap().push_back(data.to_vec());
            cvar.notify_all();
            Ok(())
        }
    }

    #[cfg(test)]
    mod test {
        use super::*;

        #[test]
        fn write_on_one_end_is_read_on_the_other() {
            let (mut a, mut b) = PairedTransport::pair();
            a.write_message(&[0x01, 0x02]).unwrap();
            assert_eq!(b.read_message().unwrap(), Some(vec![0x01, 0x02]));
        }

        #[test]
        fn close_unblocks_read_with_eof() {
            let (a, mut b) = PairedTransport::pair();
            a.close();
            assert_eq!(b.read_message().unwrap(), None);
        }

        #[test]
        fn write_after_close_fails() {
            let (mut a, _b) = PairedTransport::pair();
            a.close();
            assert!(matches!(a.write_message(&[0x00]), Err(TransportError::Closed)));
        }
    }
}

pub use paired::PairedTransport;
