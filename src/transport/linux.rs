//! A `Transport` backed by a Linux `AF_BLUETOOTH`/`BTPROTO_L2CAP` socket.
//!
//! This mirrors the raw-socket pattern the HCI transport in this codebase's Linux sibling crate
//! uses (`libc::socket`/`libc::bind` directly, since `AF_BLUETOOTH` address families aren't known
//! to `nix`'s `SockAddr`), but opens an L2CAP `SOCK_SEQPACKET` channel to a specific remote device
//! instead of an HCI `SOCK_RAW` channel to the local controller. `SOCK_SEQPACKET` preserves
//! message boundaries at the kernel level, which is exactly the framing `Transport` requires.

use std::os::unix::io::RawFd;

use super::{Transport, TransportError};

const BTPROTO_L2CAP: i32 = 0;

/// `struct sockaddr_l2` from `<bluetooth/l2cap.h>`.
#[repr(C)]
struct SockAddrL2 {
    l2_family: libc::sa_family_t,
    l2_psm: u16,
    l2_bdaddr: [u8; 6],
    l2_cid: u16,
    l2_bdaddr_type: u8,
}

/// A Bluetooth device address, in the order `l2_bdaddr` expects (little-endian, as BlueZ stores
/// it internally).
pub type BdAddr = [u8; 6];

pub struct LinuxL2capSocket {
    fd: RawFd,
}

impl LinuxL2capSocket {
    /// Open an L2CAP `SOCK_SEQPACKET` connection to `peer` on fixed channel `cid` (`0x0004` for
    /// ATT on an LE bearer).
    pub fn connect(peer: BdAddr, peer_addr_type: u8, cid: u16) -> Result<Self, TransportError> {
        let fd = unsafe { libc::socket(libc::AF_BLUETOOTH, libc::SOCK_SEQPACKET | libc::SOCK_CLOEXEC, BTPROTO_L2CAP) };

        if fd < 0 {
            return Err(TransportError::Io(std::io::Error::last_os_error()));
        }

        let addr = SockAddrL2 {
            l2_family: libc::AF_BLUETOOTH as libc::sa_family_t,
            l2_psm: 0,
            l2_bdaddr: peer,
            l2_cid: cid,
            l2_bdaddr_type: peer_addr_type,
        };

        let addr_ptr = &addr as *const SockAddrL2 as *const libc::sockaddr;
        let addr_len = std::mem::size_of::<SockAddrL2>() as libc::socklen_t;

        if unsafe { libc::connect(fd, addr_ptr, addr_len) } < 0 {
            let err = std::io::Error::last_os_error();
            let _ = nix::unistd::close(fd);
            return Err(TransportError::Io(err));
        }

        Ok(LinuxL2capSocket { fd })
    }
}

impl Transport for LinuxL2capSocket {
    fn read_message(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        // MAX_ATT_MTU is the largest single PDU the protocol allows; SOCK_SEQPACKET delivers at
        // most one PDU per recv regardless of buffer size.
        let mut buf = [0u8; crate::att::MAX_ATT_MTU as usize];

        loop {
            let n = unsafe { libc::recv(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0) };

            if n > 0 {
                return Ok(Some(buf[..n as usize].to_vec()));
            } else if n == 0 {
                return Ok(None);
            } else {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(TransportError::Io(err));
            }
        }
    }

    fn write_message(&mut self, data: &[u8]) -> Result<(), TransportError> {
        loop {
            let n = unsafe { libc::send(self.fd, data.as_ptr() as *const libc::c_void, data.len(), 0) };

            if n < 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(TransportError::Io(err));
            }

            log::trace!("(transport) wrote {} bytes", n);
            return Ok(());
        }
    }
}

impl Drop for LinuxL2capSocket {
    fn drop(&mut self) {
        if let Err(e) = nix::unistd::close(self.fd) {
            log::error!("failed to close L2CAP socket: {}", e);
        }
    }
}
