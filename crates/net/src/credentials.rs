//! Peer credential snapshot for local-domain connections.

use std::fmt;
use std::io;

use tokio::net::UnixStream;

/// Identity of the process on the other end of a local-domain socket.
///
/// Taken once when the stream is attached to a connection and never refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials {
    uid: u32,
    gid: u32,
    pid: Option<i32>,
}

impl Credentials {
    pub fn new(uid: u32, gid: u32, pid: Option<i32>) -> Self {
        Self { uid, gid, pid }
    }

    /// Reads `SO_PEERCRED` (or the platform equivalent) from the stream.
    pub fn capture(stream: &UnixStream) -> io::Result<Self> {
        let cred = stream.peer_cred()?;
        Ok(Self { uid: cred.uid(), gid: cred.gid(), pid: cred.pid() })
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn gid(&self) -> u32 {
        self.gid
    }

    /// Not every platform reports the peer pid.
    pub fn pid(&self) -> Option<i32> {
        self.pid
    }
}

impl fmt::Display for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UID:{} GID:{}", self.uid, self.gid)?;
        match self.pid {
            Some(pid) => write!(f, " PID:{pid}"),
            None => f.write_str(" PID:unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn capture_from_socket_pair() {
        let (left, _right) = UnixStream::pair().unwrap();
        let credentials = Credentials::capture(&left).unwrap();

        // both ends belong to this test process
        #[cfg(target_os = "linux")]
        assert_eq!(credentials.pid(), Some(i32::try_from(std::process::id()).unwrap()));
        assert_eq!(credentials.uid(), left.peer_cred().unwrap().uid());
    }

    #[test]
    fn display() {
        assert_eq!(Credentials::new(1000, 100, Some(42)).to_string(), "UID:1000 GID:100 PID:42");
        assert_eq!(Credentials::new(0, 0, None).to_string(), "UID:0 GID:0 PID:unknown");
    }
}
