//! Bind targets for the listener and the peer addresses it reports.
//!
//! An [`EndpointAddress`] is either a TCP socket address or a local-domain
//! (Unix) path. Local paths may live in the Linux abstract namespace, in which
//! case the path actually handed to the kernel starts with a NUL byte, see
//! [`LocalAddress::bind_path`].

use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};

use socket2::{Domain, SockAddr};

/// A resolved bind target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointAddress {
    /// IP address and port.
    Tcp(SocketAddr),
    /// Local-domain socket path.
    Local(LocalAddress),
}

/// A local-domain socket path together with its abstract-namespace flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAddress {
    path: OsString,
    is_abstract: bool,
}

impl LocalAddress {
    pub fn new(path: impl Into<OsString>, is_abstract: bool) -> Self {
        Self { path: path.into(), is_abstract }
    }

    /// A socket file on the filesystem.
    pub fn filesystem(path: impl Into<OsString>) -> Self {
        Self::new(path, false)
    }

    /// A name in the Linux abstract namespace, given without the leading NUL.
    pub fn abstract_name(name: impl Into<OsString>) -> Self {
        Self::new(name, true)
    }

    /// The path exactly as configured.
    pub fn path(&self) -> &OsStr {
        &self.path
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    /// The path handed to the kernel when binding or connecting.
    ///
    /// Abstract addresses whose configured path does not already start with a
    /// NUL byte are prefixed with one; every other path is used unchanged.
    pub fn bind_path(&self) -> Cow<'_, OsStr> {
        let bytes = self.path.as_bytes();
        if self.is_abstract && bytes.first() != Some(&0) {
            let mut prefixed = Vec::with_capacity(bytes.len() + 1);
            prefixed.push(0);
            prefixed.extend_from_slice(bytes);
            Cow::Owned(OsString::from_vec(prefixed))
        } else {
            Cow::Borrowed(self.path.as_os_str())
        }
    }
}

impl fmt::Display for LocalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bind_path = self.bind_path();
        match bind_path.as_bytes().split_first() {
            // abstract names are conventionally shown with a leading '@'
            Some((0, name)) => write!(f, "@{}", String::from_utf8_lossy(name)),
            _ => write!(f, "{}", Path::new(&*bind_path).display()),
        }
    }
}

impl EndpointAddress {
    pub fn tcp(address: impl Into<SocketAddr>) -> Self {
        Self::Tcp(address.into())
    }

    pub fn local(path: impl Into<OsString>, is_abstract: bool) -> Self {
        Self::Local(LocalAddress::new(path, is_abstract))
    }

    #[inline]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    pub(crate) fn domain(&self) -> Domain {
        match self {
            Self::Tcp(address) => Domain::for_address(*address),
            Self::Local(_) => Domain::UNIX,
        }
    }

    pub(crate) fn to_sock_addr(&self) -> io::Result<SockAddr> {
        match self {
            Self::Tcp(address) => Ok(SockAddr::from(*address)),
            Self::Local(local) => SockAddr::unix(&*local.bind_path()),
        }
    }
}

impl From<SocketAddr> for EndpointAddress {
    fn from(address: SocketAddr) -> Self {
        Self::Tcp(address)
    }
}

impl From<LocalAddress> for EndpointAddress {
    fn from(address: LocalAddress) -> Self {
        Self::Local(address)
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(address) => write!(f, "{address}"),
            Self::Local(local) => write!(f, "{local}"),
        }
    }
}

/// The remote side of an accepted stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerAddr {
    Tcp(SocketAddr),
    /// Local peers are usually unnamed, in which case there is no path.
    Local(Option<PathBuf>),
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(address) => write!(f, "{address}"),
            Self::Local(Some(path)) => write!(f, "{}", path.display()),
            Self::Local(None) => f.write_str("unnamed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abstract_path_gets_nul_prefix() {
        let address = LocalAddress::new("myserver", true);
        let bind_path = address.bind_path();

        assert_eq!(bind_path.as_bytes(), b"\0myserver");
        assert_eq!(bind_path.len(), 9);
        assert_eq!(bind_path.as_bytes()[0], 0x00);
        // the configured path is kept as is
        assert_eq!(address.path(), "myserver");
    }

    #[test]
    fn already_prefixed_abstract_path_is_untouched() {
        let address = LocalAddress::new("\0myserver", true);
        assert_eq!(address.bind_path().as_bytes(), b"\0myserver");
    }

    #[test]
    fn filesystem_path_is_untouched() {
        let address = LocalAddress::filesystem("/tmp/plexer.sock");
        assert_eq!(address.bind_path().as_bytes(), b"/tmp/plexer.sock");
        assert!(matches!(address.bind_path(), Cow::Borrowed(_)));
    }

    #[test]
    fn display() {
        assert_eq!(EndpointAddress::local("myserver", true).to_string(), "@myserver");
        assert_eq!(EndpointAddress::local("/run/plexer.sock", false).to_string(), "/run/plexer.sock");
        assert_eq!(EndpointAddress::tcp(([127, 0, 0, 1], 8080)).to_string(), "127.0.0.1:8080");
        assert_eq!(PeerAddr::Local(None).to_string(), "unnamed");
    }

    #[test]
    fn domain_follows_address_family() {
        assert_eq!(EndpointAddress::tcp(([127, 0, 0, 1], 0)).domain(), Domain::IPV4);
        assert_eq!(EndpointAddress::local("x", true).domain(), Domain::UNIX);
    }
}
