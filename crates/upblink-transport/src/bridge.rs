use std::net::TcpStream;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::settings::PortSettings;
use crate::traits::LinkStream;

/// Serial-over-TCP bridge connector (ser2net, RFC2217 gateways, and the
/// TCP listeners some PIM adapters expose directly).
pub struct TcpBridge;

impl TcpBridge {
    /// Connect to a TCP bridge endpoint (blocking).
    ///
    /// The line parameters in `settings` are informational here (the bridge
    /// daemon owns the physical port), but the receive timeout is applied to
    /// the socket so timed reads behave identically across transports.
    pub fn connect(addr: &str, settings: &PortSettings) -> Result<LinkStream> {
        let stream = TcpStream::connect(addr).map_err(|e| TransportError::Connect {
            endpoint: addr.to_string(),
            source: e,
        })?;
        // A PIM exchange is a handful of bytes; never batch them.
        stream.set_nodelay(true)?;

        let link = LinkStream::from(stream);
        link.set_read_timeout(Some(settings.receive_timeout))?;

        info!(%addr, line = %settings.describe(), "connected to tcp serial bridge");
        Ok(link)
    }
}

/// Unix-domain-socket bridge connector (local bridge daemons that hand the
/// serial port over a filesystem socket).
pub struct UnixBridge;

impl UnixBridge {
    /// Connect to a listening bridge socket (blocking).
    #[cfg(unix)]
    pub fn connect(path: impl AsRef<Path>, settings: &PortSettings) -> Result<LinkStream> {
        let path = path.as_ref();
        let stream = std::os::unix::net::UnixStream::connect(path).map_err(|e| {
            TransportError::Connect {
                endpoint: path.display().to_string(),
                source: e,
            }
        })?;

        let link = LinkStream::from(stream);
        link.set_read_timeout(Some(settings.receive_timeout))?;

        debug!(?path, line = %settings.describe(), "connected to unix serial bridge");
        Ok(link)
    }

    #[cfg(not(unix))]
    pub fn connect(path: impl AsRef<Path>, _settings: &PortSettings) -> Result<LinkStream> {
        Err(TransportError::Connect {
            endpoint: path.as_ref().display().to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "unix domain sockets are not available on this platform",
            ),
        })
    }
}

/// Connect to an endpoint string.
///
/// `tcp://host:port` selects the TCP bridge; `unix://path` or a bare path
/// selects the Unix-socket bridge.
pub fn connect(endpoint: &str, settings: &PortSettings) -> Result<LinkStream> {
    if endpoint.is_empty() {
        return Err(TransportError::InvalidEndpoint(endpoint.to_string()));
    }
    if let Some(addr) = endpoint.strip_prefix("tcp://") {
        if addr.is_empty() {
            return Err(TransportError::InvalidEndpoint(endpoint.to_string()));
        }
        return TcpBridge::connect(addr, settings);
    }
    let path = endpoint.strip_prefix("unix://").unwrap_or(endpoint);
    if path.is_empty() {
        return Err(TransportError::InvalidEndpoint(endpoint.to_string()));
    }
    UnixBridge::connect(path, settings)
}
