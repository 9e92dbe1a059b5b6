//! Dialing the active backend with a deadline.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpStream;

/// Backends always listen on the loopback interface.
pub fn backend_addr(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

/// Connect to `127.0.0.1:<port>`, failing with `TimedOut` after `timeout`.
pub async fn connect_backend(port: u16, timeout: Duration) -> io::Result<TcpStream> {
    let addr = backend_addr(port);
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(result) => {
            let stream = result?;
            stream.set_nodelay(true)?;
            Ok(stream)
        }
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("connect to {} timed out after {:?}", addr, timeout),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connects_to_loopback_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let stream = connect_backend(port, Duration::from_secs(1)).await.unwrap();
        assert_eq!(stream.peer_addr().unwrap(), backend_addr(port));
    }

    #[tokio::test]
    async fn refused_port_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        assert!(connect_backend(port, Duration::from_secs(1)).await.is_err());
    }
}
