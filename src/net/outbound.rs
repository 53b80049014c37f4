use tokio::io::AsyncWriteExt;
use tokio::net::{lookup_host, TcpStream};
use tracing::debug;

use crate::error::DispatchError;

/// Resolves the recipient host and transmits a serialized parcel: header
/// bytes first, then body bytes, as two ordered writes over one stream.
/// Delivery is best-effort and single-attempt; the caller logs failures and
/// moves on.
pub async fn send_parcel(
    host: &str,
    port: u16,
    head_data: &[u8],
    body_data: &[u8],
) -> Result<(), DispatchError> {
    let mut stream = connect(host, port).await?;

    write(&mut stream, head_data, host).await?;
    write(&mut stream, body_data, host).await?;
    stream
        .shutdown()
        .await
        .map_err(|e| DispatchError::SendFailed {
            host: host.to_string(),
            source: e,
        })?;

    debug!(
        "sent {} header + {} body byte(s) to {}",
        head_data.len(),
        body_data.len(),
        host
    );
    Ok(())
}

/// Tries every resolved candidate address in order and keeps the first
/// connection that succeeds.
async fn connect(host: &str, port: u16) -> Result<TcpStream, DispatchError> {
    let candidates = lookup_host((host, port))
        .await
        .map_err(|_| DispatchError::ConnectFailed(host.to_string()))?;

    for addr in candidates {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                debug!("connected to {} at {}", host, addr);
                return Ok(stream);
            }
            Err(e) => debug!("candidate {} for {} refused: {}", addr, host, e),
        }
    }
    Err(DispatchError::ConnectFailed(host.to_string()))
}

async fn write(stream: &mut TcpStream, data: &[u8], host: &str) -> Result<(), DispatchError> {
    stream
        .write_all(data)
        .await
        .map_err(|e| DispatchError::SendFailed {
            host: host.to_string(),
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn test_send_writes_header_then_body() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let reader = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            stream.read_to_end(&mut received).await.unwrap();
            received
        });

        send_parcel("127.0.0.1", port, b"HEAD", b"BODY").await.unwrap();
        assert_eq!(reader.await.unwrap(), b"HEADBODY");
    }

    #[tokio::test]
    async fn test_unresolvable_host_is_connect_failed() {
        let result = send_parcel("host.invalid", 1992, b"h", b"b").await;
        assert!(matches!(result, Err(DispatchError::ConnectFailed(_))));
    }

    #[tokio::test]
    async fn test_refused_connection_is_connect_failed() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = send_parcel("127.0.0.1", port, b"h", b"b").await;
        assert!(matches!(result, Err(DispatchError::ConnectFailed(_))));
    }
}
