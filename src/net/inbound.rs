//! Remote branch of connection handling: a peer daemon transmits a
//! fixed-size header followed by exactly the declared number of body bytes.
//! The header is fully buffered before the body is touched; reads loop until
//! the expected size is reached, and premature closure or an idle timeout
//! discards the parcel.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;

use crate::config::DispatchConfig;
use crate::error::DispatchError;
use crate::protocol::parcel::Parcel;
use crate::protocol::wire::{self, HEADER_LEN};

pub async fn read_parcel<S: AsyncRead + Unpin>(
    stream: &mut S,
    config: &DispatchConfig,
) -> Result<Parcel, DispatchError> {
    let mut head_data = [0u8; HEADER_LEN];
    read_full(stream, &mut head_data, config.read_timeout).await?;

    let (_, body_size) = wire::deserialize_header(&mut &head_data[..])?;
    if body_size > config.max_parcel_size {
        return Err(DispatchError::OversizedParcel(body_size));
    }

    let mut body_data = vec![0u8; body_size as usize];
    read_full(stream, &mut body_data, config.read_timeout).await?;

    wire::decode(&head_data, &body_data)
}

/// Fills the whole buffer, looping on short reads. Premature closure reports
/// how many bytes had actually arrived.
async fn read_full<S: AsyncRead + Unpin>(
    stream: &mut S,
    buf: &mut [u8],
    limit: Duration,
) -> Result<(), DispatchError> {
    let mut filled = 0usize;
    while filled < buf.len() {
        let n = bounded(limit, stream.read(&mut buf[filled..])).await?;
        if n == 0 {
            return Err(DispatchError::TruncatedParcel {
                expected: buf.len() as u64,
                available: filled as u64,
            });
        }
        filled += n;
    }
    Ok(())
}

async fn bounded<T, E>(
    limit: Duration,
    fut: impl std::future::Future<Output = Result<T, E>>,
) -> Result<T, DispatchError>
where
    DispatchError: From<E>,
{
    match timeout(limit, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(DispatchError::ReadTimeout),
    }
}
