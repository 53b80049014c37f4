//! The connection dispatcher. One listener serves both kinds of traffic:
//! connections from loopback are local clients speaking the text request
//! grammar, everything else is a peer daemon transmitting a binary parcel.
//! Each accepted connection runs in its own task; the accept loop never
//! waits on a connection, and finished tasks are reaped as they complete.

use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::io::AsyncRead;
use tokio::net::{TcpListener, TcpStream};
use tokio::select;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::{DispatchConfig, LOCAL_DOMAIN};
use crate::error::DispatchError;
use crate::mailbox::delivery::ParcelSink;
use crate::mailbox::tree;
use crate::net::{inbound, outbound};
use crate::protocol::address::Address;
use crate::protocol::parcel::Parcel;
use crate::protocol::request::{self, RequestToken, ARG_FILE, ARG_RECIPIENT, DELIMITER, MAX_REQUEST_LEN};
use crate::protocol::wire;

pub struct Endpoint<S: ParcelSink> {
    listener: TcpListener,
    config: Arc<DispatchConfig>,
    sink: Arc<S>,
}

impl<S: ParcelSink> Endpoint<S> {
    /// Binds the listening socket. This is the only fatal startup error in
    /// the daemon; everything later is isolated per connection.
    pub async fn bind(config: Arc<DispatchConfig>, sink: Arc<S>) -> anyhow::Result<Endpoint<S>> {
        let addr = SocketAddr::from((Ipv6Addr::UNSPECIFIED, config.port));
        let listener = TcpListener::bind(addr).await?;
        info!("listening on {}", listener.local_addr()?);
        Ok(Endpoint {
            listener,
            config,
            sink,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let mut handlers = JoinSet::new();

        loop {
            select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let config = self.config.clone();
                            let sink = self.sink.clone();
                            handlers.spawn(async move {
                                handle_connection(stream, peer, config, sink).await;
                            });
                        }
                        Err(e) => warn!("accept failed: {}", e),
                    }
                }
                Some(finished) = handlers.join_next() => {
                    if let Err(e) = finished {
                        warn!("connection handler aborted: {}", e);
                    }
                }
            }
        }
    }
}

/// Loopback peers are local clients. Covers IPv4 loopback, IPv6 `::1` and
/// the IPv4-mapped-IPv6 loopback a dual-stack listener reports.
pub fn is_local_addr(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback(),
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6
                    .to_ipv4_mapped()
                    .map(|mapped| mapped.is_loopback())
                    .unwrap_or(false)
        }
    }
}

/// A failure in here closes this connection and nothing else.
async fn handle_connection<S: ParcelSink>(
    mut stream: TcpStream,
    peer: SocketAddr,
    config: Arc<DispatchConfig>,
    sink: Arc<S>,
) {
    let result = if is_local_addr(&peer.ip()) {
        handle_local(&mut stream, &config).await
    } else {
        info!("connection from {}", peer.ip());
        handle_remote(&mut stream, &config, sink.as_ref()).await
    };

    if let Err(e) = result {
        warn!("connection from {} closed with error: {:#}", peer, e);
    }
}

/// Local branch: parse a text request, build the parcel it describes, and
/// forward it to the recipient's daemon.
async fn handle_local(stream: &mut TcpStream, config: &DispatchConfig) -> anyhow::Result<()> {
    let raw = read_request(stream, config).await?;
    let parsed = request::parse(&raw)?;
    debug!(
        "client request, protocol version {}, {} token(s)",
        parsed.version,
        parsed.tokens.len()
    );

    let parcel = build_parcel(&parsed.tokens, config).await?;
    let host = parcel
        .recipient
        .host
        .clone()
        .unwrap_or_else(|| LOCAL_DOMAIN.to_string());

    let (head, body) = wire::encode(&parcel);
    info!(
        id = ?parcel.header.message_id,
        to = %parcel.recipient,
        "dispatching {} ({} byte(s)) to {}",
        parcel.raw_filename,
        parcel.payload.len(),
        host
    );
    outbound::send_parcel(&host, config.port, &head, &body).await?;
    Ok(())
}

/// Remote branch: receive one parcel and hand it to delivery.
async fn handle_remote<S: ParcelSink>(
    stream: &mut TcpStream,
    config: &DispatchConfig,
    sink: &S,
) -> anyhow::Result<()> {
    let parcel = inbound::read_parcel(stream, config).await?;
    info!(
        id = ?parcel.header.message_id,
        from = %parcel.sender,
        to = %parcel.recipient,
        "parcel of {} byte(s) received",
        parcel.payload.len()
    );
    sink.deliver(parcel).await?;
    Ok(())
}

/// Reads client bytes until the terminating doubled delimiter, EOF, or the
/// maximum permitted request size. Validation of what was read is the
/// grammar parser's job.
async fn read_request<R: AsyncRead + Unpin>(
    stream: &mut R,
    config: &DispatchConfig,
) -> Result<Vec<u8>, DispatchError> {
    use tokio::io::AsyncReadExt;

    let terminator = DELIMITER.repeat(2);
    let mut raw: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 1024];

    loop {
        let n = match timeout(config.read_timeout, stream.read(&mut chunk)).await {
            Ok(result) => result?,
            Err(_) => return Err(DispatchError::ReadTimeout),
        };
        if n == 0 {
            return Ok(raw);
        }
        raw.extend_from_slice(&chunk[..n]);

        if raw
            .windows(terminator.len())
            .any(|w| w == terminator.as_bytes())
        {
            return Ok(raw);
        }
        if raw.len() > MAX_REQUEST_LEN {
            return Ok(raw);
        }
    }
}

/// Populates a parcel from recognized request tokens: `f` names the source
/// file, `r` the recipient. Other tokens are ignored. The sender identity
/// comes from the daemon's configuration.
async fn build_parcel(tokens: &[RequestToken], config: &DispatchConfig) -> anyhow::Result<Parcel> {
    let mut filename = None;
    let mut recipient = None;

    for token in tokens {
        match (token.name.as_str(), &token.value) {
            (ARG_FILE, Some(value)) => filename = Some(value.clone()),
            (ARG_RECIPIENT, Some(value)) => recipient = Some(Address::parse(value)),
            _ => {}
        }
    }

    let filename = filename.ok_or_else(|| anyhow!("request names no source file"))?;
    let recipient = recipient.ok_or_else(|| anyhow!("request names no recipient"))?;

    let payload = tree::read_file(Path::new(&filename)).await?;
    let sender = Address {
        user: config.local_user.clone(),
        host: config.local_host.clone(),
    };

    Ok(Parcel::new(filename, sender, recipient, payload.into()))
}
