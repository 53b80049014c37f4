use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use crate::config::{DispatchConfig, LOCAL_DOMAIN};
use crate::error::DispatchError;
use crate::mailbox::tree;
use crate::protocol::parcel::Parcel;

/// Placeholder user directory for parcels whose address omits the user.
const UNKNOWN_USER: &str = "unknown";

/// Where received parcels end up. The endpoint only knows this seam, which
/// keeps connection handling testable without a filesystem.
#[async_trait]
pub trait ParcelSink: Send + Sync + 'static {
    async fn deliver(&self, parcel: Parcel) -> Result<(), DispatchError>;
}

/// Persists parcels under the mailbox tree using the depth semantics the
/// scanner classifies by: sender domain / sender user / recipient domain /
/// recipient user / filename.
pub struct MailboxDelivery {
    doc_root: PathBuf,
}

impl MailboxDelivery {
    pub fn new(config: &DispatchConfig) -> MailboxDelivery {
        MailboxDelivery {
            doc_root: config.doc_root.clone(),
        }
    }

    pub fn parcel_dir(&self, parcel: &Parcel) -> PathBuf {
        self.doc_root
            .join(parcel.sender.host.as_deref().unwrap_or(LOCAL_DOMAIN))
            .join(parcel.sender.user.as_deref().unwrap_or(UNKNOWN_USER))
            .join(parcel.recipient.host.as_deref().unwrap_or(LOCAL_DOMAIN))
            .join(parcel.recipient.user.as_deref().unwrap_or(UNKNOWN_USER))
    }
}

#[async_trait]
impl ParcelSink for MailboxDelivery {
    async fn deliver(&self, parcel: Parcel) -> Result<(), DispatchError> {
        let dir = self.parcel_dir(&parcel);
        tree::ensure_dir(&dir).await?;

        let filename = safe_filename(&parcel);
        let target = dir.join(&filename);
        tree::write_file(&target, &parcel.payload).await?;

        info!(
            id = ?parcel.header.message_id,
            from = %parcel.sender,
            to = %parcel.recipient,
            size = parcel.payload.len(),
            "parcel delivered to {}",
            target.display()
        );
        Ok(())
    }
}

/// The transmitted filename is untrusted input; only its final path
/// component may name the stored file, and an empty or traversal-only name
/// falls back to the message id.
fn safe_filename(parcel: &Parcel) -> String {
    let name = parcel
        .raw_filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("");
    if name.is_empty() || name == "." || name == ".." {
        format!("parcel-{:?}", parcel.header.message_id)
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use crate::protocol::address::Address;

    use super::*;

    fn parcel(filename: &str, sender: &str, recipient: &str) -> Parcel {
        Parcel::new(
            filename.to_string(),
            Address::parse(sender),
            Address::parse(recipient),
            Bytes::from_static(b"payload"),
        )
    }

    #[tokio::test]
    async fn test_delivery_builds_depth_semantic_path() {
        let root = tempfile::tempdir().unwrap();
        let config = DispatchConfig::new(root.path().to_path_buf());
        let delivery = MailboxDelivery::new(&config);

        delivery
            .deliver(parcel("test.txt", "foo@bar.com", "baz@qux.org"))
            .await
            .unwrap();

        let stored = root
            .path()
            .join("bar.com")
            .join("foo")
            .join("qux.org")
            .join("baz")
            .join("test.txt");
        assert_eq!(tree::read_file(&stored).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_absent_components_fall_back_to_defaults() {
        let root = tempfile::tempdir().unwrap();
        let config = DispatchConfig::new(root.path().to_path_buf());
        let delivery = MailboxDelivery::new(&config);

        delivery
            .deliver(parcel("a.txt", "foo", "@qux.org"))
            .await
            .unwrap();

        let stored = root
            .path()
            .join(LOCAL_DOMAIN)
            .join("foo")
            .join("qux.org")
            .join(UNKNOWN_USER)
            .join("a.txt");
        assert!(tree::exists(&stored).await);
    }

    #[tokio::test]
    async fn test_traversal_filename_is_sanitized() {
        let root = tempfile::tempdir().unwrap();
        let config = DispatchConfig::new(root.path().to_path_buf());
        let delivery = MailboxDelivery::new(&config);

        let p = parcel("../../etc/passwd", "foo@bar.com", "baz@qux.org");
        let dir = delivery.parcel_dir(&p);
        delivery.deliver(p).await.unwrap();

        // Stored under the addressed mailbox dir, traversal components gone.
        assert_eq!(tree::read_file(&dir.join("passwd")).await.unwrap(), b"payload");
    }
}
