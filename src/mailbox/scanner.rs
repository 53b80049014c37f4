//! Periodic scan of the mailbox tree. Directory depth below the document
//! root carries fixed semantics; the per-directory processing at depths 1-4
//! is a classification hook with bookkeeping left as an extension point.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::config::DispatchConfig;
use crate::error::DispatchError;
use crate::mailbox::tree;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DirKind {
    /// The document root itself; skipped during classification.
    Root,
    SenderDomain,
    SenderUser,
    RecipientDomain,
    RecipientUser,
    /// Depth 5 and beyond: free-form organizational subdirectories.
    Organization,
}

impl DirKind {
    pub fn at_depth(depth: usize) -> DirKind {
        match depth {
            0 => DirKind::Root,
            1 => DirKind::SenderDomain,
            2 => DirKind::SenderUser,
            3 => DirKind::RecipientDomain,
            4 => DirKind::RecipientUser,
            _ => DirKind::Organization,
        }
    }
}

/// Runs the scan timer until the daemon shuts down. Each tick spawns a fresh
/// scan task; a tick that fires while a scan is still in flight is skipped
/// rather than run in parallel with it.
pub async fn run_scanner(config: Arc<DispatchConfig>) -> anyhow::Result<()> {
    let root = config.doc_root.clone();
    drive_scans(config.scan_interval, move || {
        let root = root.clone();
        async move {
            match scan_tree(&root).await {
                Ok(visited) => trace!("mailbox scan visited {} directories", visited.len()),
                Err(e) => warn!("mailbox scan failed: {}", e),
            }
        }
    })
    .await
}

/// Tick loop behind [`run_scanner`]. The guard is taken before the scan
/// future is polled, so a skipped tick never starts its scan.
async fn drive_scans<F, Fut>(period: Duration, scan: F) -> anyhow::Result<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut ticks = time::interval(period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let in_flight = Arc::new(Mutex::new(()));

    loop {
        ticks.tick().await;

        let in_flight = in_flight.clone();
        let scan = scan();
        tokio::spawn(async move {
            let Ok(_guard) = in_flight.try_lock() else {
                debug!("previous mailbox scan still running - skipping this cycle");
                return;
            };
            scan.await;
        });
    }
}

/// One full depth-first traversal. Returns every visited directory with its
/// classification, in visit order.
pub async fn scan_tree(root: &Path) -> Result<Vec<(PathBuf, DirKind)>, DispatchError> {
    let mut visited = Vec::new();
    scan_dir(root, 0, &mut visited).await?;
    Ok(visited)
}

fn scan_dir<'a>(
    dir: &'a Path,
    depth: usize,
    visited: &'a mut Vec<(PathBuf, DirKind)>,
) -> Pin<Box<dyn Future<Output = Result<(), DispatchError>> + Send + 'a>> {
    Box::pin(async move {
        let kind = DirKind::at_depth(depth);
        process_directory(dir, kind);
        visited.push((dir.to_path_buf(), kind));

        for (entry, is_dir) in tree::list_entries(dir).await? {
            if is_dir {
                scan_dir(&entry, depth + 1, visited).await?;
            }
        }
        Ok(())
    })
}

/// Classification hook. Index maintenance and per-mailbox bookkeeping hang
/// off this point.
fn process_directory(dir: &Path, kind: DirKind) {
    match kind {
        DirKind::Root => {}
        kind => trace!("scanning {} as {:?}", dir.display(), kind),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rstest::rstest;
    use tokio::sync::Notify;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tardy_ticks_are_skipped_while_scan_runs() {
        let started = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());

        let counter = started.clone();
        let gate = release.clone();
        let driver = tokio::spawn(drive_scans(Duration::from_millis(100), move || {
            let counter = counter.clone();
            let gate = gate.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                gate.notified().await;
            }
        }));

        // Ten further tick periods elapse while the first scan holds the
        // guard; every one of them must be skipped, not queued.
        time::sleep(Duration::from_millis(1010)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);

        // Once it finishes, the next tick starts a fresh scan.
        release.notify_one();
        time::sleep(Duration::from_millis(200)).await;
        assert_eq!(started.load(Ordering::SeqCst), 2);

        driver.abort();
    }

    #[rstest]
    #[case(0, DirKind::Root)]
    #[case(1, DirKind::SenderDomain)]
    #[case(2, DirKind::SenderUser)]
    #[case(3, DirKind::RecipientDomain)]
    #[case(4, DirKind::RecipientUser)]
    #[case(5, DirKind::Organization)]
    #[case(17, DirKind::Organization)]
    fn test_depth_semantics(#[case] depth: usize, #[case] expected: DirKind) {
        assert_eq!(DirKind::at_depth(depth), expected);
    }

    #[tokio::test]
    async fn test_scan_classifies_single_domain_dir() {
        let root = tempfile::tempdir().unwrap();
        tree::ensure_dir(&root.path().join("example.com")).await.unwrap();

        let visited = scan_tree(root.path()).await.unwrap();
        assert_eq!(
            visited,
            vec![
                (root.path().to_path_buf(), DirKind::Root),
                (root.path().join("example.com"), DirKind::SenderDomain),
            ]
        );
    }

    #[tokio::test]
    async fn test_scan_full_depth_and_skips_files() {
        let root = tempfile::tempdir().unwrap();
        let deep = root
            .path()
            .join("bar.com")
            .join("foo")
            .join("qux.org")
            .join("baz")
            .join("archive");
        tree::ensure_dir(&deep).await.unwrap();
        tree::write_file(&root.path().join("bar.com").join("note.txt"), b"x")
            .await
            .unwrap();

        let visited = scan_tree(root.path()).await.unwrap();
        let kinds: Vec<DirKind> = visited.iter().map(|(_, k)| *k).collect();
        assert_eq!(
            kinds,
            vec![
                DirKind::Root,
                DirKind::SenderDomain,
                DirKind::SenderUser,
                DirKind::RecipientDomain,
                DirKind::RecipientUser,
                DirKind::Organization,
            ]
        );
        assert!(!visited.iter().any(|(p, _)| p.ends_with("note.txt")));
    }
}
