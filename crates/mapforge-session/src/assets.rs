//! On-demand transfer bookkeeping and storage for pog art.
//!
//! Two halves:
//!
//! - [`AssetStore`] — disk I/O under the asset root, with the path guard
//!   and PNG signature validation that keep hostile filenames and
//!   non-image payloads out.
//! - [`AssetTransfers`] — the in-flight bookkeeping: which filenames we
//!   have already requested (at most one outstanding request per name),
//!   and which peers are waiting for files we do not have yet (served in
//!   one pass when the file arrives).

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};

use mapforge_transport::ConnectionId;

/// The eight-byte PNG file signature.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Default subfolder a suspicious filename is rewritten into.
const SAFE_SUBFOLDER: &str = "pogs";

/// Reads and writes assets under a fixed root directory.
#[derive(Debug, Clone)]
pub struct AssetStore {
    root: PathBuf,
}

impl AssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a wire filename to a path that is guaranteed to live under
    /// the asset root.
    ///
    /// Filenames arrive from peers, so absolute paths and any `..`
    /// component are treated as hostile: the name is rewritten to its
    /// final component inside the default subfolder instead of being
    /// honored.
    pub fn resolve(&self, filename: &str) -> PathBuf {
        let candidate = Path::new(filename);
        let traversal = candidate.components().any(|c| {
            !matches!(c, Component::Normal(_) | Component::CurDir)
        });
        if traversal {
            let base = candidate
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "asset.png".to_string());
            tracing::warn!(
                filename,
                rewritten = %base,
                "asset path escapes the asset root; rewritten"
            );
            return self.root.join(SAFE_SUBFOLDER).join(base);
        }
        self.root.join(candidate)
    }

    /// Whether the asset already exists locally.
    pub fn has(&self, filename: &str) -> bool {
        self.resolve(filename).is_file()
    }

    /// Reads an asset's bytes.
    pub fn read(&self, filename: &str) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.resolve(filename))
    }

    /// Validates and writes a received PNG.
    ///
    /// The payload must start with the PNG signature; anything else is
    /// rejected before a byte touches disk, so no partial file is ever
    /// retained. The write goes through a sibling temp file and a rename.
    pub fn write_png(&self, filename: &str, data: &[u8]) -> std::io::Result<PathBuf> {
        if data.len() < PNG_SIGNATURE.len() || data[..PNG_SIGNATURE.len()] != PNG_SIGNATURE {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "payload does not carry the PNG signature",
            ));
        }
        let path = self.resolve(filename);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let staging = path.with_extension("part");
        std::fs::write(&staging, data)?;
        std::fs::rename(&staging, &path)?;
        Ok(path)
    }
}

/// In-flight transfer bookkeeping.
#[derive(Debug, Default)]
pub struct AssetTransfers {
    /// Filenames we have requested from a peer and not yet received.
    outstanding: HashSet<String>,
    /// Peers awaiting a file we do not have yet, keyed by filename.
    pending: HashMap<String, Vec<ConnectionId>>,
}

impl AssetTransfers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notes that we need `filename`. Returns `true` only the first time
    /// while the request is outstanding — the caller sends exactly one
    /// request packet no matter how many pogs reference the file.
    pub fn begin_request(&mut self, filename: &str) -> bool {
        self.outstanding.insert(filename.to_string())
    }

    pub fn is_outstanding(&self, filename: &str) -> bool {
        self.outstanding.contains(filename)
    }

    /// Clears the outstanding mark once the file has arrived.
    pub fn complete(&mut self, filename: &str) {
        self.outstanding.remove(filename);
    }

    /// Records a peer waiting for a file we cannot serve yet.
    pub fn add_pending(&mut self, filename: &str, requester: ConnectionId) {
        let waiters = self.pending.entry(filename.to_string()).or_default();
        if !waiters.contains(&requester) {
            waiters.push(requester);
        }
    }

    /// Takes every peer awaiting `filename`, clearing the entry. Called
    /// once when the file arrives; each waiter is served in this pass.
    pub fn take_pending(&mut self, filename: &str) -> Vec<ConnectionId> {
        self.pending.remove(filename).unwrap_or_default()
    }

    /// Forgets a dropped connection wherever it was waiting.
    pub fn forget_connection(&mut self, connection: ConnectionId) {
        for waiters in self.pending.values_mut() {
            waiters.retain(|c| *c != connection);
        }
        self.pending.retain(|_, waiters| !waiters.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, AssetStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = AssetStore::new(dir.path());
        (dir, store)
    }

    fn png_bytes() -> Vec<u8> {
        let mut data = PNG_SIGNATURE.to_vec();
        data.extend_from_slice(&[0, 0, 0, 13]);
        data
    }

    #[test]
    fn test_write_then_read_round_trips() {
        let (_dir, store) = store();
        let data = png_bytes();
        store.write_png("pogs/goblin.png", &data).unwrap();

        assert!(store.has("pogs/goblin.png"));
        assert_eq!(store.read("pogs/goblin.png").unwrap(), data);
    }

    #[test]
    fn test_bad_signature_is_rejected_without_partial_file() {
        let (_dir, store) = store();
        let err = store.write_png("pogs/evil.png", b"GIF89a not a png").unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        assert!(!store.has("pogs/evil.png"), "no partial file retained");
    }

    #[test]
    fn test_traversal_paths_are_rewritten_under_root() {
        let (dir, store) = store();
        for hostile in ["../../etc/passwd.png", "/etc/shadow.png"] {
            let resolved = store.resolve(hostile);
            assert!(
                resolved.starts_with(dir.path()),
                "{hostile} resolved outside the root: {resolved:?}"
            );
            assert!(resolved.starts_with(dir.path().join("pogs")));
        }
    }

    #[test]
    fn test_plain_relative_paths_resolve_in_place() {
        let (dir, store) = store();
        assert_eq!(
            store.resolve("underlays/cave.png"),
            dir.path().join("underlays/cave.png")
        );
    }

    #[test]
    fn test_begin_request_coalesces_repeat_requests() {
        // Property: requesting the same missing filename N times produces
        // exactly one request on the wire.
        let mut transfers = AssetTransfers::new();
        assert!(transfers.begin_request("pogs/goblin.png"));
        assert!(!transfers.begin_request("pogs/goblin.png"));
        assert!(!transfers.begin_request("pogs/goblin.png"));
        assert!(transfers.is_outstanding("pogs/goblin.png"));

        transfers.complete("pogs/goblin.png");
        assert!(
            transfers.begin_request("pogs/goblin.png"),
            "a fresh request is allowed once the last one completed"
        );
    }

    #[test]
    fn test_pending_fan_out_serves_each_waiter_once() {
        let mut transfers = AssetTransfers::new();
        let (a, b, c) = (
            ConnectionId::new(1),
            ConnectionId::new(2),
            ConnectionId::new(3),
        );
        transfers.add_pending("pogs/goblin.png", a);
        transfers.add_pending("pogs/goblin.png", b);
        transfers.add_pending("pogs/goblin.png", b); // duplicate coalesced
        transfers.add_pending("pogs/goblin.png", c);

        let waiters = transfers.take_pending("pogs/goblin.png");
        assert_eq!(waiters, vec![a, b, c]);
        assert!(transfers.take_pending("pogs/goblin.png").is_empty());
    }

    #[test]
    fn test_forget_connection_clears_waiters() {
        let mut transfers = AssetTransfers::new();
        let (a, b) = (ConnectionId::new(1), ConnectionId::new(2));
        transfers.add_pending("pogs/goblin.png", a);
        transfers.add_pending("pogs/goblin.png", b);
        transfers.forget_connection(a);

        assert_eq!(transfers.take_pending("pogs/goblin.png"), vec![b]);
    }
}
