//! Snapshot feed for presentation layers.
//!
//! [`SnapshotFeed`] binds a Unix stream socket and writes every
//! [`DisplayState`] it is given to all connected clients as one line of
//! JSON.  Clients that stop reading are dropped.

use super::IpcError;
use crate::traits::DisplayState;
use log::{debug, error, info, warn};
use std::io::Write;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex};

pub struct SnapshotFeed {
    path: PathBuf,
    clients: Arc<Mutex<Vec<UnixStream>>>,
}

impl SnapshotFeed {
    /// Bind `path` and start accepting clients on a background thread.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self, IpcError> {
        let path = path.as_ref().to_path_buf();
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path)?;
        info!("publishing snapshots on {}", path.display());

        let clients = Arc::new(Mutex::new(Vec::new()));
        let accepted = Arc::clone(&clients);
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        debug!("feed client connected");
                        match accepted.lock() {
                            Ok(mut clients) => clients.push(stream),
                            Err(_) => break,
                        }
                    }
                    Err(e) => error!("feed accept error: {}", e),
                }
            }
        });

        Ok(Self { path, clients })
    }

    /// `$XDG_RUNTIME_DIR/rearrange-feed.sock`.
    pub fn default_path() -> PathBuf {
        super::runtime_path("rearrange-feed.sock")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of connected clients.
    pub fn clients(&self) -> usize {
        self.clients.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Send `state` to every client.
    pub fn publish(&self, state: &DisplayState) -> Result<(), IpcError> {
        let mut line = serde_json::to_vec(state)?;
        line.push(b'\n');
        let Ok(mut clients) = self.clients.lock() else {
            return Ok(());
        };
        clients.retain_mut(|client| match client.write_all(&line) {
            Ok(()) => true,
            Err(e) => {
                debug!("dropping feed client: {}", e);
                false
            }
        });
        Ok(())
    }

    /// Publish every snapshot arriving on `rx` until the sender hangs up.
    pub fn run(&self, rx: mpsc::Receiver<DisplayState>) {
        for state in rx {
            debug!("{} {:?} {:?}", state.phase, state.wid, state.ghost);
            if let Err(e) = self.publish(&state) {
                warn!("failed to publish snapshot: {}", e);
            }
        }
    }
}

impl Drop for SnapshotFeed {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

//  Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Phase;
    use std::io::{BufRead, BufReader};

    fn tmp_socket_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "rearrange-feed-test-{}-{}.sock",
            std::process::id(),
            tag
        ))
    }

    #[test]
    fn clients_receive_snapshots_as_json_lines() {
        let path = tmp_socket_path("lines");
        let feed = SnapshotFeed::bind(&path).unwrap();
        let client = UnixStream::connect(&path).expect("connect");
        std::thread::sleep(std::time::Duration::from_millis(150));
        assert_eq!(feed.clients(), 1);

        feed.publish(&DisplayState::finished()).unwrap();

        let mut line = String::new();
        BufReader::new(client).read_line(&mut line).unwrap();
        let json: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(json["status"]["kind"], "finished");
        assert_eq!(json["phase"], serde_json::to_value(Phase::Other).unwrap());
    }

    #[test]
    fn vanished_clients_are_dropped() {
        let path = tmp_socket_path("vanished");
        let feed = SnapshotFeed::bind(&path).unwrap();
        drop(UnixStream::connect(&path).expect("connect"));
        std::thread::sleep(std::time::Duration::from_millis(150));

        // The first write may still be buffered by the kernel.
        for _ in 0..3 {
            feed.publish(&DisplayState::finished()).unwrap();
        }
        assert_eq!(feed.clients(), 0);
    }

    #[test]
    fn socket_file_removed_on_drop() {
        let path = tmp_socket_path("drop");
        let feed = SnapshotFeed::bind(&path).unwrap();
        assert!(path.exists());
        drop(feed);
        assert!(!path.exists());
    }
}
