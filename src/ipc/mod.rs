//! Transports around the controller.
//!
//! Commands come in as newline-delimited JSON (see
//! [`command`](crate::command) for the wire format), either over a Unix
//! socket ([`listener`]) or on stdin ([`stdin`]).  Display snapshots go out
//! the same way over a second socket ([`feed`]).

#[cfg(unix)]
pub mod feed;
#[cfg(unix)]
pub mod listener;
pub mod stdin;

use crate::command::Command;
use log::{debug, error, info};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc;

/// Errors shared by the transports.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// `$XDG_RUNTIME_DIR/<name>`, or the temp dir when that is unset.
pub fn runtime_path(name: &str) -> PathBuf {
    std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join(name)
}

/// How [`forward_lines`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Forwarded {
    /// The reader ran dry or failed.
    Eof,
    /// Nobody listens on the sink any more.
    SinkClosed,
}

/// Parse every line of `reader` as a [`Command`] and send it to `sink`.
///
/// Blank lines are skipped and malformed ones logged.
pub(crate) fn forward_lines<R: BufRead>(reader: R, sink: &mpsc::Sender<Command>) -> Forwarded {
    for line in reader.lines() {
        match line {
            Ok(ref text) if text.trim().is_empty() => continue,
            Ok(text) => match serde_json::from_str::<Command>(&text) {
                Ok(cmd) => {
                    debug!("received {:?}", cmd);
                    if sink.send(cmd).is_err() {
                        info!("sink closed, shutting down");
                        return Forwarded::SinkClosed;
                    }
                }
                Err(e) => {
                    error!("bad command: {}: {}", text, e);
                }
            },
            Err(e) => {
                error!("read error: {}", e);
                break;
            }
        }
    }
    Forwarded::Eof
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn forwards_valid_lines_only() {
        let input = "{\"PointerMove\":{\"x\":1,\"y\":2}}\n\nnot json\n{\"Key\":\"space\"}\n";
        let (tx, rx) = mpsc::channel();
        assert_eq!(forward_lines(Cursor::new(input), &tx), Forwarded::Eof);
        let cmds: Vec<Command> = rx.try_iter().collect();
        assert_eq!(
            cmds,
            vec![
                Command::PointerMove { x: 1, y: 2 },
                Command::Key(crate::command::Key::Space),
            ]
        );
    }

    #[test]
    fn stops_when_sink_is_gone() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let input = "{\"Key\":\"escape\"}\n{\"Key\":\"escape\"}\n";
        assert_eq!(forward_lines(Cursor::new(input), &tx), Forwarded::SinkClosed);
    }
}
