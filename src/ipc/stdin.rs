//! [`CommandSource`] reading newline-delimited JSON from any [`BufRead`],
//! normally stdin.  Available on every platform.

use super::{forward_lines, IpcError};
use crate::command::Command;
use crate::traits::CommandSource;
use log::info;
use std::io::{BufRead, BufReader, Stdin};
use std::sync::mpsc;

/// Forwards every line of `R` until end of input.
pub struct LineSource<R> {
    reader: Option<R>,
}

/// Commands piped into the process.
pub type StdinSource = LineSource<BufReader<Stdin>>;

impl<R: BufRead + Send> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
        }
    }
}

impl StdinSource {
    pub fn stdin() -> Self {
        LineSource::new(BufReader::new(std::io::stdin()))
    }
}

impl<R: BufRead + Send> CommandSource for LineSource<R> {
    type Error = IpcError;

    /// Read until end of input.  A second call returns immediately.
    fn run(&mut self, sink: mpsc::Sender<Command>) -> Result<(), IpcError> {
        if let Some(reader) = self.reader.take() {
            forward_lines(reader, &sink);
            info!("end of command input");
        }
        Ok(())
    }
}
