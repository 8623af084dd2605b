//! Built-in listeners for the step count channel.

use super::{Broadcast, ListenerResult};
use log::info;
use parking_lot::Mutex;
use std::io::Write;

/// Writes every broadcast as one JSON line, for consumption by other processes.
pub struct JsonLinesListener<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesListener<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn handle(&self, broadcast: &Broadcast) -> ListenerResult {
        let line = broadcast.to_json()?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }

    /// Recover the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

/// Logs every step count update at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogListener;

impl LogListener {
    pub fn handle(&self, broadcast: &Broadcast) -> ListenerResult {
        info!(
            "[{}] step_count={}",
            broadcast.channel, broadcast.payload.step_count
        );
        Ok(())
    }
}
