//! Console adapter: forwards stdin lines to the orchestrator

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Reads stdin on its own task. The receiver closes at end of input.
pub fn spawn_stdin_reader(capacity: usize) -> (mpsc::Receiver<String>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity);
    let task = tokio::spawn(forward_lines(BufReader::new(tokio::io::stdin()), tx));
    (rx, task)
}

/// Forwards `reader` line by line until end of input.
///
/// Bytes that are not UTF-8 are replaced rather than ending the stream, so a
/// garbled line is just another line the grammar ignores.
pub async fn forward_lines<R>(mut reader: R, lines_out: mpsc::Sender<String>)
where
    R: AsyncBufRead + Unpin,
{
    let mut raw = Vec::new();
    loop {
        raw.clear();
        match reader.read_until(b'\n', &mut raw).await {
            Ok(0) => {
                debug!("Console reached end of input");
                return;
            }
            Ok(_) => {
                let line = decode_line(&raw);
                if lines_out.send(line).await.is_err() {
                    debug!("Orchestrator gone, stopping console reader");
                    return;
                }
            }
            Err(e) => {
                warn!("Failed to read console input: {}", e);
                return;
            }
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}
