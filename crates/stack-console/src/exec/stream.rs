use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

use crate::events::OutputLine;

/// Reads `reader` to EOF, sending each line as soon as it is complete.
/// Invalid UTF-8 is replaced rather than dropped.
pub(crate) async fn forward_lines<R>(
    reader: R,
    is_error: bool,
    tx: mpsc::UnboundedSender<OutputLine>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                while matches!(buf.last(), Some(b'\n' | b'\r')) {
                    buf.pop();
                }
                let text = String::from_utf8_lossy(&buf).to_string();
                let _ = tx.send(OutputLine { text, is_error });
            }
            Err(err) => {
                tracing::debug!(error = %err, "output stream read failed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn splits_lines_and_keeps_unterminated_tail() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let input: &[u8] = b"pulling web\r\npulling db\nlast";
        forward_lines(input, true, tx).await;
        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            assert!(line.is_error);
            lines.push(line.text);
        }
        assert_eq!(lines, vec!["pulling web", "pulling db", "last"]);
    }

    #[tokio::test]
    async fn replaces_invalid_utf8() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let input: &[u8] = b"ok \xff\n";
        forward_lines(input, false, tx).await;
        let line = rx.recv().await.expect("line");
        assert_eq!(line.text, "ok \u{fffd}");
    }
}
