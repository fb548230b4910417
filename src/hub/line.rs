use super::HubLink;
use crate::error::HubError;
use async_trait::async_trait;
use std::io::ErrorKind;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Stdout};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, info, warn};

const COMMAND_QUEUE: usize = 32;

/// Hub bridge speaking newline-delimited text
///
/// A reader task turns input lines into queued commands so that
/// `poll_command` never blocks the node loop.
pub struct LineHub<W> {
    writer: W,
    commands: mpsc::Receiver<String>,
    input_closed: bool,
}

impl LineHub<Stdout> {
    /// Bridge over the process stdin/stdout
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl<W> LineHub<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new<I>(input: I, writer: W) -> Self
    where
        I: AsyncRead + Unpin + Send + 'static,
    {
        let (sender, commands) = mpsc::channel(COMMAND_QUEUE);

        tokio::spawn(async move {
            let mut lines = BufReader::new(input).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            continue;
                        }
                        debug!("Hub line received: {}", line);
                        if sender.send(line).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Hub input error: {}", e);
                        break;
                    }
                }
            }
            debug!("Hub reader task exited");
        });

        Self {
            writer,
            commands,
            input_closed: false,
        }
    }
}

#[async_trait]
impl<W> HubLink for LineHub<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn publish(&mut self, line: &str) -> Result<(), HubError> {
        let publish_error = |e: std::io::Error| match e.kind() {
            ErrorKind::BrokenPipe | ErrorKind::UnexpectedEof => HubError::Closed,
            _ => HubError::Publish {
                details: e.to_string(),
            },
        };
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(publish_error)?;
        self.writer.write_all(b"\n").await.map_err(publish_error)?;
        self.writer.flush().await.map_err(publish_error)?;
        Ok(())
    }

    async fn poll_command(&mut self) -> Result<Option<String>, HubError> {
        match self.commands.try_recv() {
            Ok(line) => Ok(Some(line)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                if !self.input_closed {
                    info!("Hub input closed, no further commands will arrive");
                    self.input_closed = true;
                }
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_line_hub_round_trip() {
        let (mut backend_in, node_in) = tokio::io::duplex(256);
        let (node_out, mut backend_out) = tokio::io::duplex(256);
        let mut hub = LineHub::new(node_in, node_out);

        backend_in.write_all(b"CAMARA1;TEL:ON\n\n").await.unwrap();

        let mut received = None;
        for _ in 0..50 {
            if let Some(line) = hub.poll_command().await.unwrap() {
                received = Some(line);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(received.as_deref(), Some("CAMARA1;TEL:ON"));

        hub.publish("CAMARA1;Reply=CAMARA1:OK").await.unwrap();
        let mut buffer = vec![0u8; 25];
        backend_out.read_exact(&mut buffer).await.unwrap();
        assert_eq!(buffer, b"CAMARA1;Reply=CAMARA1:OK\n");
    }

    #[tokio::test]
    async fn test_closed_input_is_quiet() {
        let (backend_in, node_in) = tokio::io::duplex(16);
        let (node_out, _backend_out) = tokio::io::duplex(16);
        let mut hub = LineHub::new(node_in, node_out);
        drop(backend_in);

        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert_eq!(hub.poll_command().await.unwrap(), None);
        }
        assert!(hub.input_closed);
    }
}
