//! Chunked output buffering.
//!
//! Renderers write into a string buffer and flush a chunk to the HTTP
//! layer once it grows past the configured threshold (~40 KB). Going
//! back and forth per row would dominate the cost otherwise. Flushing
//! fails when the client went away; producers treat that as a signal to
//! stop pulling from the cursor.

use bytes::Bytes;
use futures::Stream;
use tokio::sync::mpsc;

/// The consumer dropped the response body.
#[derive(Debug)]
pub struct Disconnected;

/// Buffered chunk writer feeding an mpsc channel.
pub struct ChunkWriter {
    buffer: String,
    tx: mpsc::Sender<Bytes>,
    chunk_size: usize,
}

impl ChunkWriter {
    pub fn write(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    /// Hand the buffer to the client when it crossed the chunk threshold.
    pub async fn maybe_flush(&mut self) -> Result<(), Disconnected> {
        if self.buffer.len() >= self.chunk_size {
            self.flush().await?;
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<(), Disconnected> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let chunk = Bytes::from(std::mem::take(&mut self.buffer));
        self.tx.send(chunk).await.map_err(|_| Disconnected)
    }

    /// Flush the remainder and close the stream.
    pub async fn finish(mut self) -> Result<(), Disconnected> {
        self.flush().await
    }
}

/// Run a producer on its own task and expose its output as a byte stream.
///
/// The producer stops at the next chunk boundary when the stream is
/// dropped (client disconnect): its sends start failing and it bails out.
pub fn spawn_chunk_stream<F, Fut>(
    chunk_size: usize,
    producer: F,
) -> impl Stream<Item = Bytes> + Send
where
    F: FnOnce(ChunkWriter) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    let (tx, rx) = mpsc::channel::<Bytes>(8);
    let writer = ChunkWriter {
        buffer: String::new(),
        tx,
        chunk_size: chunk_size.max(1),
    };
    tokio::spawn(async move {
        producer(writer).await;
    });
    futures::stream::unfold(rx, |mut rx| async move {
        let chunk = rx.recv().await?;
        Some((chunk, rx))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn small_writes_coalesce_into_chunks() {
        let stream = spawn_chunk_stream(10, |mut out| async move {
            for _ in 0..5 {
                out.write("abc");
                out.maybe_flush().await.unwrap();
            }
            out.finish().await.unwrap();
        });
        let chunks: Vec<Bytes> = stream.collect().await;
        let total: String = chunks
            .iter()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect();
        assert_eq!(total, "abc".repeat(5));
        assert!(chunks.len() >= 2, "expected chunking, got {}", chunks.len());
    }

    #[tokio::test]
    async fn dropping_the_stream_stops_the_producer() {
        let (done_tx, done_rx) = tokio::sync::oneshot::channel::<bool>();
        let stream = spawn_chunk_stream(1, |mut out| async move {
            let mut disconnected = false;
            for _ in 0..1000 {
                out.write("data");
                if out.flush().await.is_err() {
                    disconnected = true;
                    break;
                }
            }
            let _ = done_tx.send(disconnected);
        });
        // Read one chunk, then hang up.
        futures::pin_mut!(stream);
        let _ = stream.next().await;
        drop(stream);
        assert!(done_rx.await.unwrap(), "producer should notice the hangup");
    }
}
