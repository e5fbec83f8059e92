use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf,
};

use crate::protocol::{ProtocolError, TrainerRequest, TrainerResponse};

/// Newline-delimited JSON over any async byte stream: one message per
/// line. TCP in the binary, an in-memory duplex in tests.
pub struct JsonLinesTransport<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
    line: String,
}

impl<S: AsyncRead + AsyncWrite> JsonLinesTransport<S> {
    pub fn new(stream: S) -> Self {
        let (read, write) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(read),
            writer: write,
            line: String::new(),
        }
    }

    /// One request off the wire. Ok(None) is a clean disconnect.
    pub async fn recv(&mut self) -> Result<Option<TrainerRequest>, ProtocolError> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line).await? == 0 {
                return Ok(None);
            }
            let raw = self.line.trim();
            if !raw.is_empty() {
                return Ok(Some(serde_json::from_str(raw)?));
            }
        }
    }

    pub async fn send(&mut self, response: &TrainerResponse) -> Result<(), ProtocolError> {
        let mut payload = serde_json::to_vec(response)?;
        payload.push(b'\n');
        self.writer.write_all(&payload).await?;
        self.writer.flush().await?;
        Ok(())
    }
}
