//! Length-prefixed framing for the relay wire protocol.
//!
//! Every field of an exchange (token, query, response) is one frame: a 4-byte
//! big-endian length followed by that many bytes. A frame longer than the
//! configured limit is refused instead of being truncated.

use crate::error::RelayError;
use hopgate_core::ListenConfig;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

/// Write one frame and flush it.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8], max_frame_bytes: u32) -> Result<(), RelayError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= max_frame_bytes)
        .ok_or_else(|| {
            RelayError::Malformed(format!(
                "frame of {} bytes exceeds the {} byte limit",
                payload.len(),
                max_frame_bytes
            ))
        })?;

    writer
        .write_u32(len)
        .await
        .map_err(|e| RelayError::transport("failed to send frame", e))?;
    writer
        .write_all(payload)
        .await
        .map_err(|e| RelayError::transport("failed to send frame", e))?;
    writer
        .flush()
        .await
        .map_err(|e| RelayError::transport("failed to send frame", e))
}

/// Read one frame.
pub async fn read_frame<R>(reader: &mut R, max_frame_bytes: u32) -> Result<Vec<u8>, RelayError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let len = reader
        .read_u32()
        .await
        .map_err(|e| RelayError::transport("failed to receive frame", e))?;
    if len > max_frame_bytes {
        return Err(RelayError::Malformed(format!(
            "frame of {} bytes exceeds the {} byte limit",
            len, max_frame_bytes
        )));
    }

    let mut payload = vec![0u8; len as usize];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| RelayError::transport("failed to receive frame", e))?;
    Ok(payload)
}

/// Frame size limit and per-frame I/O timeout shared by both relay ends.
#[derive(Debug, Clone, Copy)]
pub struct Framing {
    pub max_frame_bytes: u32,
    pub io_timeout: Duration,
}

impl Framing {
    pub fn new(max_frame_bytes: u32, io_timeout: Duration) -> Self {
        Self {
            max_frame_bytes,
            io_timeout,
        }
    }

    pub fn from_listen(listen: &ListenConfig) -> Self {
        Self::new(listen.max_frame_bytes, listen.io_timeout())
    }

    pub async fn read<R>(&self, reader: &mut R) -> Result<Vec<u8>, RelayError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        timeout(self.io_timeout, read_frame(reader, self.max_frame_bytes))
            .await
            .map_err(|_| RelayError::Timeout(self.io_timeout))?
    }

    /// Read a frame that must be non-empty UTF-8 text.
    pub async fn read_text<R>(&self, reader: &mut R) -> Result<String, RelayError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let bytes = self.read(reader).await?;
        if bytes.is_empty() {
            return Err(RelayError::Malformed("empty payload".to_string()));
        }
        String::from_utf8(bytes)
            .map_err(|e| RelayError::Decode(format!("payload is not valid UTF-8: {}", e)))
    }

    pub async fn write<W>(&self, writer: &mut W, payload: &[u8]) -> Result<(), RelayError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        timeout(self.io_timeout, write_frame(writer, payload, self.max_frame_bytes))
            .await
            .map_err(|_| RelayError::Timeout(self.io_timeout))?
    }
}

impl Default for Framing {
    fn default() -> Self {
        Self::from_listen(&ListenConfig::default())
    }
}
