// src/compression.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Transparent stream compression for object bodies.
//!
//! Writes are pumped from the caller's reader through an optional zstd encoder
//! into a backend sink; reads wrap the backend's raw body in a streaming
//! decoder. `CompressionConfig::None` leaves both directions untouched.

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use bytes::Bytes;
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::trace;
use zstd::stream::raw::{InBuffer, Operation, OutBuffer};

use crate::constants::{DEFAULT_STREAM_BUFFER_SIZE, DEFAULT_ZSTD_LEVEL};
use crate::error::{Result, StoreError};

/// Boxed byte stream handed to `write` and returned by `open`.
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

/// Compression scheme applied to every object body of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionConfig {
    #[default]
    None,
    Zstd { level: i32 },
}

impl CompressionConfig {
    pub fn zstd() -> Self {
        CompressionConfig::Zstd { level: DEFAULT_ZSTD_LEVEL }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, CompressionConfig::None)
    }

    /// Copy `reader` into `sink`, compressing on the way, then flush and shut
    /// the sink down. Returns the number of uncompressed bytes consumed.
    ///
    /// The write is only complete once this returns `Ok`; any error from the
    /// reader, the encoder or the sink is returned unchanged.
    pub async fn compressed_copy<R, W>(&self, reader: &mut R, sink: &mut W) -> Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut buf = vec![0u8; DEFAULT_STREAM_BUFFER_SIZE];
        let mut total = 0u64;
        let mut encoder = match self {
            CompressionConfig::None => None,
            CompressionConfig::Zstd { level } => Some(zstd::Encoder::new(Vec::new(), *level)?),
        };

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            total += n as u64;
            match encoder.as_mut() {
                None => sink.write_all(&buf[..n]).await?,
                Some(enc) => {
                    enc.write_all(&buf[..n])?;
                    let ready = std::mem::take(enc.get_mut());
                    if !ready.is_empty() {
                        sink.write_all(&ready).await?;
                    }
                }
            }
        }

        if let Some(enc) = encoder {
            let tail = enc.finish()?;
            sink.write_all(&tail).await?;
        }
        sink.flush().await?;
        sink.shutdown().await?;
        trace!("compressed_copy: {} bytes in, compression={}", total, self);
        Ok(total)
    }

    /// Wrap a raw backend body so reads yield decompressed bytes.
    pub fn decompressed_reader(&self, raw: ObjectReader) -> ObjectReader {
        match self {
            CompressionConfig::None => raw,
            CompressionConfig::Zstd { .. } => {
                Box::new(StreamReader::new(Box::pin(zstd_decode_stream(raw))))
            }
        }
    }
}

/// Streaming zstd decode. The body must end on a frame boundary; a cut-off
/// object fails with `UnexpectedEof` instead of yielding a short read.
fn zstd_decode_stream(
    raw: ObjectReader,
) -> impl futures::Stream<Item = std::io::Result<Bytes>> + Send + 'static {
    async_stream::try_stream! {
        let mut decoder = zstd::stream::raw::Decoder::new()?;
        let mut chunks = ReaderStream::with_capacity(raw, DEFAULT_STREAM_BUFFER_SIZE);
        // Nothing read yet counts as an unfinished frame: every stored body
        // holds at least one frame, even for empty objects.
        let mut frame_open = true;
        let mut consumed = 0u64;
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            consumed += chunk.len() as u64;
            let mut input = InBuffer::around(&chunk);
            loop {
                let mut out: Vec<u8> = Vec::with_capacity(DEFAULT_STREAM_BUFFER_SIZE);
                let before = input.pos();
                let (hint, full) = {
                    let mut output = OutBuffer::around(&mut out);
                    let hint = decoder.run(&mut input, &mut output)?;
                    (hint, output.pos() == output.capacity())
                };
                // A call with no progress says nothing about frame state.
                if input.pos() > before || !out.is_empty() {
                    frame_open = hint != 0;
                }
                if !out.is_empty() {
                    yield Bytes::from(out);
                }
                if input.pos() == chunk.len() && !full {
                    break;
                }
            }
        }
        if frame_open {
            Err::<(), _>(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("zstd body ends inside a frame after {} bytes", consumed),
            ))?;
        }
    }
}

impl fmt::Display for CompressionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionConfig::None => write!(f, "none"),
            CompressionConfig::Zstd { level } => write!(f, "zstd:{}", level),
        }
    }
}

impl FromStr for CompressionConfig {
    type Err = StoreError;

    /// Accepts `""`, `none`, `zstd` and `zstd:<level>`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "" | "none" => Ok(CompressionConfig::None),
            "zstd" => Ok(CompressionConfig::zstd()),
            other => {
                let level = other
                    .strip_prefix("zstd:")
                    .and_then(|l| l.parse::<i32>().ok())
                    .ok_or_else(|| anyhow::anyhow!("unknown compression scheme: {}", other))?;
                Ok(CompressionConfig::Zstd { level })
            }
        }
    }
}
