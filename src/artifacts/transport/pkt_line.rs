//! Pkt-line framing
//!
//! ```text
//! 0006a\n     data "a\n" (length counts the 4 prefix bytes)
//! 0000        flush
//! 0001        delimiter
//! 0002        response end
//! ```
//!
//! `0003` is never valid, and neither is any length above 65520.

use crate::artifacts::core::error::GitError;
use crate::artifacts::transport::{MAX_PKT_LEN, PKT_LEN_SIZE};
use bytes::Bytes;
use futures::Stream;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

const SIDEBAND_DATA: u8 = 1;
const SIDEBAND_PROGRESS: u8 = 2;
const SIDEBAND_ERROR: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
    Data(Bytes),
    Flush,
    Delimiter,
    ResponseEnd,
}

impl PktLine {
    pub fn data(payload: impl Into<Bytes>) -> Self {
        PktLine::Data(payload.into())
    }

    pub fn as_data(&self) -> Option<&Bytes> {
        match self {
            PktLine::Data(payload) => Some(payload),
            _ => None,
        }
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) -> anyhow::Result<()> {
        match self {
            PktLine::Flush => out.extend_from_slice(b"0000"),
            PktLine::Delimiter => out.extend_from_slice(b"0001"),
            PktLine::ResponseEnd => out.extend_from_slice(b"0002"),
            PktLine::Data(payload) => {
                let length = payload.len() + PKT_LEN_SIZE;
                if length > MAX_PKT_LEN {
                    anyhow::bail!(GitError::format(format!(
                        "pkt-line payload of {} bytes does not fit in one frame",
                        payload.len()
                    )));
                }
                out.extend_from_slice(hex::encode((length as u16).to_be_bytes()).as_bytes());
                out.extend_from_slice(payload);
            }
        }

        Ok(())
    }

    pub fn encode(&self) -> anyhow::Result<Bytes> {
        let mut out = Vec::new();
        self.encode_into(&mut out)?;
        Ok(out.into())
    }
}

/// Encode a sequence of frames back to back
pub fn encode_lines<'a>(lines: impl IntoIterator<Item = &'a PktLine>) -> anyhow::Result<Bytes> {
    let mut out = Vec::new();
    for line in lines {
        line.encode_into(&mut out)?;
    }
    Ok(out.into())
}

/// What a length prefix announces
enum Header {
    Control(PktLine),
    Payload(usize),
}

fn parse_header(prefix: &[u8]) -> anyhow::Result<Header> {
    let mut raw = [0u8; 2];
    hex::decode_to_slice(prefix, &mut raw).map_err(|_| {
        GitError::format(format!(
            "invalid pkt-line length {:?}",
            String::from_utf8_lossy(prefix)
        ))
    })?;

    match u16::from_be_bytes(raw) as usize {
        0 => Ok(Header::Control(PktLine::Flush)),
        1 => Ok(Header::Control(PktLine::Delimiter)),
        2 => Ok(Header::Control(PktLine::ResponseEnd)),
        3 => anyhow::bail!(GitError::format("reserved pkt-line length 0003")),
        length if length > MAX_PKT_LEN => anyhow::bail!(GitError::format(format!(
            "pkt-line length {length} exceeds {MAX_PKT_LEN}"
        ))),
        length => Ok(Header::Payload(length - PKT_LEN_SIZE)),
    }
}

/// Frames over an in-memory buffer
///
/// `read_next` returns `Ok(None)` once the buffer is exhausted; the iterator
/// stops after the first error.
#[derive(Debug, Clone)]
pub struct PktLineDecoder<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> PktLineDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        PktLineDecoder { data, position: 0 }
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.position..]
    }

    pub fn read_next(&mut self) -> anyhow::Result<Option<PktLine>> {
        let rest = self.remaining();
        if rest.is_empty() {
            return Ok(None);
        }
        if rest.len() < PKT_LEN_SIZE {
            anyhow::bail!(GitError::format("truncated pkt-line length"));
        }

        let line = match parse_header(&rest[..PKT_LEN_SIZE])? {
            Header::Control(line) => {
                self.position += PKT_LEN_SIZE;
                line
            }
            Header::Payload(size) => {
                let payload = rest
                    .get(PKT_LEN_SIZE..PKT_LEN_SIZE + size)
                    .ok_or_else(|| {
                        GitError::format(format!(
                            "pkt-line declares {size} bytes but only {} remain",
                            rest.len() - PKT_LEN_SIZE
                        ))
                    })?;
                self.position += PKT_LEN_SIZE + size;
                PktLine::Data(Bytes::copy_from_slice(payload))
            }
        };

        Ok(Some(line))
    }
}

impl Iterator for PktLineDecoder<'_> {
    type Item = anyhow::Result<PktLine>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_next() {
            Ok(line) => line.map(Ok),
            Err(error) => {
                self.position = self.data.len();
                Some(Err(error))
            }
        }
    }
}

/// Frames over an async byte source, one suspension per frame
#[derive(Debug)]
pub struct PktLineReader<R> {
    reader: R,
}

impl<R: AsyncRead + Unpin> PktLineReader<R> {
    pub fn new(reader: R) -> Self {
        PktLineReader { reader }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Next frame, or `None` at a clean end of stream
    ///
    /// I/O errors from the source are returned unchanged.
    pub async fn read_next(&mut self) -> anyhow::Result<Option<PktLine>> {
        let mut prefix = [0u8; PKT_LEN_SIZE];
        let mut filled = 0;
        while filled < PKT_LEN_SIZE {
            let read = self.reader.read(&mut prefix[filled..]).await?;
            if read == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                anyhow::bail!(GitError::format("truncated pkt-line length"));
            }
            filled += read;
        }

        let line = match parse_header(&prefix)? {
            Header::Control(line) => line,
            Header::Payload(size) => {
                let mut payload = vec![0u8; size];
                match self.reader.read_exact(&mut payload).await {
                    Ok(_) => PktLine::Data(payload.into()),
                    Err(error) if error.kind() == std::io::ErrorKind::UnexpectedEof => {
                        anyhow::bail!(GitError::format(format!(
                            "pkt-line declares {size} bytes but the stream ended"
                        )))
                    }
                    Err(error) => return Err(error.into()),
                }
            }
        };
        trace!(frame = ?line, "read pkt-line");

        Ok(Some(line))
    }

    /// Lazy stream of frames; ends at end of stream or after the first error
    pub fn into_stream(self) -> impl Stream<Item = anyhow::Result<PktLine>> {
        futures::stream::try_unfold(self, |mut reader| async move {
            let line = reader.read_next().await?;
            Ok::<_, anyhow::Error>(line.map(|line| (line, reader)))
        })
    }
}

/// A demultiplexed side-band-64k payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideBand {
    Data(Bytes),
    Progress(Bytes),
    Error(Bytes),
}

impl SideBand {
    pub fn demux(payload: &Bytes) -> anyhow::Result<SideBand> {
        let Some(&channel) = payload.first() else {
            anyhow::bail!(GitError::format("empty side-band frame"));
        };
        let body = payload.slice(1..);

        match channel {
            SIDEBAND_DATA => Ok(SideBand::Data(body)),
            SIDEBAND_PROGRESS => Ok(SideBand::Progress(body)),
            SIDEBAND_ERROR => Ok(SideBand::Error(body)),
            other => anyhow::bail!(GitError::format(format!("unknown side-band channel {other}"))),
        }
    }

    pub fn to_pkt_line(&self) -> PktLine {
        let (channel, body) = match self {
            SideBand::Data(body) => (SIDEBAND_DATA, body),
            SideBand::Progress(body) => (SIDEBAND_PROGRESS, body),
            SideBand::Error(body) => (SIDEBAND_ERROR, body),
        };
        let mut payload = Vec::with_capacity(body.len() + 1);
        payload.push(channel);
        payload.extend_from_slice(body);
        PktLine::Data(payload.into())
    }
}
