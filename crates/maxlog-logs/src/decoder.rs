use futures::Stream;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tracing::trace;

use maxlog_types::{Framing, StreamKind};

use crate::error::StreamError;
use crate::source::{BoxedReader, LogSource};

/// Size of a multiplexed frame header
pub const HEADER_LEN: usize = 8;

/// Largest payload a single frame may declare
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// A decoded line with its terminator removed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawLine {
    /// Stream tag from the frame header (framed mode only)
    pub stream: Option<StreamKind>,

    /// Message text, timestamp token already stripped
    pub text: String,
}

/// One multiplexed record
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub stream: StreamKind,
    pub payload: String,
}

impl Record {
    /// Message part of a `"<timestamp> <message>"` payload
    pub fn message(&self) -> Option<&str> {
        split_timestamp(&self.payload)
    }
}

/// Split off the leading timestamp token; None when there is no separator
pub fn split_timestamp(payload: &str) -> Option<&str> {
    payload.split_once(' ').map(|(_, message)| message)
}

fn trim_line_end(text: &str) -> &str {
    text.trim_end_matches(['\n', '\r'])
}

/// Read until `buf` is full or the stream ends; returns the byte count read
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Decoder for the local runtime's `[type:1][reserved:3][length:4 BE]` framing
pub struct FrameDecoder<R> {
    reader: R,
    header: [u8; HEADER_LEN],
    payload: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            header: [0; HEADER_LEN],
            payload: Vec::new(),
        }
    }

    /// Read the next record. Ok(None) at end of data, including truncation.
    pub async fn next_record(&mut self) -> Result<Option<Record>, StreamError> {
        let n = read_full(&mut self.reader, &mut self.header).await?;
        if n == 0 {
            return Ok(None);
        }
        if n < HEADER_LEN {
            trace!(bytes = n, "truncated frame header at end of stream");
            return Ok(None);
        }

        let stream = StreamKind::from(self.header[0]);
        let len = u32::from_be_bytes([
            self.header[4],
            self.header[5],
            self.header[6],
            self.header[7],
        ]) as usize;
        if len > MAX_FRAME_LEN {
            return Err(StreamError::FrameTooLarge {
                len,
                max: MAX_FRAME_LEN,
            });
        }

        // Reuse the payload buffer so only one record is held at a time
        self.payload.clear();
        self.payload.resize(len, 0);
        let n = read_full(&mut self.reader, &mut self.payload).await?;
        if n < len {
            trace!(declared = len, received = n, "truncated frame payload at end of stream");
            return Ok(None);
        }

        Ok(Some(Record {
            stream,
            payload: String::from_utf8_lossy(&self.payload).into_owned(),
        }))
    }

    /// Next well-formed line; records without a timestamp separator are skipped
    pub async fn next_line(&mut self) -> Result<Option<RawLine>, StreamError> {
        while let Some(record) = self.next_record().await? {
            match record.message() {
                Some(message) => {
                    return Ok(Some(RawLine {
                        stream: Some(record.stream),
                        text: trim_line_end(message).to_string(),
                    }));
                }
                None => trace!("dropping record without timestamp separator"),
            }
        }
        Ok(None)
    }
}

/// Decoder for newline-delimited text
pub struct LineDecoder<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> LineDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    pub async fn next_line(&mut self) -> Result<Option<RawLine>, StreamError> {
        self.buf.clear();
        let n = self.reader.read_until(b'\n', &mut self.buf).await?;
        if n == 0 {
            return Ok(None);
        }
        let text = String::from_utf8_lossy(&self.buf);
        Ok(Some(RawLine {
            stream: None,
            text: trim_line_end(&text).to_string(),
        }))
    }
}

/// Decoder chosen by a source's framing
pub enum SourceDecoder {
    Framed(FrameDecoder<BoxedReader>),
    Lines(LineDecoder<BufReader<BoxedReader>>),
}

impl SourceDecoder {
    pub fn new(framing: Framing, reader: BoxedReader) -> Self {
        match framing {
            Framing::Multiplexed => Self::Framed(FrameDecoder::new(reader)),
            Framing::Lines => Self::Lines(LineDecoder::new(BufReader::new(reader))),
        }
    }

    pub async fn next_line(&mut self) -> Result<Option<RawLine>, StreamError> {
        match self {
            Self::Framed(decoder) => decoder.next_line().await,
            Self::Lines(decoder) => decoder.next_line().await,
        }
    }
}

/// Lazily decode a source into lines; ends on end-of-stream, fails on read errors
pub fn decode(source: LogSource) -> impl Stream<Item = Result<RawLine, StreamError>> + Send {
    let (_, framing, reader) = source.into_parts();
    futures::stream::try_unfold(
        SourceDecoder::new(framing, reader),
        |mut decoder| async move {
            let line = decoder.next_line().await?;
            Ok::<_, StreamError>(line.map(|line| (line, decoder)))
        },
    )
}
