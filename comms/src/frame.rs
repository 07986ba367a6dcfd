//! Framing of `Msg`s over a byte stream.
//!
//! A frame is the body length as a big endian `u32`, the message kind as a
//! big endian `u32` and then the body itself.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::msg::{Header, Msg};

type LenType = u32;
const LEN_SIZE: usize = size_of::<LenType>();
const PREFIX_SIZE: usize = LEN_SIZE + size_of::<Header>();

/// The largest body a frame may carry.
pub const MAX_FRAME_LEN: usize = 64 << 20;

fn check_len(len: usize, kind: io::ErrorKind) -> io::Result<()> {
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            kind,
            format!("frame of {len} bytes exceeds the {MAX_FRAME_LEN} bytes limit"),
        ));
    }

    Ok(())
}

/// The reading half of a connection, decodes one `Msg` per frame.
pub struct FrameReader<R> {
    rx: R,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(rx: R) -> Self {
        Self {
            rx,
            buf: Vec::new(),
        }
    }

    /// Waits for the next message.
    ///
    /// The returned message may borrow from the reader's buffer, so it must be
    /// dropped before reading again.
    ///
    /// # Errors
    /// `UnexpectedEof` if the peer closed the stream, `InvalidData` on an
    /// oversized frame or an undecodable body.
    pub async fn read(&mut self) -> io::Result<Msg<'_>> {
        let mut prefix = [0; PREFIX_SIZE];
        self.rx.read_exact(&mut prefix).await?;

        let (len, kind) = prefix.split_at(LEN_SIZE);
        let len = LenType::from_be_bytes([len[0], len[1], len[2], len[3]]) as usize;
        let kind = Header::from_be_bytes([kind[0], kind[1], kind[2], kind[3]]);
        check_len(len, io::ErrorKind::InvalidData)?;

        self.buf.clear();
        self.buf.resize(len, 0);
        self.rx.read_exact(&mut self.buf).await?;

        Msg::decode(kind, &self.buf)
    }
}

/// The writing half of a connection, encodes one `Msg` per frame.
pub struct FrameWriter<W> {
    tx: W,
    buf: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(tx: W) -> Self {
        Self {
            tx,
            buf: Vec::new(),
        }
    }

    /// Writes `msg` as a single frame and flushes it.
    ///
    /// # Errors
    /// `InvalidInput` if the encoded body exceeds `MAX_FRAME_LEN`, nothing
    /// is written in that case.
    pub async fn write(&mut self, msg: &Msg<'_>) -> io::Result<()> {
        self.buf.clear();
        self.buf.resize(PREFIX_SIZE, 0);
        msg.encode(&mut self.buf)?;

        let len = self.buf.len() - PREFIX_SIZE;
        check_len(len, io::ErrorKind::InvalidInput)?;

        self.buf[..LEN_SIZE].copy_from_slice(&(len as LenType).to_be_bytes());
        self.buf[LEN_SIZE..PREFIX_SIZE].copy_from_slice(&msg.header().to_be_bytes());

        self.tx.write_all(&self.buf).await?;
        self.tx.flush().await
    }
}
