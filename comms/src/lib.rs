//! Wire protocol between workers: framed JSON commands and replies.

mod frame;
pub mod msg;
pub mod specs;

use tokio::io::{AsyncRead, AsyncWrite};

pub use frame::{FrameReader, FrameWriter, MAX_FRAME_LEN};

/// Wraps both halves of a connection.
pub fn channel<R, W>(rx: R, tx: W) -> (FrameReader<R>, FrameWriter<W>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    (FrameReader::new(rx), FrameWriter::new(tx))
}
