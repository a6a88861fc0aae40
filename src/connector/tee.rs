//! Records every byte read from the client during the handshake phase so it
//! can be replayed to the backend verbatim before the pump begins.

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

pub struct Tee<R> {
    inner: R,
    captured: Vec<u8>,
}

impl<R: AsyncRead + Unpin> Tee<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            captured: Vec::new(),
        }
    }

    pub fn captured(&self) -> &[u8] {
        &self.captured
    }

    pub fn into_captured(self) -> Vec<u8> {
        self.captured
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for Tee<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            let after = buf.filled().len();
            this.captured.extend_from_slice(&buf.filled()[before..after]);
        }
        poll
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn captures_every_byte_read() {
        let mut tee = Tee::new(Cursor::new(vec![1u8, 2, 3, 4, 5]));
        let mut first = [0u8; 2];
        tee.read_exact(&mut first).await.unwrap();
        let mut rest = [0u8; 3];
        tee.read_exact(&mut rest).await.unwrap();

        assert_eq!(tee.captured(), &[1, 2, 3, 4, 5]);
    }
}
