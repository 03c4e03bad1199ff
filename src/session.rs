use aes::cipher::StreamCipher;
use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::cipher::DuplexCipher;
use crate::error::{Error, Result};
use crate::{framing, handshake, KEY_SIZE, MAGIC_VERIFY};

/// A byte stream upgraded to a transparent encrypted duplex.
///
/// Everything written is fed through the outbound AES-CTR stream and
/// everything read through the inbound one; no framing is imposed, so the
/// caller must know how many bytes to expect. The handle owns the
/// underlying stream and drops the cipher state with it.
pub struct SecureStream<S> {
    stream: S,
    cipher: DuplexCipher,
    scratch: Vec<u8>,
}

impl<S> SecureStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Run PAKE and the verification round, then wrap the stream.
    ///
    /// The sender proves itself by encrypting the magic constant into one
    /// frame; the receiver decrypts and compares, failing with
    /// [`Error::VerifyFailed`] on mismatch (wrong code or tampering). The
    /// round also advances both keystreams past the magic, so the first raw
    /// byte after the upgrade is aligned on both sides.
    pub async fn upgrade(mut stream: S, code: &str, is_sender: bool) -> Result<Self> {
        if code.is_empty() {
            return Err(Error::EmptyCode);
        }
        let key = handshake::run(&mut stream, code, is_sender).await?;
        let mut secure = Self::from_session_key(stream, &key, is_sender);
        secure.verify(is_sender).await?;
        debug!("secure channel established");
        Ok(secure)
    }

    /// Wrap a stream with ciphers derived from an established session key.
    /// This is the seam tests use to skip PAKE with a fixed key.
    pub fn from_session_key(stream: S, session_key: &[u8; KEY_SIZE], is_sender: bool) -> Self {
        SecureStream {
            stream,
            cipher: DuplexCipher::new(session_key, is_sender),
            scratch: Vec::new(),
        }
    }

    async fn verify(&mut self, is_sender: bool) -> Result<()> {
        if is_sender {
            let mut magic = MAGIC_VERIFY.to_vec();
            self.cipher.enc.apply_keystream(&mut magic);
            framing::send_frame(&mut self.stream, &magic).await
        } else {
            let mut frame = framing::read_frame(&mut self.stream).await?;
            self.cipher.dec.apply_keystream(&mut frame);
            if frame != MAGIC_VERIFY {
                return Err(Error::VerifyFailed);
            }
            Ok(())
        }
    }

    /// Encrypt and write the whole buffer, unframed.
    pub async fn write_all(&mut self, plain: &[u8]) -> Result<()> {
        self.scratch.clear();
        self.scratch.extend_from_slice(plain);
        self.cipher.enc.apply_keystream(&mut self.scratch);
        self.stream.write_all(&self.scratch).await?;
        Ok(())
    }

    /// Read up to `buf.len()` bytes, decrypted in place. Returns 0 at EOF.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.stream.read(buf).await?;
        self.cipher.dec.apply_keystream(&mut buf[..n]);
        Ok(n)
    }

    /// Read exactly `buf.len()` bytes, decrypted in place.
    pub async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.stream.read_exact(buf).await?;
        self.cipher.dec.apply_keystream(buf);
        Ok(())
    }

    /// Encrypt `data` and send it as one length-prefixed frame. Only the
    /// body is encrypted; the length prefix rides in the clear. Used for
    /// the single meta-header frame after the upgrade.
    pub async fn send_frame(&mut self, data: &[u8]) -> Result<()> {
        self.scratch.clear();
        self.scratch.extend_from_slice(data);
        self.cipher.enc.apply_keystream(&mut self.scratch);
        let frame = std::mem::take(&mut self.scratch);
        let res = framing::send_frame(&mut self.stream, &frame).await;
        self.scratch = frame;
        res
    }

    /// Read one length-prefixed frame and decrypt its body.
    pub async fn read_frame(&mut self) -> Result<Vec<u8>> {
        let mut frame = framing::read_frame(&mut self.stream).await?;
        self.cipher.dec.apply_keystream(&mut frame);
        Ok(frame)
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.stream.flush().await?;
        Ok(())
    }

    /// Flush and half-close the write side; the peer observes EOF once it
    /// has drained the stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
