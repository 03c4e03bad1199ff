use hkdf::Hkdf;
use log::debug;
use sha2::Sha256;
use spake2::{Ed25519Group, Identity, Password, Spake2};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{Error, Result};
use crate::{framing, KEY_SIZE};

const SENDER_ID: &[u8] = b"wormhole:sender";
const RECEIVER_ID: &[u8] = b"wormhole:receiver";
const SESSION_KEY_INFO: &[u8] = b"wormhole session key v1";

/// Run the PAKE exchange over the framed stream and derive the session key.
///
/// The sender is party A and speaks first: it sends its public state, then
/// reads the peer's. The receiver mirrors the order. A wrong code is NOT
/// detected here; both sides simply end up with different keys and the
/// verification round catches it.
pub async fn run<S>(stream: &mut S, code: &str, is_sender: bool) -> Result<[u8; KEY_SIZE]>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let password = Password::new(code.as_bytes());
    let sender_id = Identity::new(SENDER_ID);
    let receiver_id = Identity::new(RECEIVER_ID);

    let shared = if is_sender {
        let (state, outbound) =
            Spake2::<Ed25519Group>::start_a(&password, &sender_id, &receiver_id);
        framing::send_frame(stream, &outbound).await.map_err(map_io)?;
        let inbound = framing::read_frame(stream).await.map_err(map_io)?;
        state
            .finish(&inbound)
            .map_err(|e| Error::Handshake(format!("{e:?}")))?
    } else {
        let (state, outbound) =
            Spake2::<Ed25519Group>::start_b(&password, &sender_id, &receiver_id);
        let inbound = framing::read_frame(stream).await.map_err(map_io)?;
        framing::send_frame(stream, &outbound).await.map_err(map_io)?;
        state
            .finish(&inbound)
            .map_err(|e| Error::Handshake(format!("{e:?}")))?
    };
    debug!("pake exchange complete, deriving session key");

    let hk = Hkdf::<Sha256>::new(None, &shared);
    let mut key = [0u8; KEY_SIZE];
    hk.expand(SESSION_KEY_INFO, &mut key)
        .expect("32 bytes is a valid HKDF output length");
    Ok(key)
}

/// A clean EOF mid-exchange means the relay closed us out: either the
/// pairing window elapsed or we were a same-role duplicate. Nothing else
/// writes on an unpaired relay socket. Any other I/O failure here is a
/// broken key exchange; oversize frames keep their own kind.
fn map_io(err: Error) -> Error {
    match err {
        Error::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Error::PeerTimeout,
        Error::Io(e) => Error::Handshake(e.to_string()),
        other => other,
    }
}
