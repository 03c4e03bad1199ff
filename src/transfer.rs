use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{Error, Result};
use crate::session::SecureStream;
use crate::{BUFFER_SIZE, MAX_FRAME_LEN, META_FRAME_MAX, ROLE_RECEIVER, ROLE_SENDER, ROOM_ID_LEN};

const MAX_NAME_LEN: usize = 4096;
const FALLBACK_NAME: &str = "received";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum PayloadKind {
    File = 1,
    Text = 2,
}

impl From<PayloadKind> for u8 {
    fn from(kind: PayloadKind) -> u8 {
        kind as u8
    }
}

impl TryFrom<u8> for PayloadKind {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, String> {
        match value {
            1 => Ok(PayloadKind::File),
            2 => Ok(PayloadKind::Text),
            other => Err(format!("unknown payload type: {other}")),
        }
    }
}

/// First (and only) frame on the encrypted channel; everything after it is
/// the raw body of exactly `size` bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaHeader {
    #[serde(rename = "t")]
    pub kind: PayloadKind,
    #[serde(rename = "n", default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(rename = "s")]
    pub size: i64,
    #[serde(rename = "m", default, skip_serializing_if = "mode_is_zero")]
    pub mode: u32,
}

fn mode_is_zero(mode: &u32) -> bool {
    *mode == 0
}

/// What the receiving side ended up with.
#[derive(Debug)]
pub enum Received {
    File(PathBuf),
    Text(String),
}

/// Strip an optional `tcp://` scheme prefix.
pub fn parse_relay_addr(addr: &str) -> &str {
    let addr = addr.trim();
    addr.strip_prefix("tcp://").unwrap_or(addr)
}

/// The relay buckets connections by the first four bytes of the code,
/// zero-padded when shorter.
pub fn room_id(code: &str) -> [u8; ROOM_ID_LEN] {
    let mut id = [0u8; ROOM_ID_LEN];
    let bytes = code.as_bytes();
    let n = bytes.len().min(ROOM_ID_LEN);
    id[..n].copy_from_slice(&bytes[..n]);
    id
}

/// Connect to the relay and announce room and role. The relay answers
/// nothing; once an opposite-role peer shows up in the same room, bytes
/// flow both ways.
pub async fn dial_relay(relay_addr: &str, code: &str, is_sender: bool) -> Result<TcpStream> {
    if code.is_empty() {
        return Err(Error::EmptyCode);
    }
    let addr = parse_relay_addr(relay_addr);
    debug!("dialing relay at {addr}");
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(Error::ConnectionRefused)?;

    let mut header = [0u8; ROOM_ID_LEN + 1];
    header[..ROOM_ID_LEN].copy_from_slice(&room_id(code));
    header[ROOM_ID_LEN] = if is_sender { ROLE_SENDER } else { ROLE_RECEIVER };
    stream.write_all(&header).await?;
    Ok(stream)
}

/// Send one file through the tunnel. `progress(written, total)` fires after
/// every buffer that lands on the encrypted stream.
pub async fn send_file<F>(relay_addr: &str, code: &str, path: &Path, mut progress: F) -> Result<()>
where
    F: FnMut(u64, u64),
{
    let meta = tokio::fs::metadata(path).await?;
    if !meta.is_file() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("not a regular file: {}", path.display()),
        )));
    }
    let size = meta.len();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let conn = dial_relay(relay_addr, code, true).await?;
    let mut secure = SecureStream::upgrade(conn, code, true).await?;

    let header = MetaHeader {
        kind: PayloadKind::File,
        name: name.clone(),
        size: size as i64,
        mode: file_mode(&meta),
    };
    send_meta(&mut secure, &header).await?;
    info!("sending file {name} ({size} bytes)");

    let mut file = tokio::fs::File::open(path).await?;
    let mut buf = vec![0u8; BUFFER_SIZE];
    let mut written = 0u64;
    while written < size {
        let want = BUFFER_SIZE.min((size - written) as usize);
        let n = file.read(&mut buf[..want]).await?;
        if n == 0 {
            // Source shrank under us; the declared size can no longer be
            // honored and the receiver would hang waiting for the rest.
            return Err(Error::TruncatedSource {
                written,
                expected: size,
            });
        }
        secure.write_all(&buf[..n]).await?;
        written += n as u64;
        progress(written, size);
    }
    if size == 0 {
        progress(0, 0);
    }
    secure.flush().await?;
    secure.shutdown().await?;
    debug!("file transfer complete, {written} bytes");
    Ok(())
}

/// Send a text blob through the tunnel.
pub async fn send_text(relay_addr: &str, code: &str, text: &str) -> Result<()> {
    let conn = dial_relay(relay_addr, code, true).await?;
    let mut secure = SecureStream::upgrade(conn, code, true).await?;

    let header = MetaHeader {
        kind: PayloadKind::Text,
        name: String::new(),
        size: text.len() as i64,
        mode: 0,
    };
    send_meta(&mut secure, &header).await?;
    secure.write_all(text.as_bytes()).await?;
    secure.flush().await?;
    secure.shutdown().await?;
    info!("sent {} bytes of text", text.len());
    Ok(())
}

/// Receive whatever the sender offers: a file lands under `out_dir`, text
/// is returned in memory. Reading stops after exactly the declared size;
/// anything further on the socket is ignored.
pub async fn receive<F>(
    relay_addr: &str,
    code: &str,
    out_dir: &Path,
    mut progress: F,
) -> Result<Received>
where
    F: FnMut(u64, u64),
{
    let conn = dial_relay(relay_addr, code, false).await?;
    let mut secure = SecureStream::upgrade(conn, code, false).await?;

    let header = read_meta(&mut secure).await?;
    if header.size < 0 {
        return Err(Error::Protocol(format!("negative size {}", header.size)));
    }
    let size = header.size as u64;

    match header.kind {
        PayloadKind::File => {
            let name = sanitize_name(&header.name)?;
            let out_path = out_dir.join(&name);
            info!("receiving file {name} ({size} bytes) into {}", out_dir.display());

            let mut opts = tokio::fs::OpenOptions::new();
            opts.create(true).write(true).truncate(true);
            #[cfg(unix)]
            opts.mode(header.mode & 0o777);
            let mut file = opts.open(&out_path).await?;

            let mut buf = vec![0u8; BUFFER_SIZE];
            let mut read = 0u64;
            while read < size {
                let want = BUFFER_SIZE.min((size - read) as usize);
                secure.read_exact(&mut buf[..want]).await?;
                file.write_all(&buf[..want]).await?;
                read += want as u64;
                progress(read, size);
            }
            file.flush().await?;
            if size == 0 {
                progress(0, 0);
            }
            debug!("file received, {read} bytes");
            Ok(Received::File(out_path))
        }
        PayloadKind::Text => {
            if size > MAX_FRAME_LEN as u64 {
                return Err(Error::Protocol(format!("text size {size} exceeds limit")));
            }
            let mut data = vec![0u8; size as usize];
            secure.read_exact(&mut data).await?;
            debug!("text received, {size} bytes");
            Ok(Received::Text(String::from_utf8_lossy(&data).into_owned()))
        }
    }
}

async fn send_meta(secure: &mut SecureStream<TcpStream>, header: &MetaHeader) -> Result<()> {
    let encoded = serde_json::to_vec(header).map_err(|e| Error::Protocol(e.to_string()))?;
    secure.send_frame(&encoded).await
}

async fn read_meta(secure: &mut SecureStream<TcpStream>) -> Result<MetaHeader> {
    let frame = secure.read_frame().await?;
    if frame.len() > META_FRAME_MAX {
        return Err(Error::InvalidFrameSize(frame.len() as u32));
    }
    serde_json::from_slice(&frame).map_err(|e| Error::Protocol(e.to_string()))
}

/// An empty name falls back to a safe default; anything that could escape
/// the output directory is refused outright.
fn sanitize_name(name: &str) -> Result<String> {
    if name.is_empty() {
        return Ok(FALLBACK_NAME.to_string());
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::Protocol(format!(
            "file name length {} exceeds {MAX_NAME_LEN}",
            name.len()
        )));
    }
    if name.contains('/') || name.contains('\\') || name == ".." {
        return Err(Error::UnsafeName(name.to_string()));
    }
    Ok(name.to_string())
}

fn file_mode(meta: &std::fs::Metadata) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o777
    }
    #[cfg(not(unix))]
    {
        let _ = meta;
        0o644
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_id_pads_short_codes() {
        assert_eq!(room_id("ab"), [b'a', b'b', 0, 0]);
    }

    #[test]
    fn room_id_truncates_long_codes() {
        assert_eq!(room_id("abcdef"), [b'a', b'b', b'c', b'd']);
    }

    #[test]
    fn relay_addr_scheme_is_optional() {
        assert_eq!(parse_relay_addr("tcp://127.0.0.1:9000"), "127.0.0.1:9000");
        assert_eq!(parse_relay_addr("relay.example.com:9000"), "relay.example.com:9000");
        assert_eq!(parse_relay_addr("  tcp://h:1  "), "h:1");
    }

    #[test]
    fn file_header_wire_shape() {
        let header = MetaHeader {
            kind: PayloadKind::File,
            name: "input.bin".to_string(),
            size: 5,
            mode: 0o640,
        };
        let json = serde_json::to_string(&header).unwrap();
        assert_eq!(json, r#"{"t":1,"n":"input.bin","s":5,"m":416}"#);
    }

    #[test]
    fn text_header_omits_name_and_mode() {
        let header = MetaHeader {
            kind: PayloadKind::Text,
            name: String::new(),
            size: 12,
            mode: 0,
        };
        let json = serde_json::to_string(&header).unwrap();
        assert_eq!(json, r#"{"t":2,"s":12}"#);
    }

    #[test]
    fn header_decodes_without_optional_fields() {
        let header: MetaHeader = serde_json::from_str(r#"{"t":2,"s":42}"#).unwrap();
        assert_eq!(header.kind, PayloadKind::Text);
        assert_eq!(header.size, 42);
        assert!(header.name.is_empty());
        assert_eq!(header.mode, 0);
    }

    #[test]
    fn unknown_payload_type_is_rejected() {
        let res: std::result::Result<MetaHeader, _> = serde_json::from_str(r#"{"t":9,"s":1}"#);
        assert!(res.is_err());
    }

    #[test]
    fn empty_name_gets_default() {
        assert_eq!(sanitize_name("").unwrap(), FALLBACK_NAME);
    }

    #[test]
    fn plain_names_pass() {
        assert_eq!(sanitize_name("report.pdf").unwrap(), "report.pdf");
        assert_eq!(sanitize_name("..hidden").unwrap(), "..hidden");
    }

    #[test]
    fn traversal_names_are_refused() {
        for name in ["../evil", "a/b", "a\\b", "..", "/etc/passwd"] {
            match sanitize_name(name) {
                Err(Error::UnsafeName(n)) => assert_eq!(n, name),
                other => panic!("expected UnsafeName for {name:?}, got {other:?}"),
            }
        }
    }
}
