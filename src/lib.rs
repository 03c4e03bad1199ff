pub mod cipher;
pub mod commands;
pub mod error;
pub mod framing;
pub mod handshake;
pub mod relay;
pub mod session;
pub mod transfer;

use std::time::Duration;

pub use error::Error;

pub const KEY_SIZE: usize = 32;
pub const ROOM_ID_LEN: usize = 4;
pub const BUFFER_SIZE: usize = 32 * 1024;
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;
pub const META_FRAME_MAX: usize = 64 * 1024;

/// Sent encrypted after the handshake to prove both sides derived the same key.
pub const MAGIC_VERIFY: &[u8] = b"WORMHOLE_OK";

pub const ROLE_SENDER: u8 = 0;
pub const ROLE_RECEIVER: u8 = 1;

pub const DEFAULT_RELAY_ADDR: &str = "tcp://127.0.0.1:9000";
pub const DEFAULT_RELAY_PORT: u16 = 9000;
pub const DEFAULT_PAIRING_TIMEOUT: Duration = Duration::from_secs(60);

pub const ENV_RELAY_PORT: &str = "CLI_RELAY_PORT";
pub const ENV_RELAY_TIMEOUT: &str = "CLI_RELAY_TIMEOUT";
