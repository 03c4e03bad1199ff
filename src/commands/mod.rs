//! # Commands Module
//!
//! The three command handlers behind the CLI:
//!
//! ## `send`
//! Sends a file or a text snippet to a receiver:
//! - Generates a 4-character pairing code (unless one is supplied)
//! - Connects to the relay and waits for the receiver in the same room
//! - Upgrades the socket (PAKE + AES-256-CTR) and streams the payload
//!
//! ## `receive`
//! Receives whatever the sender offers:
//! - Takes the pairing code from a flag or prompts for it
//! - Connects to the relay, upgrades the socket
//! - Saves the file into the output directory, or prints the text
//!
//! ## `relay`
//! Runs the relay server:
//! - Accepts connections from senders and receivers
//! - Pairs opposite roles sharing a room id
//! - Splices bytes between paired sockets without reading them

pub mod receive;
pub mod relay;
pub mod send;
