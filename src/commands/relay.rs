use std::error::Error;
use std::time::Duration;

use log::info;
use tokio::net::TcpListener;

use crate::relay::RelayServer;
use crate::{DEFAULT_PAIRING_TIMEOUT, DEFAULT_RELAY_PORT, ENV_RELAY_PORT, ENV_RELAY_TIMEOUT};

/// Run the relay server.
///
/// Flags win over environment (`CLI_RELAY_PORT`, `CLI_RELAY_TIMEOUT`),
/// environment wins over the defaults (port 9000, 60 s pairing window).
pub async fn run(port: Option<u16>, timeout: Option<String>) -> Result<(), Box<dyn Error>> {
    let port = port.unwrap_or_else(|| env_port(ENV_RELAY_PORT, DEFAULT_RELAY_PORT));
    let timeout = timeout
        .as_deref()
        .and_then(parse_duration)
        .unwrap_or_else(|| env_timeout(ENV_RELAY_TIMEOUT, DEFAULT_PAIRING_TIMEOUT));

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&bind_addr).await?;
    println!("Relay listening on {bind_addr} (pairing timeout: {timeout:?})");
    info!("relay server started on {bind_addr}");

    RelayServer::new(timeout).serve(listener).await;
    Ok(())
}

fn env_port(key: &str, default: u16) -> u16 {
    match std::env::var(key) {
        Ok(v) => v.trim().parse().unwrap_or(default),
        Err(_) => default,
    }
}

fn env_timeout(key: &str, default: Duration) -> Duration {
    match std::env::var(key) {
        Ok(v) => parse_duration(&v).unwrap_or(default),
        Err(_) => default,
    }
}

/// Duration strings: `100ms`, `30s`, `2m`, or a plain integer of seconds.
fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        return ms.parse().ok().map(Duration::from_millis);
    }
    if let Some(secs) = s.strip_suffix('s') {
        return secs.parse().ok().map(Duration::from_secs);
    }
    if let Some(mins) = s.strip_suffix('m') {
        return mins.parse().ok().map(|m: u64| Duration::from_secs(m * 60));
    }
    s.parse().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_formats() {
        assert_eq!(parse_duration("60"), Some(Duration::from_secs(60)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration(" 5s "), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("soon"), None);
        assert_eq!(parse_duration(""), None);
    }
}
