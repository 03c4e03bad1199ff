use std::error::Error;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use log::debug;

use crate::transfer::{self, Received};

/// Function handler to kickoff receiver logic:
///     - Resolve the pairing code (prompt if not supplied)
///     - Connect to the relay and wait for the sender
///     - Upgrade to an encrypted session, then save the file or show the text
pub async fn run(
    relay_addr: &str,
    code: Option<String>,
    out_dir: &Path,
) -> Result<(), Box<dyn Error>> {
    let code = match code {
        Some(c) => c,
        None => prompt_code()?,
    };
    debug!("receiving with code {code} via {relay_addr}");

    let bar = ProgressBar::new_spinner();
    bar.enable_steady_tick(Duration::from_millis(100));
    bar.set_message("Waiting for sender");

    // The spinner flips into a byte bar on the first progress event.
    let progress_bar = bar.clone();
    let started = Arc::new(AtomicBool::new(false));
    let received = transfer::receive(relay_addr, &code, out_dir, move |current, total| {
        if !started.swap(true, Ordering::Relaxed) {
            progress_bar.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}")
                    .unwrap(),
            );
            progress_bar.set_length(total);
        }
        progress_bar.set_position(current);
    })
    .await;
    let received = match received {
        Ok(r) => r,
        Err(e) => {
            bar.finish_and_clear();
            return Err(e.into());
        }
    };
    bar.finish_and_clear();

    match received {
        Received::File(path) => println!("File saved: {}", path.display()),
        Received::Text(text) => println!("{text}"),
    }
    Ok(())
}

fn prompt_code() -> Result<String, Box<dyn Error>> {
    loop {
        println!("Enter pairing code from sender:");
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        let trimmed = input.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
        println!("Code must not be empty.");
    }
}
