use std::error::Error;
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use rand::Rng;

use crate::transfer;

/// Function handler to kickoff sender logic:
///     - Resolve the pairing code (generate one if not supplied)
///     - Connect to the relay and wait for the receiver
///     - Upgrade to an encrypted session and stream the file or text
pub async fn run(
    relay_addr: &str,
    code: Option<String>,
    path: Option<String>,
    text: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let code = match code {
        Some(c) => c,
        None => {
            let c = generate_code();
            println!("Pairing code (share with receiver): \x1b[4m\x1b[1m{}\x1b[0m", c);
            c
        }
    };

    match (path, text) {
        (Some(path), None) => {
            let path = Path::new(&path);
            if !path.exists() {
                return Err(format!("Path does not exist: {}", path.display()).into());
            }
            let size = std::fs::metadata(path)?.len();
            debug!("sending {} ({} bytes) via {}", path.display(), size, relay_addr);

            let bar = ProgressBar::new(size);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}")
                    .unwrap(),
            );
            let progress_bar = bar.clone();
            transfer::send_file(relay_addr, &code, path, move |written, _total| {
                progress_bar.set_position(written);
            })
            .await?;
            bar.finish_with_message("Transfer complete");
        }
        (None, Some(text)) => {
            debug!("sending {} bytes of text via {}", text.len(), relay_addr);
            transfer::send_text(relay_addr, &code, &text).await?;
            println!("Text sent.");
        }
        _ => return Err("provide exactly one of a file path or --text".into()),
    }

    Ok(())
}

/// Random 4-character lowercase alphanumeric pairing code.
fn generate_code() -> String {
    const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..4).map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char).collect()
}
