//! Environment readiness check.

use crate::browser::chromium::find_chromium;
use anyhow::Result;

/// Check Chromium and Tor availability.
pub async fn run() -> Result<()> {
    println!("Argus Doctor");
    println!("============");
    println!();

    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    println!("OS:   {os}");
    println!("Arch: {arch}");
    println!();

    let chromium = find_chromium();
    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Install it or set ARGUS_CHROMIUM_PATH."
        ),
    }

    match which::which("tor") {
        Ok(path) => println!("[OK] Tor found: {} (needed for tor sources only)", path.display()),
        Err(_) => println!("[??] Tor not found; sources with `tor: true` will fail"),
    }

    println!();
    if chromium.is_some() {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }
    Ok(())
}
