//! Storelink CLI - OAuth token lifecycle and webhook trust
//!
//! Run with: cargo run --bin storelink -- <command>
//! Or after build: ./target/release/storelink <command>

#[tokio::main]
async fn main() {
    // Load .env before the config so `$env:` references resolve
    let _ = dotenvy::dotenv();

    // Logging is initialized by the CLI once the config is loaded
    if let Err(e) = storelink::cli::run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
