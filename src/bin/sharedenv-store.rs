//! Store process binary: seeded from its sole argument, serving the
//! supervisor protocol over stdin/stdout until STOP or EOF.

use std::collections::HashMap;
use std::process;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() != 2 {
        eprintln!("error: expected exactly one argument");
        eprintln!();
        eprintln!("Usage: sharedenv-store <seed-json>");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  <seed-json>    Initial variables as a JSON object, e.g. '{{\"COLOR\":\"blue\"}}'");
        process::exit(2);
    }

    // stdout carries the protocol; logs go to stderr only.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let seed: HashMap<String, String> = match serde_json::from_str(&args[1]) {
        Ok(seed) => seed,
        Err(e) => {
            eprintln!("error: malformed seed argument: {e}");
            process::exit(2);
        }
    };

    if let Err(e) = sharedenv::store::run_store(seed).await {
        eprintln!("error: store loop failed: {e}");
        process::exit(1);
    }
}
