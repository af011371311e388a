//! Sitrep operator console.
//!
//! A line-oriented front end for the reveal engine: queries go to the
//! analysis backend, the narrative is typed out on stdout and markers are
//! listed as they are revealed.
//!
//! ```bash
//! cargo run -p sitrep -- --backend http://localhost:5000/api
//! echo "status near Kharkiv" | cargo run -p sitrep
//! ```

mod headless;

use std::error::Error;
use tokio::task::LocalSet;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Logs go to stderr so they never interleave with the report on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let config = headless::parse_config_from_args(&args)?;

    // The session spawns its timers with spawn_local.
    LocalSet::new()
        .run_until(headless::run_headless(config))
        .await
}

fn print_help() {
    println!("Sitrep - incremental intelligence report console");
    println!();
    println!("USAGE:");
    println!("  sitrep [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("  -h, --help              Show this help message");
    println!("  --backend <URL>         Backend base URL (default: http://localhost:5000/api)");
    println!("  --gazetteer <PATH>      JSON gazetteer to use instead of the built-in one");
    println!("  --typewriter-ms <MS>    Delay between narrative characters (default: 20)");
    println!("  --marker-ms <MS>        Delay between map markers (default: 1000)");
    println!();
    println!("ENVIRONMENT:");
    println!("  SITREP_BACKEND_URL, SITREP_TIMEOUT_SECS, SITREP_GAZETTEER,");
    println!("  SITREP_TYPEWRITER_MS, SITREP_MARKER_MS, RUST_LOG");
    println!();
    println!("EXAMPLES:");
    println!("  sitrep                                 # Interactive console");
    println!("  sitrep --marker-ms 250 --gazetteer places.json");
}
