//! xml-path-stream binary.

use tracing_subscriber::EnvFilter;
use xml_path_stream::cli;

/// Log to stderr so stdout carries only payloads; `RUST_LOG` overrides the
/// `warn` default.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_logging();

    if let Err(err) = cli::run() {
        eprintln!("xml-path-stream: {err}");
        std::process::exit(1);
    }
}
