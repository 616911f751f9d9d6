use clap::Parser;
use finz_cli::FinzCli;
use tracing_subscriber::EnvFilter;

fn main() {
    init_logging();
    let code = FinzCli::parse().run();
    std::process::exit(code);
}

/// Logs go to stderr so `--json` output on stdout stays machine-readable.
fn init_logging() {
    let default_level = "info";
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
