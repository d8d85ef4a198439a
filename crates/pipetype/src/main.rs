//! pipetype CLI
//!
//! Exit codes: 0 on success, 2 for usage and configuration errors, 3 when
//! a schema or program fails to compile.

// The binary reports to the terminal directly
#![allow(clippy::print_stderr)]

use pipetype::cli::{self, EXIT_OK, exit_code_for};
use pipetype::tracing::{TracingConfig, init_tracing};
use std::io::Write;

fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let cli = cli::parse();

    let tracing_config = TracingConfig {
        format: cli.log_format,
        level: cli.log_level.into(),
        ..TracingConfig::default()
    };
    if let Err(error) = init_tracing(tracing_config) {
        eprintln!("{error:?}");
        std::process::exit(cli::EXIT_CLI);
    }

    let result = {
        let mut stdout = std::io::stdout().lock();
        let result = cli::run(&cli, &mut stdout);
        let _ = stdout.flush();
        result
    };
    match result {
        Ok(()) => std::process::exit(EXIT_OK),
        Err(error) => {
            let code = exit_code_for(&error);
            tracing::debug!(code, "Command failed");
            eprintln!("{:?}", miette::Report::new(error));
            std::process::exit(code);
        }
    }
}
