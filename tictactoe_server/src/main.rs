// CLI entry point for the tic-tac-toe lobby server.
//
// Starts a standalone server that clients connect to. See `server.rs` for
// the networking architecture and `lobby.rs` for the shared state.
//
// Usage:
//   tictactoe-server [OPTIONS]
//     --config <PATH>               JSON config file (fields optional)
//     --bind <ADDR>                 Interface to listen on (default: 127.0.0.1)
//     --port <PORT>                 Listen port (default: 7878)
//     --listing-timeout-ms <MS>     Discard unjoined listings after this long
//
// Log output goes through `env_logger`; set `RUST_LOG` to change the filter
// (default `info`).

use std::path::Path;

use log::{error, info};

use tictactoe_server::config::ServerConfig;
use tictactoe_server::server::start_server;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = parse_args();

    let (handle, addr) = match start_server(config) {
        Ok(result) => result,
        Err(e) => {
            error!("failed to start server: {e}");
            std::process::exit(1);
        }
    };

    info!("accepting players on {addr}; press Ctrl+C to stop");
    // The process exits on SIGINT/SIGTERM; handler threads go with it.
    handle.wait();
}

/// Parse command-line arguments into a `ServerConfig`. A `--config` file is
/// applied first wherever it appears; the other flags override it.
fn parse_args() -> ServerConfig {
    let args: Vec<String> = std::env::args().collect();

    let mut config = match args.iter().position(|a| a == "--config") {
        Some(i) => {
            let path = args.get(i + 1).unwrap_or_else(|| {
                eprintln!("--config requires a path");
                std::process::exit(1);
            });
            ServerConfig::load(Path::new(path)).unwrap_or_else(|e| {
                eprintln!("{path}: {e}");
                std::process::exit(1);
            })
        }
        None => ServerConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
            }
            "--bind" => {
                i += 1;
                config.bind_address = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--bind requires an address");
                    std::process::exit(1);
                });
            }
            "--port" => {
                i += 1;
                config.port = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--port requires a valid port number");
                    std::process::exit(1);
                });
            }
            "--listing-timeout-ms" => {
                i += 1;
                config.listing_wait_timeout_ms =
                    Some(args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                        eprintln!("--listing-timeout-ms requires a number of milliseconds");
                        std::process::exit(1);
                    }));
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    config
}

fn print_usage() {
    println!("Usage: tictactoe-server [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --config <PATH>             JSON config file");
    println!("  --bind <ADDR>               Interface to listen on (default: 127.0.0.1)");
    println!("  --port <PORT>               Listen port (default: 7878)");
    println!("  --listing-timeout-ms <MS>   Discard unjoined listings after MS milliseconds");
    println!("  --help, -h                  Show this help");
}
