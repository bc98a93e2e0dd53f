//! # Static Server - Entry Point
//! src/main.rs
//!
//! config → sink → bind → señales → accept loop.
//!
//! Código de salida 0 al terminar con SIGINT/SIGTERM, distinto de 0 si el
//! arranque falla (config inválida, root inexistente, puerto ocupado).

use anyhow::Context;
use clap::Parser;

use static_server::config::{Args, Config};
use static_server::logging::{LogSink, SinkOptions};
use static_server::server::Server;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(&args)
        .and_then(Config::resolve)
        .context("invalid configuration")?;

    println!("=================================");
    println!("  Static File Server");
    println!("=================================\n");

    let sink = LogSink::new(SinkOptions {
        log_file: Some(config.log_file.clone()),
        capacity: config.log_buffer_size,
        console: config.log_to_console,
        ..SinkOptions::default()
    });

    let address = config.address();
    let server = match Server::bind(config, sink.clone()) {
        Ok(server) => server,
        Err(e) => {
            sink.error(format!("Fatal: {}", e));
            sink.close();
            return Err(e).with_context(|| format!("cannot start server on {}", address));
        }
    };

    server
        .install_signal_handlers()
        .context("cannot install signal handlers")?;

    let result = server.run();
    sink.close();
    result.context("server error")?;

    Ok(())
}
