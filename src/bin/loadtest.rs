//! # Cliente de Carga
//! src/bin/loadtest.rs
//!
//! Manda muchos requests concurrentes al servidor y resume status y
//! latencias.
//!
//! ```bash
//! loadtest --port 8000 --requests 200 --concurrency 20 --path / --path /style.css
//! ```

use anyhow::{bail, Context};
use clap::Parser;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use static_server::metrics::MetricsCollector;

#[derive(Debug, Parser)]
#[command(name = "loadtest")]
#[command(about = "Cliente de carga para static_server")]
struct Cli {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(short, long, default_value_t = 8000)]
    port: u16,

    /// Total de requests
    #[arg(short = 'n', long, default_value_t = 100)]
    requests: usize,

    /// Requests en vuelo al mismo tiempo
    #[arg(short, long, default_value_t = 10)]
    concurrency: usize,

    /// Paths a pedir (se reparten en round-robin)
    #[arg(long = "path", default_value = "/")]
    paths: Vec<String>,

    #[arg(short, long, default_value = "GET")]
    method: String,

    /// Timeout de socket en segundos
    #[arg(long, default_value_t = 10)]
    timeout: u64,
}

/// Status y bytes de body de una respuesta
fn send_request(cli: &Cli, path: &str) -> anyhow::Result<(u16, u64)> {
    let mut stream = TcpStream::connect((cli.host.as_str(), cli.port))
        .with_context(|| format!("connect {}:{}", cli.host, cli.port))?;
    let timeout = Some(Duration::from_secs(cli.timeout));
    stream.set_read_timeout(timeout)?;
    stream.set_write_timeout(timeout)?;

    let request = format!(
        "{} {} HTTP/1.1\r\nHost: {}:{}\r\nConnection: close\r\n\r\n",
        cli.method, path, cli.host, cli.port
    );
    stream.write_all(request.as_bytes())?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response)?;

    let status_line = response
        .split(|b| *b == b'\n')
        .next()
        .map(|line| String::from_utf8_lossy(line).to_string())
        .unwrap_or_default();
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok());

    let Some(status) = status else {
        bail!("malformed status line: {:?}", status_line.trim_end());
    };

    let body_bytes = response
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| (response.len() - pos - 4) as u64)
        .unwrap_or(0);

    Ok((status, body_bytes))
}

fn main() -> anyhow::Result<()> {
    let cli = Arc::new(Cli::parse());
    if cli.concurrency == 0 || cli.requests == 0 {
        bail!("--requests and --concurrency must be >= 1");
    }

    println!(
        "Sending {} {} requests to {}:{} ({} concurrent)",
        cli.requests, cli.method, cli.host, cli.port, cli.concurrency
    );

    let metrics = MetricsCollector::new();
    let next = Arc::new(AtomicUsize::new(0));
    let errors = Arc::new(AtomicUsize::new(0));
    let started = Instant::now();

    let workers: Vec<_> = (0..cli.concurrency.min(cli.requests))
        .map(|id| {
            let cli = Arc::clone(&cli);
            let metrics = metrics.clone();
            let next = Arc::clone(&next);
            let errors = Arc::clone(&errors);

            thread::Builder::new()
                .name(format!("client-{}", id))
                .spawn(move || loop {
                    let i = next.fetch_add(1, Ordering::SeqCst);
                    if i >= cli.requests {
                        break;
                    }
                    let path = &cli.paths[i % cli.paths.len()];

                    let sent_at = Instant::now();
                    match send_request(&cli, path) {
                        Ok((status, bytes)) => {
                            metrics.record_request(status, sent_at.elapsed(), bytes)
                        }
                        Err(e) => {
                            metrics.record_failure(sent_at.elapsed());
                            if errors.fetch_add(1, Ordering::SeqCst) < 5 {
                                eprintln!("request {} ({}) failed: {:#}", i, path, e);
                            }
                        }
                    }
                })
                .context("cannot spawn client thread")
        })
        .collect::<anyhow::Result<_>>()?;

    for worker in workers {
        if worker.join().is_err() {
            eprintln!("client thread panicked");
        }
    }

    let elapsed = started.elapsed();
    let snapshot = metrics.snapshot();
    let ok: u64 = snapshot
        .status_codes
        .iter()
        .filter(|(code, _)| (200..300).contains(*code))
        .map(|(_, count)| count)
        .sum();

    println!("\n=== Results ===");
    println!("Elapsed:     {:.2}s", elapsed.as_secs_f64());
    println!(
        "Throughput:  {:.1} req/s",
        cli.requests as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    println!("Responses:   {} ({} 2xx)", snapshot.total_requests, ok);
    println!("Failures:    {}", snapshot.failures);
    println!("Body bytes:  {}", snapshot.bytes);

    println!("\nStatus codes:");
    for (code, count) in &snapshot.status_codes {
        println!("  {}: {}", code, count);
    }

    let ms = |us: u64| us as f64 / 1000.0;
    let latency = &snapshot.latency_us;
    println!("\nLatency (ms):");
    println!("  min {:.2}  avg {:.2}  max {:.2}", ms(latency.min), ms(latency.avg), ms(latency.max));
    println!("  p50 {:.2}  p95 {:.2}  p99 {:.2}", ms(latency.p50), ms(latency.p95), ms(latency.p99));

    if snapshot.failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}
