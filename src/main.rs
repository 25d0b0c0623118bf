//! tcpgate demo server
//!
//! A chunk-echo server built on the connection manager. Every chunk read
//! from a client is dispatched straight back to it, which exercises the
//! full accept / read-pipeline / recv-pool / send-pool path.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tcpgate::{
    Config as ManagerConfig, ConnBinder, ConnReader, ConnWriter, Manager, NetType, Request,
    RequestHandler, Response, ResponseHandler,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Server configuration
struct Config {
    /// Host to bind to
    host: String,
    /// Port to listen on
    port: u16,
    /// Max workers per pool
    workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7000,
            workers: 8,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    if i + 1 < args.len() {
                        config.host = args[i + 1].clone();
                        i += 2;
                    } else {
                        eprintln!("Error: --host requires a value");
                        std::process::exit(1);
                    }
                }
                "--port" | "-p" => {
                    if i + 1 < args.len() {
                        config.port = args[i + 1].parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid port number");
                            std::process::exit(1);
                        });
                        i += 2;
                    } else {
                        eprintln!("Error: --port requires a value");
                        std::process::exit(1);
                    }
                }
                "--workers" | "-w" => {
                    if i + 1 < args.len() {
                        config.workers = args[i + 1].parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid worker count");
                            std::process::exit(1);
                        });
                        i += 2;
                    } else {
                        eprintln!("Error: --workers requires a value");
                        std::process::exit(1);
                    }
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("tcpgate version {}", tcpgate::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    /// Returns the bind address as a string
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn print_help() {
    println!(
        r#"
tcpgate - Reusable TCP Connection Manager (echo demo)

USAGE:
    tcpgate [OPTIONS]

OPTIONS:
    -h, --host <HOST>    Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>    Port to listen on (default: 7000)
    -w, --workers <N>    Max workers per pool (default: 8)
    -v, --version        Print version information
        --help           Print this help message

EXAMPLES:
    tcpgate                        # Start on 127.0.0.1:7000
    tcpgate --port 7001            # Start on port 7001
    tcpgate --host 0.0.0.0         # Listen on all interfaces

CONNECTING:
    Anything you send comes straight back:
    $ nc 127.0.0.1 7000
    hello
    hello
"#
    );
}

fn print_banner(config: &Config) {
    println!(
        r#"
tcpgate v{} - Reusable TCP Connection Manager
──────────────────────────────────────────────────────────────
Echo server started on {}
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        tcpgate::VERSION,
        config.bind_address()
    );
}

/// Splits the accepted socket into independent halves.
struct EchoBinder;

#[async_trait]
impl ConnBinder for EchoBinder {
    async fn bind(&self, _trace_id: &str, stream: TcpStream) -> (ConnReader, ConnWriter) {
        let (r, w) = stream.into_split();
        (Box::new(r), Box::new(w))
    }
}

/// The echo "protocol": one frame is whatever one read returns.
struct EchoRequests {
    echo_tx: mpsc::UnboundedSender<Response>,
}

#[async_trait]
impl RequestHandler for EchoRequests {
    async fn read(
        &self,
        _trace_id: &str,
        _addr: SocketAddr,
        reader: &mut ConnReader,
    ) -> io::Result<Option<Bytes>> {
        let mut buf = vec![0u8; 4096];
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(Bytes::from(buf)))
    }

    async fn process(&self, trace_id: &str, request: Request) {
        info!(trace_id = %trace_id, client = %request.addr, bytes = request.length, "echoing");
        let _ = self
            .echo_tx
            .send(Response::new(request.addr, request.data));
    }
}

struct EchoResponses;

#[async_trait]
impl ResponseHandler for EchoResponses {
    async fn write(
        &self,
        _trace_id: &str,
        response: &Response,
        writer: &mut ConnWriter,
    ) -> io::Result<()> {
        writer.write_all(&response.data).await?;
        writer.flush().await
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    // Print the banner
    print_banner(&config);

    // Responses flow out through this channel because process() runs on
    // the recv pool, away from the manager handle.
    let (echo_tx, mut echo_rx) = mpsc::unbounded_channel::<Response>();

    let mut manager_config = ManagerConfig::new(
        NetType::Tcp4,
        config.bind_address(),
        Arc::new(EchoBinder),
        Arc::new(EchoRequests { echo_tx }),
        Arc::new(EchoResponses),
    );
    manager_config.recv_max_workers = config.workers;
    manager_config.send_max_workers = config.workers;

    let manager = Arc::new(Manager::new("main", "echo", manager_config)?);
    manager.start("main").await?;
    info!("Listening on {}", config.bind_address());

    // Forward processed requests back out as responses.
    let dispatcher = Arc::clone(&manager);
    let responder = tokio::spawn(async move {
        while let Some(response) = echo_rx.recv().await {
            if let Err(e) = dispatcher.dispatch("main", response).await {
                warn!("dispatch failed: {e}");
            }
        }
    });

    signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping server...");

    manager.stop("main").await?;
    responder.abort();

    info!(
        recv_executed = manager.stats_recv().executed,
        send_executed = manager.stats_send().executed,
        "Server shutdown complete"
    );
    Ok(())
}
