use clap::{App, Arg};
use simtemp::protocol::{ProtocolHandler, Response};
use simtemp::{DeviceRegistry, InitialConfig};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

const DEFAULT_PORT: &str = "8090";
const DEFAULT_DEVICES: &str = "1";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let matches = App::new("simtempd")
        .version("0.1.0")
        .about("🌡️  Simulated temperature sensor daemon")
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("TCP port to serve the JSON protocol on")
                .takes_value(true)
                .default_value(DEFAULT_PORT),
        )
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("Initial device configuration (JSON)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("devices")
                .short("n")
                .long("devices")
                .value_name("N")
                .help("Number of devices to attach")
                .takes_value(true)
                .default_value(DEFAULT_DEVICES),
        )
        .get_matches();

    let port: u16 = matches.value_of("port").unwrap_or(DEFAULT_PORT).parse()?;
    let device_count: usize = matches
        .value_of("devices")
        .unwrap_or(DEFAULT_DEVICES)
        .parse()?;
    let initial = match matches.value_of("config") {
        Some(path) => InitialConfig::from_file(path)?,
        None => InitialConfig::default(),
    };

    println!("🌡️  Simulated Temperature Sensor Daemon");
    println!("=======================================");

    let registry = Arc::new(DeviceRegistry::new());
    for _ in 0..device_count {
        let id = registry.attach(&initial)?;
        println!("📟 simtemp{} attached", id);
    }

    let listener = TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    info!("🌐 TCP server listening on port {}", port);

    let handler = ProtocolHandler::new(Arc::clone(&registry));
    let tcp_server = tokio::spawn(serve(listener, handler));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested, detaching devices");

    // Detaching joins each timer thread and wakes blocked readers.
    let shutdown_registry = Arc::clone(&registry);
    tokio::task::spawn_blocking(move || shutdown_registry.shutdown_all()).await?;

    tcp_server.abort();
    println!("🛑 Simulated Temperature Sensor Daemon stopped");

    Ok(())
}

async fn serve(listener: TcpListener, handler: ProtocolHandler) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("🔗 New client connected: {}", addr);
                let client_handler = handler.clone();

                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, client_handler).await {
                        warn!("Client {} error: {}", addr, e);
                    }
                    info!("🔌 Client {} disconnected", addr);
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

async fn handle_client(stream: TcpStream, handler: ProtocolHandler) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);

    let mut line = String::new();
    loop {
        line.clear();
        if buf_reader.read_line(&mut line).await? == 0 {
            // Client disconnected
            return Ok(());
        }

        let request = line.trim().to_owned();
        if request.is_empty() {
            continue;
        }
        debug!("📨 Received request: {}", request);

        // Blocking reads park the calling thread until a sample arrives.
        let request_handler = handler.clone();
        let response = tokio::task::spawn_blocking(move || request_handler.handle_line(&request))
            .await
            .unwrap_or_else(|e| Response::Error {
                kind: "internal".to_owned(),
                message: format!("request handler failed: {}", e),
            });

        let mut encoded = serde_json::to_string(&response)?;
        encoded.push('\n');
        writer.write_all(encoded.as_bytes()).await?;
    }
}
