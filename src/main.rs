use color_eyre::eyre::{Result, WrapErr};
use echo_server::{EchoServer, EchoServerTrait, ServerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("echo_server=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut config = ServerConfig::from_env().wrap_err("Failed to read configuration")?;

    match args.get(1).map(String::as_str) {
        None => {}
        Some("-h" | "--help") => {
            let program = args.first().map(String::as_str).unwrap_or("echo-server");
            eprintln!("Usage: {program} [port]");
            eprintln!("  port: Port to listen on (default: $PORT or 8090)");
            eprintln!();
            eprintln!("Environment:");
            eprintln!("  PORT                  Port to listen on when no argument is given");
            eprintln!("  SEND_SERVER_HOSTNAME  Set to 'false' to hide the host name");
            eprintln!("  LOG_HTTP_HEADERS      Log request headers when non-empty");
            eprintln!("  LOG_HTTP_BODY         Hex-dump request bodies when non-empty");
            eprintln!("  RUST_LOG              Log filter (default: echo_server=info)");
            std::process::exit(1);
        }
        Some(port) => {
            config = config.with_port_str(port).wrap_err("Invalid port argument")?;
        }
    }

    info!(
        address = %config.bind_addr,
        send_server_hostname = config.send_server_hostname,
        log_http_headers = config.log_http_headers,
        log_http_body = config.log_http_body,
        "Starting echo server"
    );

    let server = EchoServer::new(config);
    server.run().await.wrap_err("Failed to run echo server")?;

    Ok(())
}
