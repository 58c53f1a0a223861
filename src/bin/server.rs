use clap::Parser;
use std::net::IpAddr;
use tracing::{error, info};
use varsvr::{Config, Server};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = varsvr::config::DEFAULT_PORT)]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "::")]
    bind: IpAddr,

    /// Listen backlog
    #[arg(long, default_value_t = varsvr::config::DEFAULT_BACKLOG)]
    backlog: u32,

    /// Keep connections open after each serviced read
    #[arg(long)]
    persistent: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Create configuration
    let config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)?
    } else {
        Config {
            bind_addr: args.bind,
            port: args.port,
            backlog: args.backlog,
            close_after_service: !args.persistent,
            log_level: args.log_level.clone(),
            ..Default::default()
        }
    };

    // Initialize tracing
    let log_level = if args.verbose {
        "debug"
    } else {
        config.log_level.as_str()
    };
    tracing_subscriber::fmt()
        .with_env_filter(format!("varsvr={}", log_level))
        .init();

    info!(
        "Starting varsvr v{} on {}",
        env!("CARGO_PKG_VERSION"),
        config.listen_addr()
    );

    let mut server = Server::new(config)?;

    // SIGINT, SIGTERM and SIGHUP all stop the loop
    let shutdown = server.shutdown_handle();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal, shutting down gracefully...");
        shutdown.shutdown();
    })?;

    let result = server.run();
    server.teardown();

    if let Err(e) = result {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
