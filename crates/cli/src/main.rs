use clap::{Parser, Subcommand};
use client::config::{HOST_VAR, PORT_VAR};
use client::{BridgeConfig, ServerStatus, SessionManager};
use eyre::WrapErr;
use server::{ProbeFactory, Server};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(version, about = "Bridge between a debug-info server and a live debugger")]
struct Args {
    /// Address the server listens on
    #[arg(long, global = true, env = HOST_VAR, default_value = transport::DEFAULT_HOST)]
    host: String,

    #[arg(long, global = true, env = PORT_VAR, default_value_t = transport::DEFAULT_PORT)]
    port: u16,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the server in the foreground until it is asked to stop
    Serve,
    /// Ask a running server to stop
    Stop,
    /// Report whether a server is reachable
    Status,
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    tracing::debug!(?args, "parsed command line arguments");

    let config = BridgeConfig {
        host: args.host,
        port: args.port,
        ..BridgeConfig::default()
    };

    match args.command {
        Command::Serve => {
            let server = Server::bind(config.address(), ProbeFactory)
                .wrap_err_with(|| format!("starting server on {}", config.address()))?;
            server.serve()
        }
        Command::Stop => {
            let manager = SessionManager::new(config);
            match manager.server_status() {
                ServerStatus::Running { addr } => {
                    server::request_shutdown(&addr).wrap_err("stopping server")?;
                    println!("Server at {addr} stopped");
                }
                status @ ServerStatus::NotRunning { .. } => println!("{status}"),
            }
            Ok(())
        }
        Command::Status => {
            let manager = SessionManager::new(config);
            println!("{}", manager.server_status());
            Ok(())
        }
    }
}
