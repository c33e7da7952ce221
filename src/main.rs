use anyhow::Result;
use clap::{Parser, Subcommand};
use otel_harness::{
    config::Config,
    logging::StructuredLogger,
    server,
    telemetry::{self, ServiceInfo},
};

#[derive(Parser)]
#[command(name = "otel-harness")]
#[command(about = "Trace-correlated logging and job queue harness", long_about = None)]
struct Cli {
    /// Listen port, overriding HTTP_PORT
    #[arg(short, long)]
    port: Option<u16>,

    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand, Clone, Copy, Debug)]
enum Role {
    /// Front service calling the secondary service
    App,
    /// Downstream service producing and consuming jobs
    Secondary,
    /// Standalone queue worker
    Worker,
}

impl Role {
    fn name(self) -> &'static str {
        match self {
            Role::App => "app",
            Role::Secondary => "secondary",
            Role::Worker => "worker",
        }
    }

    fn default_port(self) -> u16 {
        match self {
            Role::App => 3000,
            Role::Secondary | Role::Worker => 3001,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    match cli.port {
        Some(port) => config.http_port = port,
        None if std::env::var("HTTP_PORT").is_err() => config.http_port = cli.role.default_port(),
        None => {}
    }

    let service = ServiceInfo::for_role(cli.role.name());
    let handles = telemetry::setup(&service, &config.telemetry)?;
    let logger = StructuredLogger::build(service.name.clone(), &handles);

    let result = match cli.role {
        Role::App => server::run_app(config, handles.clone()).await,
        Role::Secondary => server::run_secondary(config, handles.clone()).await,
        Role::Worker => server::run_worker(config, handles.clone()).await,
    };

    if let Err(e) = result {
        logger.error("Error occurred during server startup", &*e, ());
        handles.shutdown();
        std::process::exit(1);
    }

    handles.shutdown();
    Ok(())
}
