use allomap::prelude::*;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// t-SNE projection and reference-data services
#[derive(Parser, Debug)]
#[command(name = "allomap")]
#[command(about = "t-SNE projection services for organ-allocation records", long_about = None)]
struct Args {
    #[command(subcommand)]
    service: Service,

    /// Path to a TOML config file (defaults to ./allomap.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the per-city CSV files
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Address to bind
    #[arg(long, global = true)]
    host: Option<String>,

    /// Log level
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Service {
    /// Health check and banner, with the projection endpoint mounted
    Router {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Per-city reference data as JSON (port also read from PORT)
    Reference {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Standalone t-SNE projection endpoint
    Projection {
        #[arg(long)]
        port: Option<u16>,
    },
}

impl Service {
    fn name(&self) -> &'static str {
        match self {
            Service::Router { .. } => "router",
            Service::Reference { .. } => "reference",
            Service::Projection { .. } => "projection",
        }
    }
}

fn build_projection_service(config: &AppConfig) -> Arc<ProjectionService> {
    let registry = CityRegistry::new(config.cities.clone());
    let store = Arc::new(DatasetStore::new(&config.data_dir, registry.clone()));
    Arc::new(ProjectionService::new(
        registry,
        config.projection.clone(),
        store,
        Arc::new(TsneProjector::new()),
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }

    info!("Starting allomap v{}", env!("CARGO_PKG_VERSION"));
    info!("Data directory: {:?}", config.data_dir);
    info!("Cities: {:?}", config.cities.iter().map(|c| c.name.as_str()).collect::<Vec<_>>());

    let host = config.server.host.clone();
    let port = match &args.service {
        Service::Router { port } => port.unwrap_or(config.server.router_port),
        Service::Reference { port } => port.unwrap_or(config.server.reference_port),
        Service::Projection { port } => port.unwrap_or(config.server.projection_port),
    };
    let service = args.service;
    let name = service.name();

    let http_handle = std::thread::spawn(move || {
        info!("Starting {} server on {}:{}", name, host, port);
        let sys = actix_web::rt::System::new();
        sys.block_on(async move {
            let result = match service {
                Service::Router { .. } => {
                    RestApi::start_router(build_projection_service(&config), host, port).await
                }
                Service::Reference { .. } => {
                    let registry = CityRegistry::new(config.cities.clone());
                    let store = Arc::new(DatasetStore::new(&config.data_dir, registry));
                    RestApi::start_reference(store, host, port).await
                }
                Service::Projection { .. } => {
                    RestApi::start_projection(build_projection_service(&config), host, port).await
                }
            };
            if let Err(e) = result {
                error!("HTTP server error: {}", e);
            }
        })
    });

    info!("allomap {} started: http://localhost:{}/", name, port);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        _ = tokio::task::spawn_blocking(move || {
            http_handle.join().ok();
        }) => {
            info!("HTTP server stopped");
        }
    }

    info!("Shutting down...");
    Ok(())
}
