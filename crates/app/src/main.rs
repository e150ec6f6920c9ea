use std::{net::SocketAddr, process::ExitCode};

use clap::Parser;
use requerimiento_util::{load_env_file, AppConfig};
use tracing::{error, info};

use requerimiento_app::cli::{run_submit, Cli, Command};
use requerimiento_app::{proxy, router, telemetry};

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let env_file = load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    if let Some(path) = env_file {
        info!(stage = "config", path = %path.display(), "loaded environment file");
    }

    match cli.command {
        Command::Proxy => {
            serve_proxy(&config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Submit(args) => match run_submit(args, &config.api_base_url).await {
            Ok(receipt) => {
                info!(stage = "app", rid = %receipt.rid, "requerimiento registered");
                println!("{}", receipt.rid);
                Ok(ExitCode::SUCCESS)
            }
            Err(err) => {
                error!(stage = "app", error = %err, "submission failed");
                eprintln!("{err}");
                Ok(ExitCode::FAILURE)
            }
        },
    }
}

async fn serve_proxy(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let metrics = telemetry::init_metrics()?;
    let forwarder = proxy::ProxyForwarder::from_config(&config.proxy)?;
    if config.proxy.insecure_tls {
        info!(stage = "proxy", "upstream TLS certificate validation disabled");
    }

    let addr: SocketAddr = config.proxy.bind_addr;
    info!(
        stage = "app",
        %addr,
        prefix = %forwarder.prefix(),
        target = %forwarder.target(),
        env = %config.environment.as_str(),
        "starting development proxy"
    );

    let state = router::AppState::new(metrics, forwarder);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}
