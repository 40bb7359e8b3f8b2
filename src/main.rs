use std::sync::Arc;

use dotenvy::dotenv;
use log::{error, info, warn};

use vendserver::config::AppConfig;
use vendserver::main_module::run_server;
use vendserver::payments::razorpay::RazorpayClient;
use vendserver::realtime::MachineRegistry;
use vendserver::shared::state::AppState;
use vendserver::shared::utils::create_conn;
use vendserver::storage;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(env_logger::WriteStyle::Always)
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let pool = match create_conn(&config.database_url) {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to create database pool: {}", e);
            std::process::exit(1);
        }
    };
    info!("Database connection established");

    let drive = match storage::init_drive(&config.drive).await {
        Ok(client) => Some(client),
        Err(e) => {
            warn!("Failed to initialize object storage: {}", e);
            None
        }
    };

    let razorpay = config.razorpay.clone().map(|rc| {
        info!("Razorpay client configured for {}", rc.base_url);
        RazorpayClient::new(rc.key_id, rc.key_secret, rc.base_url)
    });
    if razorpay.is_none() {
        warn!("Razorpay credentials not configured; QR code generation is disabled");
    }

    let registry = Arc::new(MachineRegistry::new(config.machine_id.clone()));

    info!(
        "Starting HTTP server on {}:{}",
        config.server.host, config.server.port
    );

    let app_state = Arc::new(AppState {
        config,
        conn: pool,
        drive,
        razorpay,
        registry,
    });

    run_server(app_state).await
}
