use log::*;
use visit_dispatch_server::{config::ServerConfig, server::run_server};

#[actix_web::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();
    info!("🚀️ Starting visit dispatch server");
    let config = ServerConfig::from_env_or_default();
    match run_server(config).await {
        Ok(()) => info!("🚀️ Visit dispatch server shut down gracefully"),
        Err(e) => {
            error!("🚀️ Server terminated with an error: {e}");
            std::process::exit(1);
        },
    }
}
