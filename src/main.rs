use captioner::config::ServerConfig;
use captioner::server;
use captioner::state::{Captioner, CaptionerState};
use clap::Parser;
use log::error;
use log::info;
use log::LevelFilter;

#[cfg(debug_assertions)]
const LOG_LEVEL: LevelFilter = LevelFilter::Debug;
#[cfg(not(debug_assertions))]
const LOG_LEVEL: LevelFilter = LevelFilter::Info;


#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG, when set, overrides the default level.
    env_logger::Builder::new()
        .filter_level(LOG_LEVEL)
        .parse_default_env()
        .init();

    let config = ServerConfig::parse();
    let addr = config.socket_addr()?;

    // The models are loaded once and live for the whole process.
    // Without them there is nothing to serve, so failing here ends the process.
    let now = std::time::Instant::now();
    let captioner = match Captioner::load(&config.model) {
        Ok(captioner) => captioner,
        Err(e) => {
            error!("Error loading models: {}", e);
            return Err(e.into());
        }
    };
    info!("Models loaded in {:?}", now.elapsed());

    let app = server::router(CaptionerState::new(captioner), config.body_limit);
    server::serve(addr, app).await
}
