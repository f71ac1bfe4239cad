// region:    --- modules

use dotenv::dotenv;
use tracing_subscriber::EnvFilter;

use frame_relay::config::{Config, Mode};
use frame_relay::Result;

mod recv;
mod send;
mod udp;

// endregion: --- modules

#[async_std::main]
async fn main() -> Result<()> {
    // -- Loading dev env variables
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    match config.mode {
        // -- Send operation mode
        Mode::Send => {
            let foreign_address = config.foreign_address.as_deref().ok_or_else(|| {
                frame_relay::Error::Config("FOREIGN_ADDRESS env var not set".into())
            })?;
            let udp_service = udp::init_udp_service(&config.local_address, config.send_port).await?;
            udp::connect_to_foreign_addr(&udp_service, foreign_address, config.recv_port).await?;

            send::main(&udp_service, &config).await?;
        }
        // -- Recv operation mode
        Mode::Recv => {
            let udp_service = udp::init_udp_service(&config.local_address, config.recv_port).await?;
            recv::main(&udp_service, &config).await?;
        }
    }

    Ok(())
}
