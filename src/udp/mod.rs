// region:    --- Modules

use async_std::net::UdpSocket;
use tracing::info;

use frame_relay::Result;

// endregion: --- Modules

pub async fn init_udp_service(local_address: &str, port: u16) -> Result<UdpSocket> {
    // -- Initialise UDP port
    let udp_addr = format!("{}:{}", local_address, port);
    let udp_service = UdpSocket::bind(&udp_addr).await?;
    info!("UDP Socket initialised at {}", udp_addr);
    Ok(udp_service)
}

pub async fn connect_to_foreign_addr(
    udp_service: &UdpSocket,
    foreign_address: &str,
    foreign_port: u16,
) -> Result<()> {
    // -- Connect to receiving address
    let foreign_addr = format!("{}:{}", foreign_address, foreign_port);
    udp_service.connect(&foreign_addr).await?;
    info!("UDP Socket connected to {}", foreign_addr);
    Ok(())
}
