//! Switch a USB device to TCP/IP mode and connect to it over Wi-Fi

use std::net::Ipv4Addr;
use std::time::Duration;

use tracing::{debug, info};

use crate::adb::{AdbClient, AdbError, DeviceBridge};
use crate::device::Device;

/// Time adbd needs to restart in TCP mode before it accepts connections
const TCPIP_RESTART_DELAY: Duration = Duration::from_millis(1500);

/// Ready devices attached over USB
pub fn usb_devices(devices: &[Device]) -> Vec<&Device> {
    devices
        .iter()
        .filter(|d| d.is_ready() && !d.is_network())
        .collect()
}

/// Pick the device's Wi-Fi address from `ip addr` output.
///
/// Private ranges are preferred in the order 192.168/16, 10/8, 172.16/12.
pub fn parse_device_ip(ip_addr_output: &str) -> Option<Ipv4Addr> {
    let addresses: Vec<Ipv4Addr> = ip_addr_output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("inet "))
        .filter_map(|rest| rest.split(['/', ' ']).next())
        .filter_map(|addr| addr.parse().ok())
        .collect();

    let ranks: [fn(&Ipv4Addr) -> bool; 3] = [
        |ip| ip.octets()[0] == 192 && ip.octets()[1] == 168,
        |ip| ip.octets()[0] == 10,
        |ip| ip.octets()[0] == 172 && (16..=31).contains(&ip.octets()[1]),
    ];

    ranks
        .iter()
        .find_map(|rank| addresses.iter().copied().find(|ip| rank(ip)))
}

/// Enable TCP/IP on `serial` and connect to it. Returns the new endpoint.
pub async fn enable_tcpip(adb: &AdbClient, serial: &str, port: u16) -> Result<String, AdbError> {
    let output = adb.shell(serial, "ip addr").await?;
    let ip = parse_device_ip(&output).ok_or_else(|| {
        AdbError::CommandFailed(format!(
            "could not determine the Wi-Fi address of {}; is Wi-Fi enabled?",
            serial
        ))
    })?;
    debug!("{} has address {}", serial, ip);

    adb.tcpip(serial, port).await?;
    tokio::time::sleep(TCPIP_RESTART_DELAY).await;

    let endpoint = format!("{}:{}", ip, port);
    adb.connect(&endpoint).await?;
    info!("{} is now reachable at {}", serial, endpoint);

    Ok(endpoint)
}
