//! Wireless debugging pairing (Android 11+)
//!
//! The device shows a pairing endpoint with a six-digit code, and a separate
//! connect port on the wireless debugging screen.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use crate::adb::{AdbClient, AdbError, DeviceBridge};

static ENDPOINT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,3}\.){3}\d{1,3}:\d+$").expect("valid regex"));
static CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{6}$").expect("valid regex"));

/// Check an `ip:port` pairing endpoint, returning the IP part
pub fn validate_endpoint(endpoint: &str) -> Result<&str, AdbError> {
    if !ENDPOINT_RE.is_match(endpoint) {
        return Err(AdbError::InvalidInput(format!(
            "'{}' is not in IP:PORT format (e.g. 192.168.1.100:37215)",
            endpoint
        )));
    }

    endpoint
        .rsplit_once(':')
        .map(|(ip, _)| ip)
        .ok_or_else(|| AdbError::InvalidInput(endpoint.to_string()))
}

pub fn validate_pairing_code(code: &str) -> Result<(), AdbError> {
    if CODE_RE.is_match(code) {
        Ok(())
    } else {
        Err(AdbError::InvalidInput("pairing code must be 6 digits".into()))
    }
}

/// Pair with `pair_endpoint`, then connect to the same host on `connect_port`.
/// Returns the connected endpoint.
pub async fn pair_and_connect(
    adb: &AdbClient,
    pair_endpoint: &str,
    code: &str,
    connect_port: u16,
) -> Result<String, AdbError> {
    let ip = validate_endpoint(pair_endpoint)?;
    validate_pairing_code(code)?;

    let message = adb.pair(pair_endpoint, code).await?;
    info!("Paired with {}: {}", pair_endpoint, message);

    let endpoint = format!("{}:{}", ip, connect_port);
    adb.connect(&endpoint).await?;
    info!("Connected to {}", endpoint);

    Ok(endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_endpoint() {
        assert_eq!(validate_endpoint("192.168.1.100:37215").unwrap(), "192.168.1.100");
        assert!(validate_endpoint("192.168.1.100").is_err());
        assert!(validate_endpoint("phone.local:5555").is_err());
        assert!(validate_endpoint(" 192.168.1.100:37215").is_err());
    }

    #[test]
    fn test_validate_pairing_code() {
        assert!(validate_pairing_code("123456").is_ok());
        assert!(validate_pairing_code("12345").is_err());
        assert!(validate_pairing_code("12a456").is_err());
    }
}
