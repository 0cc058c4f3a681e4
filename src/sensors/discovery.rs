//! Serial device discovery

use serialport::{SerialPortInfo, SerialPortType, UsbPortInfo};
use tracing::debug;

use crate::config::LinkConfig;
use crate::error::Result;

/// Enumerate serial devices and pick the sensor board
pub fn discover(config: &LinkConfig) -> Result<Option<String>> {
    if let Some(port) = &config.port {
        return Ok(Some(port.clone()));
    }

    let ports = serialport::available_ports()?;
    debug!("Found {} serial device(s)", ports.len());
    Ok(select_port(&ports, config))
}

/// First port matching the vendor/product allow-list or a manufacturer hint
pub fn select_port(ports: &[SerialPortInfo], config: &LinkConfig) -> Option<String> {
    ports
        .iter()
        .find(|p| match &p.port_type {
            SerialPortType::UsbPort(usb) => is_allowed(usb, config),
            _ => false,
        })
        .map(|p| p.port_name.clone())
}

fn is_allowed(usb: &UsbPortInfo, config: &LinkConfig) -> bool {
    if config.allowed_vids.contains(&usb.vid) {
        return true;
    }
    if config.allowed_products.contains(&(usb.vid, usb.pid)) {
        return true;
    }
    usb.manufacturer
        .as_deref()
        .map(|m| {
            let m = m.to_ascii_lowercase();
            config.manufacturer_hints.iter().any(|hint| m.contains(hint.as_str()))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usb(name: &str, vid: u16, pid: u16, manufacturer: Option<&str>) -> SerialPortInfo {
        SerialPortInfo {
            port_name: name.to_string(),
            port_type: SerialPortType::UsbPort(UsbPortInfo {
                vid,
                pid,
                serial_number: None,
                manufacturer: manufacturer.map(str::to_string),
                product: None,
            }),
        }
    }

    #[test]
    fn test_selects_first_allowed_vid() {
        let ports = vec![
            SerialPortInfo {
                port_name: "/dev/ttyS0".to_string(),
                port_type: SerialPortType::Unknown,
            },
            usb("/dev/ttyUSB0", 0x1234, 0x0001, Some("Generic")),
            usb("/dev/ttyACM0", 0x2341, 0x0043, None),
            usb("/dev/ttyACM1", 0x2341, 0x0043, None),
        ];

        assert_eq!(select_port(&ports, &LinkConfig::default()).as_deref(), Some("/dev/ttyACM0"));
    }

    #[test]
    fn test_manufacturer_hint_is_case_insensitive() {
        let ports = vec![usb("COM4", 0x9999, 0x0001, Some("Arduino LLC (www.arduino.cc)"))];
        assert_eq!(select_port(&ports, &LinkConfig::default()).as_deref(), Some("COM4"));
    }

    #[test]
    fn test_no_match() {
        let ports = vec![usb("/dev/ttyUSB0", 0x1234, 0x5678, Some("Acme"))];
        assert_eq!(select_port(&ports, &LinkConfig::default()), None);
    }

    #[test]
    fn test_explicit_port_skips_enumeration() {
        let config = LinkConfig {
            port: Some("/dev/ttyFAKE".to_string()),
            ..LinkConfig::default()
        };
        assert_eq!(discover(&config).unwrap().as_deref(), Some("/dev/ttyFAKE"));
    }
}
