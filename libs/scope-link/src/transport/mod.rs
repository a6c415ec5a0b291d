//! Transport Layer Module
//!
//! Separates the physical serial link from the acquisition logic.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │   Acquisition loop  /  Command writer        │
//! └──────────────────────────────────────────────┘
//!                        │
//!                        ▼
//! ┌──────────────────────────────────────────────┐
//! │          Transport trait                     │
//! │  open(), close(), bytes_available(),         │
//! │  read(), write_all(), clear_input()          │
//! └──────────────────────────────────────────────┘
//!              │                    │
//!              ▼                    ▼
//!     ┌────────────────┐   ┌────────────────┐
//!     │     Serial     │   │      Mock      │
//!     │ (tokio-serial) │   │    (tests)     │
//!     └────────────────┘   └────────────────┘
//! ```

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod serial;
pub mod traits;

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{MockHandle, MockTransport, MockTransportBuilder};
pub use serial::{SerialTransport, SerialTransportBuilder};
pub use traits::{ConnectionState, Transport, TransportBuilder, TransportError, TransportStats};

/// Serial ports currently known to the OS, as `(port, description)`
pub fn list_ports() -> Result<Vec<(String, String)>, TransportError> {
    let ports = tokio_serial::available_ports()
        .map_err(|e| TransportError::IoError(format!("Failed to enumerate ports: {e}")))?;

    let mut listed: Vec<(String, String)> = ports
        .into_iter()
        .map(|info| {
            let description = match info.port_type {
                tokio_serial::SerialPortType::UsbPort(usb) => usb
                    .product
                    .unwrap_or_else(|| format!("USB {:04x}:{:04x}", usb.vid, usb.pid)),
                tokio_serial::SerialPortType::BluetoothPort => "Bluetooth".to_string(),
                tokio_serial::SerialPortType::PciPort => "PCI".to_string(),
                tokio_serial::SerialPortType::Unknown => "n/a".to_string(),
            };
            (info.port_name, description)
        })
        .collect();
    listed.sort();
    Ok(listed)
}
