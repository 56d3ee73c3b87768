//! Linux IR receiver input via evdev.
//!
//! The kernel `gpio-ir` overlay exposes the receiver as an input device that
//! reports each decoded button press as an `MSC_SCAN` event.

use crate::types::Scancode;
use evdev::{Device, InputEventKind, MiscType};
use futures_util::Stream;
use std::io;
use std::path::PathBuf;

/// An input device found during enumeration
#[derive(Debug, Clone)]
pub struct InputDeviceInfo {
    pub path: PathBuf,
    pub name: String,
}

/// List all input devices the process can open
pub fn list_devices() -> Vec<InputDeviceInfo> {
    evdev::enumerate()
        .map(|(path, device)| InputDeviceInfo {
            path,
            name: device.name().unwrap_or("unnamed").to_string(),
        })
        .collect()
}

/// Whether a device name looks like an IR receiver (`gpio_ir_recv` and similar)
pub fn is_receiver_name(name: &str) -> bool {
    let name = name.to_lowercase();
    name.contains("gpio") || name.contains("ir")
}

/// Find the first device that looks like an IR receiver
pub fn find_receiver() -> Option<(PathBuf, Device)> {
    evdev::enumerate().find(|(_, device)| device.name().is_some_and(is_receiver_name))
}

/// Stream of raw scancodes from `device`.
///
/// The stream ends when the device reports an error (usually because it was
/// unplugged); the caller decides whether to look for it again.
pub fn scancodes(device: Device) -> io::Result<impl Stream<Item = Scancode>> {
    let events = device.into_event_stream()?;

    Ok(futures_util::stream::unfold(events, |mut events| async move {
        loop {
            match events.next_event().await {
                Ok(event) => {
                    if let InputEventKind::Misc(MiscType::MSC_SCAN) = event.kind() {
                        return Some((event.value() as Scancode, events));
                    }
                }
                Err(e) => {
                    tracing::error!("IR device read failed: {}", e);
                    return None;
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receiver_names() {
        assert!(is_receiver_name("gpio_ir_recv"));
        assert!(is_receiver_name("IR Receiver"));
        assert!(!is_receiver_name("USB Keyboard"));
    }
}
