//! Device enumeration report for troubleshooting detection issues

use colored::*;

use super::provider::GilrsProvider;
use super::types::{DeviceCapabilities, DeviceId, SlotCategory};
use super::virtual_provider::VirtualProvider;

/// One line of the enumeration report
#[derive(Debug, Clone)]
pub struct DeviceListing {
    pub id: DeviceId,
    pub is_virtual: bool,
    pub capabilities: DeviceCapabilities,
    /// Backend-specific detail (power state, ...)
    pub detail: Option<String>,
}

/// Listing of every gamepad found by the gilrs startup scan
pub fn gilrs_listing(provider: &GilrsProvider) -> Vec<DeviceListing> {
    provider
        .devices()
        .iter()
        .map(|device| DeviceListing {
            id: device.id,
            is_virtual: false,
            capabilities: device.capabilities.clone(),
            detail: Some(format!("gilrs #{}, power {}", device.gilrs_index, device.power)),
        })
        .collect()
}

/// Listing of every configured virtual device
pub fn virtual_listing(provider: &VirtualProvider) -> Vec<DeviceListing> {
    provider
        .devices()
        .iter()
        .enumerate()
        .map(|(index, spec)| DeviceListing {
            id: DeviceId(index as u32),
            is_virtual: true,
            capabilities: spec.capabilities(),
            detail: None,
        })
        .collect()
}

/// "2 axes, 0 balls, 1 hat, 12 buttons"
pub fn describe_capabilities(caps: &DeviceCapabilities) -> String {
    fn count(n: usize, singular: &str, plural: &str) -> String {
        format!("{} {}", n, if n == 1 { singular } else { plural })
    }

    [
        count(caps.axes, "axis", "axes"),
        count(caps.balls, "ball", "balls"),
        count(caps.hats, "hat", "hats"),
        count(caps.buttons, "button", "buttons"),
    ]
    .join(", ")
}

/// Slot name range of one category, e.g. "axis0..axis5"
fn slot_range(caps: &DeviceCapabilities, category: SlotCategory) -> Option<String> {
    match caps.slot_count(category) {
        0 => None,
        1 => Some(category.slot_name(0)),
        n => Some(format!("{}..{}", category.slot_name(0), category.slot_name(n - 1))),
    }
}

/// Print the enumeration report to stdout
pub fn print_device_list(backend: &str, devices: &[DeviceListing]) {
    println!("\n{}", "=== Joystick Devices ===".bold().cyan());
    println!("Backend:  {}", backend.bright_white());
    println!("Platform: {}", std::env::consts::OS);

    if devices.is_empty() {
        println!("\n  {}", "No devices found".dimmed());
        println!("  {}", "Check the device is connected and the driver is installed".dimmed());
        println!();
        return;
    }

    println!("\n{}", format!("Found {} device(s):", devices.len()).bold());
    for device in devices {
        let marker = if device.is_virtual {
            "[VIRTUAL]".yellow()
        } else {
            "[PHYSICAL]".green()
        };
        println!(
            "  {} {} \"{}\"",
            marker,
            device.id.to_string().bright_white(),
            device.capabilities.name
        );
        println!("      {}", describe_capabilities(&device.capabilities));

        let slots: Vec<String> = SlotCategory::ALL
            .iter()
            .filter_map(|&category| slot_range(&device.capabilities, category))
            .collect();
        if !slots.is_empty() {
            println!("      slots: {}", slots.join(" ").dimmed());
        }
        if let Some(detail) = &device.detail {
            println!("      {}", detail.dimmed());
        }
    }

    println!("\n💡 Use the id (the number after 'joy') in the config's devices list or with --device");
    println!();
}
