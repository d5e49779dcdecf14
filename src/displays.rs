//! Display enumeration
//!
//! Best-effort discovery of capture targets for a user to pick from. Nothing here is on the
//! capture-critical path, so enumeration failures degrade to an empty (or truncated) list
//! instead of propagating.
//!
//! # Usage
//!
//! ```rust
//! # use deskdup_capture::displays;
//! for line in displays::get_available_displays() {
//!     println!("{}", line);
//! }
//! ```

use serde::{Deserialize, Serialize};

/// Snapshot of one output at enumeration time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayDescriptor {
    pub adapter_index: u32,
    pub output_index: u32,
    pub name: String,
    pub width: u32,
    pub height: u32,
}

impl DisplayDescriptor {
    /// Human-readable line, `position` being the running index across all adapters
    pub fn label(&self, position: usize) -> String {
        format!(
            "Display {}: {} ({}x{})",
            position, self.name, self.width, self.height
        )
    }
}

/// Format descriptors as `"Display <n>: <name> (<w>x<h>)"` lines
pub fn format_display_list(displays: &[DisplayDescriptor]) -> Vec<String> {
    displays
        .iter()
        .enumerate()
        .map(|(position, display)| display.label(position))
        .collect()
}

/// Human-readable list of every output on every adapter
pub fn get_available_displays() -> Vec<String> {
    format_display_list(&enumerate_displays())
}

/// Decode a NUL-terminated UTF-16 device name
pub fn output_name(raw: &[u16]) -> String {
    let len = raw.iter().position(|&c| c == 0).unwrap_or(raw.len());
    String::from_utf16_lossy(&raw[..len])
}

/// Walk adapters and their outputs in the order DXGI reports them
#[cfg(target_os = "windows")]
pub fn enumerate_displays() -> Vec<DisplayDescriptor> {
    use log::{debug, warn};
    use windows::Win32::Graphics::Dxgi::{CreateDXGIFactory1, IDXGIFactory1};

    let factory: IDXGIFactory1 = match unsafe { CreateDXGIFactory1() } {
        Ok(factory) => factory,
        Err(e) => {
            warn!("CreateDXGIFactory1 failed, no displays listed: {:?}", e);
            return Vec::new();
        }
    };

    let mut displays = Vec::new();
    let mut adapter_index = 0u32;
    while let Ok(adapter) = unsafe { factory.EnumAdapters1(adapter_index) } {
        let mut output_index = 0u32;
        while let Ok(output) = unsafe { adapter.EnumOutputs(output_index) } {
            match unsafe { output.GetDesc() } {
                Ok(desc) => {
                    let rect = desc.DesktopCoordinates;
                    displays.push(DisplayDescriptor {
                        adapter_index,
                        output_index,
                        name: output_name(&desc.DeviceName),
                        width: (rect.right - rect.left).max(0) as u32,
                        height: (rect.bottom - rect.top).max(0) as u32,
                    });
                }
                Err(e) => debug!(
                    "Skipping output {} on adapter {}: {:?}",
                    output_index, adapter_index, e
                ),
            }
            output_index += 1;
        }
        adapter_index += 1;
    }

    displays
}

/// DXGI is Windows-only; other platforms have nothing to duplicate
#[cfg(not(target_os = "windows"))]
pub fn enumerate_displays() -> Vec<DisplayDescriptor> {
    log::debug!("Display enumeration is only supported on Windows");
    Vec::new()
}
