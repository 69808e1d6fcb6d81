//! Device setup with validation.
//!
//! Debug builds turn on the wgpu validation layer so misuse of the brush
//! pipeline surfaces as a logged error instead of silent garbage in a tile.

use terra_common::{TerraError, TerraResult};
use tracing::{error, info};

/// Instance flags: validation and debug labels in debug builds only.
#[must_use]
pub fn gpu_instance_flags() -> wgpu::InstanceFlags {
    if cfg!(debug_assertions) {
        info!("GPU validation layer enabled (debug build)");
        wgpu::InstanceFlags::VALIDATION | wgpu::InstanceFlags::DEBUG
    } else {
        wgpu::InstanceFlags::empty()
    }
}

/// Creates a wgpu instance over all backends with [`gpu_instance_flags`].
#[must_use]
pub fn create_validated_instance() -> wgpu::Instance {
    wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        flags: gpu_instance_flags(),
        ..Default::default()
    })
}

/// Logs an uncaptured device error.
pub fn handle_device_error(error: &wgpu::Error) {
    error!("GPU device error: {error}");
}

/// Opens a device without a surface, for offscreen tile editing.
///
/// `force_fallback` asks for the software adapter, which is what CI has.
pub fn request_headless_device(force_fallback: bool) -> TerraResult<(wgpu::Device, wgpu::Queue)> {
    let instance = create_validated_instance();
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::LowPower,
        compatible_surface: None,
        force_fallback_adapter: force_fallback,
    }));
    let adapter = require_adapter(adapter)?;

    let adapter_info = adapter.get_info();
    info!(
        "Using adapter '{}' ({:?})",
        adapter_info.name, adapter_info.backend
    );

    let (device, queue) = pollster::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("Terra Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults(),
            memory_hints: wgpu::MemoryHints::default(),
        },
        None,
    ))
    .map_err(device_unavailable)?;

    device.on_uncaptured_error(Box::new(|e: wgpu::Error| handle_device_error(&e)));
    Ok((device, queue))
}

/// A missing adapter is a setup problem, not a device fault.
fn require_adapter<A>(adapter: Option<A>) -> TerraResult<A> {
    adapter.ok_or_else(|| TerraError::Configuration("no suitable GPU adapter".to_string()))
}

fn device_unavailable(error: impl std::fmt::Display) -> TerraError {
    TerraError::Configuration(format!("GPU device unavailable: {error}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_adapter_is_configuration_error() {
        let result = require_adapter::<wgpu::Adapter>(None);
        assert!(matches!(result, Err(TerraError::Configuration(_))));
        assert_eq!(require_adapter(Some(7)).ok(), Some(7));
    }

    #[test]
    fn test_device_failure_is_configuration_error() {
        let error = device_unavailable("limits exceeded");
        assert!(matches!(
            error,
            TerraError::Configuration(ref msg) if msg.contains("limits exceeded")
        ));
        assert!(!error.is_recoverable());
    }
}
