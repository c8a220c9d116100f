//! Output device selection

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host};

use crate::{AudioError, AudioResult};

/// Get the audio host (platform default backend)
pub fn get_host() -> Host {
    cpal::default_host()
}

/// Get default output device
pub fn get_default_output_device() -> AudioResult<Device> {
    let host = get_host();
    host.default_output_device().ok_or(AudioError::NoDevice)
}

/// Get output device by name
pub fn get_output_device_by_name(name: &str) -> AudioResult<Device> {
    let host = get_host();

    for device in host
        .output_devices()
        .map_err(|e| AudioError::BackendError(e.to_string()))?
    {
        if let Ok(device_name) = device.name()
            && device_name == name
        {
            return Ok(device);
        }
    }

    Err(AudioError::DeviceNotFound(name.to_string()))
}

/// Resolve an optional device name to a device, falling back to the default
pub fn select_output_device(name: Option<&str>) -> AudioResult<Device> {
    match name {
        Some(name) => get_output_device_by_name(name),
        None => get_default_output_device(),
    }
}
