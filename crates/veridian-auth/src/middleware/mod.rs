//! HTTP middleware.

pub mod device;

pub use device::{DeviceProofLayerState, require_device_proof};
