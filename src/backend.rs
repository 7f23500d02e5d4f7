//! Compute-device selection.
//!
//! The device is chosen once from [`crate::config::DeviceConfig`] (optionally
//! overridden by `VOXMOOD_BACKEND`) and handed to the generic pipeline code
//! through [`dispatch`]; no component binds a device on its own.

use std::env;

use burn::backend::Autodiff;
use burn::backend::ndarray::{NdArray, NdArrayDevice};
#[cfg(feature = "wgpu")]
use burn::backend::wgpu::{Wgpu, WgpuDevice};
#[cfg(feature = "cuda")]
use burn::backend::{Cuda, cuda::CudaDevice};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ConfigError;

pub const BACKEND_ENV: &str = "VOXMOOD_BACKEND";

pub type CpuBackend = NdArray;
pub type CpuDevice = NdArrayDevice;
/// Training backend used by tests and the default CPU build.
pub type CpuAutodiff = Autodiff<CpuBackend>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Cpu,
    Wgpu,
    Cuda,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Cpu => "cpu",
            BackendKind::Wgpu => "wgpu",
            BackendKind::Cuda => "cuda",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cpu" | "ndarray" => Some(BackendKind::Cpu),
            "wgpu" | "vulkan" | "metal" => Some(BackendKind::Wgpu),
            "cuda" => Some(BackendKind::Cuda),
            _ => None,
        }
    }
}

/// Apply the environment override on top of the configured backend.
pub fn resolve_backend_kind(configured: BackendKind) -> BackendKind {
    let Ok(requested) = env::var(BACKEND_ENV) else {
        return configured;
    };
    if requested.trim().is_empty() {
        return configured;
    }
    match BackendKind::parse(&requested) {
        Some(kind) => kind,
        None => {
            warn!(
                "Unknown backend '{requested}' in {BACKEND_ENV}, using configured '{}'.",
                configured.as_str()
            );
            configured
        }
    }
}

/// Work that is generic over the training backend.
///
/// Evaluation-only tasks use `B::InnerBackend`; both share the same device.
pub trait BackendTask {
    type Output;

    fn run<B: AutodiffBackend>(self, device: B::Device) -> Self::Output;
}

/// Run `task` on the backend selected by `kind`.
pub fn dispatch<T: BackendTask>(kind: BackendKind, task: T) -> Result<T::Output, ConfigError> {
    let kind = resolve_backend_kind(kind);
    info!("Using compute backend: {}", kind.as_str());
    match kind {
        BackendKind::Cpu => Ok(task.run::<CpuAutodiff>(CpuDevice::default())),
        #[cfg(feature = "wgpu")]
        BackendKind::Wgpu => Ok(task.run::<Autodiff<Wgpu>>(WgpuDevice::default())),
        #[cfg(feature = "cuda")]
        BackendKind::Cuda => Ok(task.run::<Autodiff<Cuda>>(CudaDevice::default())),
        #[allow(unreachable_patterns)]
        other => Err(ConfigError::Invalid(format!(
            "backend '{}' is not compiled in; rebuild with --features {}",
            other.as_str(),
            other.as_str()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_aliases() {
        assert_eq!(BackendKind::parse("NDARRAY"), Some(BackendKind::Cpu));
        assert_eq!(BackendKind::parse(" vulkan "), Some(BackendKind::Wgpu));
        assert_eq!(BackendKind::parse("tpu"), None);
    }

    #[test]
    fn backend_kind_deserializes_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            backend: BackendKind,
        }
        let parsed: Wrapper = toml::from_str("backend = \"cuda\"").unwrap();
        assert_eq!(parsed.backend, BackendKind::Cuda);
    }
}
