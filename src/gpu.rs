//! GPU availability probe.
//!
//! The foreign device check is not present in every release, and a failing
//! check says nothing about the hardware. Failures therefore map to
//! [`GpuStatus::Unknown`] with a warning, never to `Unavailable`.

use std::fmt;
use std::io::Write;

use serde::Serialize;

use crate::error::{BindError, Result};
use crate::interop::{call_path, ForeignObject};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuStatus {
    Available,
    Unavailable,
    Unknown,
}

impl GpuStatus {
    /// `Some(bool)` for a definite answer, `None` for unknown.
    pub fn as_option(self) -> Option<bool> {
        match self {
            GpuStatus::Available => Some(true),
            GpuStatus::Unavailable => Some(false),
            GpuStatus::Unknown => None,
        }
    }
}

impl From<bool> for GpuStatus {
    fn from(available: bool) -> Self {
        if available {
            GpuStatus::Available
        } else {
            GpuStatus::Unavailable
        }
    }
}

impl fmt::Display for GpuStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuStatus::Available => write!(f, "available"),
            GpuStatus::Unavailable => write!(f, "unavailable"),
            GpuStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Ask the foreign module whether a GPU is usable.
///
/// With `verbose`, also writes the CUDA build flag and device name to
/// `out`. Those extra lines are best effort and never change the result.
pub fn gpu_available(module: &dyn ForeignObject, verbose: bool, out: &mut dyn Write) -> GpuStatus {
    let status = match call_path(module, "test.is_gpu_available", &[]).and_then(|v| v.as_bool()) {
        Ok(available) => GpuStatus::from(available),
        Err(e) => {
            tracing::warn!("unable to determine GPU availability: {}", e);
            GpuStatus::Unknown
        }
    };

    if verbose {
        if let Err(e) = write_cuda_build(module, out) {
            tracing::debug!("CUDA build flag unavailable: {}", e);
        }
        if let Err(e) = write_device_name(module, out) {
            tracing::debug!("GPU device name unavailable: {}", e);
        }
    }

    status
}

fn write_cuda_build(module: &dyn ForeignObject, out: &mut dyn Write) -> Result<()> {
    let cuda = call_path(module, "test.is_built_with_cuda", &[])?.as_bool()?;
    writeln!(out, "CUDA build: {cuda}").map_err(write_error)
}

fn write_device_name(module: &dyn ForeignObject, out: &mut dyn Write) -> Result<()> {
    let device = call_path(module, "test.gpu_device_name", &[])?;
    let device = device.as_str()?;
    let device = if device.is_empty() { "none" } else { device };
    writeln!(out, "GPU device: {device}").map_err(write_error)
}

fn write_error(e: std::io::Error) -> BindError {
    BindError::Config(format!("could not write GPU details: {e}"))
}
