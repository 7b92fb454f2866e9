//! Host descriptor used by the Engine Registry's variant matcher.
//!
//! Hardware/GPU probing itself is out of scope (an external collaborator per
//! the system spec); this module only defines the shape the registry reads,
//! plus a best-effort runtime fallback for the parts `std` can tell us
//! (OS/arch) when no probe result is available.

use serde::{Deserialize, Serialize};
use std::fmt;

/// SIMD capability level, ordered from least to most capable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimdLevel {
    None,
    Sse4,
    Avx,
    Avx2,
    Avx512,
}

impl fmt::Display for SimdLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SimdLevel::None => "none",
            SimdLevel::Sse4 => "sse4",
            SimdLevel::Avx => "avx",
            SimdLevel::Avx2 => "avx2",
            SimdLevel::Avx512 => "avx512",
        };
        f.write_str(s)
    }
}

/// Snapshot of the host this process is running on, used to match an engine
/// variant. Mirrors the `hardware` entity-store table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostDescriptor {
    pub os: String,
    pub arch: String,
    pub simd: SimdLevel,
    /// `None` if no CUDA driver is present.
    pub cuda_major: Option<u32>,
}

impl HostDescriptor {
    /// Best-effort descriptor derived from `std::env::consts` alone, used
    /// when the (external) hardware-info probe has not written a `hardware`
    /// row yet. SIMD and CUDA are conservatively reported as absent since
    /// detecting them is the probe's job, not ours.
    pub fn runtime_fallback() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            simd: SimdLevel::None,
            cuda_major: None,
        }
    }

    pub fn has_cuda(&self) -> bool {
        self.cuda_major.is_some()
    }
}

impl fmt::Display for HostDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cuda_major {
            Some(major) => write!(
                f,
                "{}-{} (simd={}, cuda={})",
                self.os, self.arch, self.simd, major
            ),
            None => write!(f, "{}-{} (simd={}, no cuda)", self.os, self.arch, self.simd),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_mentions_cuda_when_present() {
        let host = HostDescriptor {
            os: "linux".into(),
            arch: "x86_64".into(),
            simd: SimdLevel::Avx2,
            cuda_major: Some(12),
        };
        assert!(host.to_string().contains("cuda=12"));
    }

    #[test]
    fn runtime_fallback_reports_no_cuda() {
        let host = HostDescriptor::runtime_fallback();
        assert!(!host.has_cuda());
    }
}
