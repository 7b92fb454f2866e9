//! Catalog wire shapes: upstream releases and their downloadable variants.

use cortex_core::SimdLevel;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    /// e.g. `"linux-amd64-avx2"`. Unique within a (family, version).
    pub tag: String,
    pub os: String,
    pub arch: String,
    #[serde(default = "default_simd")]
    pub simd: SimdLevel,
    /// `Some(major)` if this variant requires a CUDA runtime of that major
    /// version; `None` for CPU-only variants.
    pub cuda_major: Option<u32>,
    /// Free-text hint used only to break matching ties, e.g. `"fast"`.
    #[serde(default)]
    pub performance_hint: Option<String>,
    pub url: String,
    pub size_bytes: u64,
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// The maximum number of concurrent inference slots this variant
    /// supports; `1` forces the dispatcher's single-slot gating.
    #[serde(default = "default_n_parallel")]
    pub n_parallel: u32,
}

fn default_simd() -> SimdLevel {
    SimdLevel::None
}

fn default_n_parallel() -> u32 {
    1
}

impl Variant {
    pub fn needs_cuda(&self) -> bool {
        self.cuda_major.is_some()
    }
}
