//! Variant matching: picks the best installable variant for the running
//! host when the caller does not pin one explicitly.
//!
//! Priority order per spec.md §4.4: operating system, CPU architecture,
//! SIMD capability (highest supported), accelerator capability (CUDA major
//! version match, else CPU), then declared performance hint, then
//! lexicographic tag order. Exact tie-break semantics for the performance
//! hint are taken from `original_source/engine/services/engine_service.cc`:
//! a hint only wins once OS/arch/accelerator are already equal — it never
//! overrides an accelerator or SIMD-level difference.

use crate::types::Variant;
use cortex_core::{Error, HostDescriptor, Result};

pub fn best_variant<'a>(host: &HostDescriptor, variants: &'a [Variant]) -> Result<&'a Variant> {
    let os_arch_matches: Vec<&Variant> = variants
        .iter()
        .filter(|v| v.os == host.os && v.arch == host.arch)
        .collect();

    if os_arch_matches.is_empty() {
        return Err(Error::incompatible_host(format!(
            "no variant matches os={} arch={} (host: {})",
            host.os, host.arch, host
        )));
    }

    let accelerator_matches = filter_by_accelerator(host, &os_arch_matches);
    let pool = if accelerator_matches.is_empty() {
        os_arch_matches
    } else {
        accelerator_matches
    };

    let max_simd = pool.iter().map(|v| v.simd).max().unwrap_or(cortex_core::SimdLevel::None);
    let simd_matches: Vec<&&Variant> = pool.iter().filter(|v| v.simd == max_simd).collect();

    let mut candidates: Vec<&Variant> = simd_matches.into_iter().copied().collect();
    candidates.sort_by(|a, b| {
        let hint_a = a.performance_hint.as_deref().unwrap_or("");
        let hint_b = b.performance_hint.as_deref().unwrap_or("");
        hint_b.cmp(hint_a).then_with(|| a.tag.cmp(&b.tag))
    });

    candidates
        .into_iter()
        .next()
        .ok_or_else(|| Error::incompatible_host(format!("no compatible variant for host {host}")))
}

fn filter_by_accelerator<'a>(host: &HostDescriptor, pool: &[&'a Variant]) -> Vec<&'a Variant> {
    if let Some(major) = host.cuda_major {
        let matches: Vec<&Variant> = pool.iter().copied().filter(|v| v.cuda_major == Some(major)).collect();
        if !matches.is_empty() {
            return matches;
        }
    }
    pool.iter().copied().filter(|v| !v.needs_cuda()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_core::SimdLevel;

    fn variant(tag: &str, simd: SimdLevel, cuda_major: Option<u32>, hint: Option<&str>) -> Variant {
        Variant {
            tag: tag.to_string(),
            os: "linux".to_string(),
            arch: "x86_64".to_string(),
            simd,
            cuda_major,
            performance_hint: hint.map(str::to_string),
            url: format!("https://example.test/{tag}.tar.gz"),
            size_bytes: 0,
            capabilities: vec![],
            n_parallel: 1,
        }
    }

    fn host(simd: SimdLevel, cuda_major: Option<u32>) -> HostDescriptor {
        HostDescriptor {
            os: "linux".to_string(),
            arch: "x86_64".to_string(),
            simd,
            cuda_major,
        }
    }

    #[test]
    fn prefers_highest_simd_among_cpu_variants() {
        let variants = vec![
            variant("cpu-sse4", SimdLevel::Sse4, None, None),
            variant("cpu-avx2", SimdLevel::Avx2, None, None),
            variant("cpu-avx", SimdLevel::Avx, None, None),
        ];
        let picked = best_variant(&host(SimdLevel::Avx2, None), &variants).unwrap();
        assert_eq!(picked.tag, "cpu-avx2");
    }

    #[test]
    fn prefers_matching_cuda_major_over_cpu() {
        let variants = vec![
            variant("cpu", SimdLevel::Avx2, None, None),
            variant("cuda-12", SimdLevel::Avx2, Some(12), None),
        ];
        let picked = best_variant(&host(SimdLevel::Avx2, Some(12)), &variants).unwrap();
        assert_eq!(picked.tag, "cuda-12");
    }

    #[test]
    fn falls_back_to_cpu_when_no_cuda_major_matches() {
        let variants = vec![
            variant("cpu", SimdLevel::Avx2, None, None),
            variant("cuda-11", SimdLevel::Avx2, Some(11), None),
        ];
        let picked = best_variant(&host(SimdLevel::Avx2, Some(12)), &variants).unwrap();
        assert_eq!(picked.tag, "cpu");
    }

    #[test]
    fn performance_hint_breaks_ties_after_simd_and_accelerator() {
        let variants = vec![
            variant("variant-a", SimdLevel::Avx2, None, Some("fast")),
            variant("variant-b", SimdLevel::Avx2, None, Some("slow")),
        ];
        let picked = best_variant(&host(SimdLevel::Avx2, None), &variants).unwrap();
        assert_eq!(picked.tag, "variant-a");
    }

    #[test]
    fn lexicographic_tag_breaks_remaining_ties() {
        let variants = vec![
            variant("zzz", SimdLevel::Avx2, None, None),
            variant("aaa", SimdLevel::Avx2, None, None),
        ];
        let picked = best_variant(&host(SimdLevel::Avx2, None), &variants).unwrap();
        assert_eq!(picked.tag, "aaa");
    }

    #[test]
    fn no_os_arch_match_is_incompatible_host() {
        let variants = vec![Variant {
            os: "windows".to_string(),
            ..variant("win", SimdLevel::Avx2, None, None)
        }];
        let err = best_variant(&host(SimdLevel::Avx2, None), &variants).unwrap_err();
        assert_eq!(err.kind, cortex_core::ErrorKind::IncompatibleHost);
    }
}
