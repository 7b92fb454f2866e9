//! The Engine Registry (C4): maintains known engine families, lists
//! upstream releases/variants, and drives install/uninstall through the
//! Download Service into the canonical on-disk layout.

pub mod catalog;
pub mod extract;
pub mod layout;
pub mod matching;
pub mod types;

use catalog::CatalogClient;
use cortex_config::ConfigStore;
use cortex_core::{Error, HostDescriptor, Result};
use cortex_download::{DownloadItem, DownloadService, DownloadTask, TaskKind};
use cortex_entities::{EngineEntry, EngineStatus, EntityStore};
use layout::VersionManifest;
pub use types::{Release, Variant};

use std::sync::Arc;

pub struct EngineRegistry {
    catalog: CatalogClient,
    downloads: Arc<DownloadService>,
    entities: Arc<EntityStore>,
    config: Arc<ConfigStore>,
}

impl EngineRegistry {
    pub fn new(
        catalog: CatalogClient,
        downloads: Arc<DownloadService>,
        entities: Arc<EntityStore>,
        config: Arc<ConfigStore>,
    ) -> Self {
        Self {
            catalog,
            downloads,
            entities,
            config,
        }
    }

    pub async fn releases(&self, family: &str) -> Result<Vec<Release>> {
        self.catalog.releases(family).await
    }

    pub async fn variants(&self, family: &str, version: &str) -> Result<Vec<Variant>> {
        self.catalog.variants(family, version).await
    }

    /// Installs the best (or caller-pinned) variant of `family`/`version`:
    /// resolves the variant, downloads its archive (and a CUDA auxiliary
    /// archive if required and absent), extracts into the canonical layout,
    /// writes `version.txt`, and upserts the entity record.
    pub async fn install(
        &self,
        family: &str,
        version: Option<&str>,
        variant_tag: Option<&str>,
        host: &HostDescriptor,
    ) -> Result<Variant> {
        let version = match version {
            Some(v) => v.to_string(),
            None => self.latest_release(family).await?,
        };
        let variants = self.catalog.variants(family, &version).await?;
        let chosen = match variant_tag {
            Some(tag) => variants
                .iter()
                .find(|v| v.tag == tag)
                .ok_or_else(|| Error::not_found(format!("variant {tag} not found for {family} {version}")))?,
            None => matching::best_variant(host, &variants)?,
        };
        tracing::info!(family, version, variant = %chosen.tag, "installing engine variant");

        let data_root = self.config.get().data_folder;
        let install_dir = layout::install_dir(&data_root, family, &chosen.tag, &version);

        let archive_path = data_root.join("downloads").join(format!("{family}-{}-{version}.tar.gz", chosen.tag));
        let mut items = vec![DownloadItem::new(
            format!("{family}-{}-{version}", chosen.tag),
            chosen.url.clone(),
            archive_path.clone(),
        )];

        let mut cuda_archive_path = None;
        if chosen.needs_cuda() && !host.has_cuda() {
            let major = chosen
                .cuda_major
                .ok_or_else(|| Error::internal(format!("variant {} needs CUDA but declares no cuda_major", chosen.tag)))?;
            let cuda_url = cuda_package_url(family, major);
            let path = data_root.join("downloads").join(format!("{family}-cuda-{major}.tar.gz"));
            items.push(DownloadItem::new(format!("{family}-cuda-{major}"), cuda_url, path.clone()));
            cuda_archive_path = Some(path);
        }

        let task = DownloadTask {
            id: format!("install-{family}-{}-{version}", chosen.tag),
            kind: TaskKind::Engine,
            items,
        };
        let completed = self.downloads.add_download_task(task).await;
        if !completed {
            return Err(Error::download_failed(format!("failed to download {family} {version}")));
        }

        extract::extract_tar_gz(&archive_path, &install_dir)?;
        if let Some(cuda_path) = cuda_archive_path {
            extract::extract_tar_gz(&cuda_path, &install_dir)?;
        }

        layout::write_manifest(
            &install_dir,
            &VersionManifest {
                name: family.to_string(),
                version: version.clone(),
                capabilities: chosen.capabilities.clone(),
            },
        )?;

        cortex_entities::engines::upsert(
            self.entities.engines(),
            &EngineEntry {
                id: uuid::Uuid::new_v4().to_string(),
                name: family.to_string(),
                variant: chosen.tag.clone(),
                version: version.clone(),
                engine_type: "local".to_string(),
                api_key: None,
                url: None,
                status: EngineStatus::Ready,
                metadata: serde_json::json!({ "capabilities": chosen.capabilities }),
            },
        )?;

        Ok(chosen.clone())
    }

    /// Removes an installed variant's files. If it is the family's loaded
    /// engine, the caller (the Loader) must be asked to unload first —
    /// the registry itself has no loader reference, per spec.md's
    /// ownership rules (Loader owns handles, Registry owns records).
    pub fn uninstall(&self, family: &str, version: &str, variant_tag: &str) -> Result<()> {
        let data_root = self.config.get().data_folder;
        let install_dir = layout::install_dir(&data_root, family, variant_tag, version);
        if install_dir.exists() {
            std::fs::remove_dir_all(&install_dir)?;
        }
        if let Some(entry) = cortex_entities::engines::get_by_name_and_variant(self.entities.engines(), family, variant_tag)? {
            cortex_entities::engines::delete_by_id(self.entities.engines(), &entry.id)?;
        }
        Ok(())
    }

    pub fn get_default(&self, family: &str) -> Option<cortex_config::DefaultVariant> {
        self.config.get().default_engine_variants.get(family).cloned()
    }

    pub fn set_default(&self, family: &str, version: &str, variant_tag: &str) -> Result<()> {
        let family = family.to_string();
        let default = cortex_config::DefaultVariant {
            version: version.to_string(),
            variant: variant_tag.to_string(),
        };
        self.config.update(Box::new(move |cfg| {
            cfg.default_engine_variants.insert(family.clone(), default.clone());
        }))?;
        Ok(())
    }

    /// Scans the canonical directory tree for installed variants of `family`.
    pub fn installed_variants(&self, family: &str) -> Result<Vec<(String, String)>> {
        let data_root = self.config.get().data_folder;
        let family_dir = data_root.join("engines").join(family);
        let mut found = Vec::new();
        let Ok(variant_entries) = std::fs::read_dir(&family_dir) else {
            return Ok(found);
        };
        for variant_entry in variant_entries.filter_map(|e| e.ok()) {
            let variant_tag = variant_entry.file_name().to_string_lossy().to_string();
            let Ok(version_entries) = std::fs::read_dir(variant_entry.path()) else {
                continue;
            };
            for version_entry in version_entries.filter_map(|e| e.ok()) {
                if layout::is_installed(&version_entry.path()) {
                    let version = version_entry.file_name().to_string_lossy().to_string();
                    found.push((variant_tag.clone(), version));
                }
            }
        }
        Ok(found)
    }

    pub fn is_ready(&self, family: &str) -> Result<bool> {
        Ok(!self.installed_variants(family)?.is_empty())
    }

    async fn latest_release(&self, family: &str) -> Result<String> {
        let mut releases = self.catalog.releases(family).await?;
        releases.sort_by(|a, b| {
            semver::Version::parse(&a.version)
                .ok()
                .cmp(&semver::Version::parse(&b.version).ok())
        });
        releases
            .into_iter()
            .last()
            .map(|r| r.version)
            .ok_or_else(|| Error::not_found(format!("no releases available for {family}")))
    }
}

/// The curated CUDA auxiliary package URL, keyed by (family, driver-major).
/// A hardcoded catalog would go stale quickly; in the real deployment this
/// is itself a catalog lookup, but for the core spec a fixed URL scheme is
/// sufficient since the packages are versioned by CUDA major alone.
fn cuda_package_url(family: &str, driver_major: u32) -> String {
    format!("https://cdn.cortex.so/cuda-packages/{family}/cuda-{driver_major}.tar.gz")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_core::SimdLevel;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn host() -> HostDescriptor {
        HostDescriptor {
            os: "linux".to_string(),
            arch: "x86_64".to_string(),
            simd: SimdLevel::Avx2,
            cuda_major: None,
        }
    }

    async fn setup(server: &MockServer) -> (EngineRegistry, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigStore::load(cortex_config::ConfigOverrides {
            data_folder: Some(dir.path().to_path_buf()),
            ..Default::default()
        })
        .unwrap();
        let entities = Arc::new(EntityStore::open(&dir.path().join("cortex.db")).unwrap());
        let downloads = Arc::new(DownloadService::with_pool_size(cortex_events::EventBus::new(), 2));
        let catalog = CatalogClient::new(server.uri());
        (EngineRegistry::new(catalog, downloads, entities, config), dir)
    }

    fn sample_archive_bytes() -> Vec<u8> {
        use std::io::Write as _;
        let mut buf = Vec::new();
        {
            let encoder = flate2::write::GzEncoder::new(&mut buf, flate2::Compression::default());
            let mut builder = tar::Builder::new(encoder);
            let mut header = tar::Header::new_gnu();
            header.set_size(4);
            header.set_cksum();
            builder.append_data(&mut header, "libengine.so", &b"stub"[..]).unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }
        buf
    }

    #[tokio::test]
    async fn install_picks_best_variant_and_writes_canonical_layout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/llama-cpp/releases/0.1.0/variants"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "tag": "linux-amd64-avx2",
                    "os": "linux",
                    "arch": "x86_64",
                    "simd": "avx2",
                    "cuda_major": null,
                    "performance_hint": null,
                    "url": format!("{}/archive.tar.gz", server.uri()),
                    "size_bytes": 4,
                    "capabilities": ["chat"],
                    "n_parallel": 1
                }
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/archive.tar.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(sample_archive_bytes()))
            .mount(&server)
            .await;

        let (registry, dir) = setup(&server).await;
        let chosen = registry
            .install("llama-cpp", Some("0.1.0"), None, &host())
            .await
            .unwrap();
        assert_eq!(chosen.tag, "linux-amd64-avx2");

        let install_dir = dir.path().join("engines/llama-cpp/linux-amd64-avx2/0.1.0");
        assert!(install_dir.join("version.txt").exists());
        assert!(install_dir.join("libengine.so").exists());
        assert!(registry.is_ready("llama-cpp").unwrap());
    }
}
