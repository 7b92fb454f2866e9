//! Archive extraction for downloaded engine/CUDA packages: `.tar.gz` only,
//! the format every upstream asset uses.

use cortex_core::{Error, Result};
use std::fs::File;
use std::path::Path;

pub fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dest_dir)?;
    let file = File::open(archive_path)?;
    let decoder = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);
    archive
        .unpack(dest_dir)
        .map_err(|e| Error::internal(format!("failed to extract {}: {e}", archive_path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn extracts_a_single_file_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("archive.tar.gz");
        {
            let file = File::create(&archive_path).unwrap();
            let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            let mut builder = tar::Builder::new(encoder);
            let mut header = tar::Header::new_gnu();
            header.set_size(5);
            header.set_cksum();
            builder.append_data(&mut header, "hello.txt", &b"world"[..]).unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        let dest = dir.path().join("out");
        extract_tar_gz(&archive_path, &dest).unwrap();
        assert_eq!(std::fs::read(dest.join("hello.txt")).unwrap(), b"world");
    }
}
