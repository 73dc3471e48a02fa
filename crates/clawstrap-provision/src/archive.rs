use clawstrap_core::AppError;
use flate2::read::GzDecoder;
use std::fs::File;
use std::path::Path;

/// Unpack a `.tar.gz` into `dest`, creating it if needed.
pub fn unpack_tar_gz(archive: &Path, dest: &Path) -> Result<(), AppError> {
    std::fs::create_dir_all(dest)?;
    let file = File::open(archive)?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));
    tar.set_preserve_permissions(true);
    tar.unpack(dest).map_err(|e| {
        AppError::Other(format!("failed to unpack {}: {e}", archive.display()))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn unpacks_nested_tree_with_modes() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src/go/bin");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("go"), "#!/bin/sh\necho go version go1.23.4\n").unwrap();
        std::fs::set_permissions(src.join("go"), std::fs::Permissions::from_mode(0o755)).unwrap();

        let archive = dir.path().join("go.tar.gz");
        let enc = GzEncoder::new(File::create(&archive).unwrap(), Compression::default());
        let mut builder = tar::Builder::new(enc);
        builder.append_dir_all("go", dir.path().join("src/go")).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let out = dir.path().join("staging");
        unpack_tar_gz(&archive, &out).unwrap();
        let go = out.join("go/bin/go");
        assert!(go.is_file());
        assert_eq!(std::fs::metadata(&go).unwrap().permissions().mode() & 0o111, 0o111);
    }

    #[test]
    fn corrupt_archive_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.tar.gz");
        std::fs::write(&archive, b"not gzip").unwrap();
        assert!(unpack_tar_gz(&archive, &dir.path().join("out")).is_err());
    }
}
