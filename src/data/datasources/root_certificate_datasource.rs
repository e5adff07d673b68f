use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use crate::errors::IapError;

/// Reads each Apple root certificate file fully, in the order given.
///
/// Any unreadable path fails the whole load; a bad certificate is never
/// skipped.
pub(crate) fn load_root_certificates<P: AsRef<Path>>(
    paths: &[P],
) -> Result<Vec<Vec<u8>>, IapError> {
    info!(count = paths.len(), "Loading Apple root certificates.");
    paths
        .iter()
        .map(|path| {
            let path = path.as_ref();
            let bytes = read_file(path)?;
            debug!(path = %path.display(), len = bytes.len(), "Loaded root certificate.");
            Ok(bytes)
        })
        .collect()
}

/// Reads the App Store Connect API private key (a PKCS#8 `.p8` file).
pub(crate) fn load_signing_key(path: &Path) -> Result<String, IapError> {
    let bytes = read_file(path)?;
    String::from_utf8(bytes).map_err(|e| IapError::FileAccess {
        path: PathBuf::from(path),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    })
}

fn read_file(path: &Path) -> Result<Vec<u8>, IapError> {
    fs::read(path).map_err(|source| IapError::FileAccess {
        path: path.to_path_buf(),
        source,
    })
}
