//! Content fingerprints for file-backed resources.
//!
//! A fingerprint answers "did the declared bytes change since the last apply"
//! without keeping the bytes in state. SHA-256 is used for its collision
//! resistance; the digest is never used for anything security-related.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::ContentFingerprint;

const READ_CHUNK: usize = 64 * 1024;

/// Failure to read content that was declared for fingerprinting.
#[derive(Debug, Error)]
pub enum FingerprintError {
    /// A file or directory could not be opened or read.
    #[error("failed to read {path} for fingerprinting")]
    Read {
        /// The path that failed.
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The path given as a directory is not one.
    #[error("{path} is not a directory")]
    NotADirectory {
        /// The offending path.
        path: PathBuf,
    },
}

/// Digests an in-memory payload.
pub fn fingerprint(bytes: &[u8]) -> ContentFingerprint {
    ContentFingerprint::from_digest(&Sha256::digest(bytes))
}

/// Digests everything `reader` yields, in chunks.
pub fn fingerprint_reader(mut reader: impl Read) -> io::Result<ContentFingerprint> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(ContentFingerprint::from_digest(&hasher.finalize()))
}

/// Digests the content of the file at `path`.
pub fn fingerprint_file(path: impl AsRef<Path>) -> Result<ContentFingerprint, FingerprintError> {
    let path = path.as_ref();
    let read_err = |source| FingerprintError::Read {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(read_err)?;
    fingerprint_reader(file).map_err(read_err)
}

/// Digests each file in `paths`, preserving their order.
pub fn fingerprint_files<P: AsRef<Path>>(
    paths: &[P],
) -> Result<Vec<ContentFingerprint>, FingerprintError> {
    paths.iter().map(fingerprint_file).collect()
}

/// Digests a directory tree as a single fingerprint.
///
/// Every regular file beneath `dir` is digested; the per-file hex digests are
/// concatenated in sorted path order and the concatenation is digested again.
/// Renaming a file therefore only changes the result if it changes the sort
/// order. Symbolic links are followed and digested under the link's own
/// path; a link back to an ancestor directory is skipped.
pub fn fingerprint_directory(dir: impl AsRef<Path>) -> Result<ContentFingerprint, FingerprintError> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(FingerprintError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }

    let mut files = collect_files(dir)?;
    files.sort();
    debug!(dir = %dir.display(), files = files.len(), "fingerprinting directory");

    let mut combined = String::with_capacity(files.len() * crate::types::FINGERPRINT_LEN);
    for file in &files {
        combined.push_str(fingerprint_file(file)?.as_str());
    }
    Ok(fingerprint(combined.as_bytes()))
}

fn collect_files(dir: &Path) -> Result<Vec<PathBuf>, FingerprintError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            // A link back to an ancestor directory; its content is already walked.
            Err(e) if e.loop_ancestor().is_some() => {
                debug!(path = ?e.path(), "skipping symlink loop");
                continue;
            }
            Err(e) => {
                let path = e.path().unwrap_or(dir).to_path_buf();
                return Err(FingerprintError::Read {
                    path,
                    source: io::Error::from(e),
                });
            }
        };
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn known_digest_of_empty_input() {
        assert_eq!(
            fingerprint(b"").as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn reader_and_slice_agree() {
        let payload = vec![7u8; READ_CHUNK * 2 + 13];
        assert_eq!(
            fingerprint_reader(payload.as_slice()).unwrap(),
            fingerprint(&payload)
        );
    }

    #[test]
    fn file_digest_matches_content_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.py");
        fs::write(&path, b"print('hello')").unwrap();
        assert_eq!(fingerprint_file(&path).unwrap(), fingerprint(b"print('hello')"));
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = fingerprint_file("/definitely/not/here.txt").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.txt"));
    }

    #[test]
    fn files_keep_declared_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, b"a").unwrap();
        fs::write(&b, b"b").unwrap();
        let digests = fingerprint_files(&[&b, &a]).unwrap();
        assert_eq!(digests, vec![fingerprint(b"b"), fingerprint(b"a")]);
    }

    #[test]
    fn directory_digest_combines_sorted_file_digests() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("z.txt"), b"z").unwrap();
        fs::write(dir.path().join("sub").join("a.txt"), b"a").unwrap();

        let expected = {
            let mut paths = vec![dir.path().join("z.txt"), dir.path().join("sub").join("a.txt")];
            paths.sort();
            let combined: String = paths
                .iter()
                .map(|p| fingerprint(&fs::read(p).unwrap()).to_string())
                .collect();
            fingerprint(combined.as_bytes())
        };
        assert_eq!(fingerprint_directory(dir.path()).unwrap(), expected);
    }

    #[test]
    fn directory_digest_changes_with_content() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("requirements.txt");
        fs::write(&file, b"numpy==1.26").unwrap();
        let before = fingerprint_directory(dir.path()).unwrap();
        fs::write(&file, b"numpy==2.0").unwrap();
        let after = fingerprint_directory(dir.path()).unwrap();
        assert_ne!(before, after);
    }

    #[cfg(unix)]
    #[test]
    fn directory_digest_follows_symlinked_files() {
        let shared = tempfile::tempdir().unwrap();
        let target = shared.path().join("shared.py");
        fs::write(&target, b"X = 1").unwrap();
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.py"), b"import shared").unwrap();
        std::os::unix::fs::symlink(&target, dir.path().join("shared.py")).unwrap();

        let before = fingerprint_directory(dir.path()).unwrap();
        let expected = {
            let mut paths = vec![dir.path().join("main.py"), dir.path().join("shared.py")];
            paths.sort();
            let combined: String = paths
                .iter()
                .map(|p| fingerprint(&fs::read(p).unwrap()).to_string())
                .collect();
            fingerprint(combined.as_bytes())
        };
        assert_eq!(before, expected);

        fs::write(&target, b"X = 2").unwrap();
        assert_ne!(fingerprint_directory(dir.path()).unwrap(), before);
    }

    #[cfg(unix)]
    #[test]
    fn directory_digest_survives_symlink_loop() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("a.txt"), b"a").unwrap();
        let without_loop = fingerprint_directory(dir.path()).unwrap();

        std::os::unix::fs::symlink(dir.path(), dir.path().join("sub").join("back")).unwrap();
        assert_eq!(fingerprint_directory(dir.path()).unwrap(), without_loop);
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlink_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone.py"), dir.path().join("model.py")).unwrap();
        assert!(matches!(
            fingerprint_directory(dir.path()),
            Err(FingerprintError::Read { .. })
        ));
    }

    #[test]
    fn directory_rejects_plain_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            fingerprint_directory(file.path()),
            Err(FingerprintError::NotADirectory { .. })
        ));
    }

    proptest! {
        #[test]
        fn fingerprint_is_deterministic(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            prop_assert_eq!(fingerprint(&bytes), fingerprint(&bytes));
            prop_assert_eq!(fingerprint(&bytes).as_str().len(), 64);
        }

        #[test]
        fn single_byte_change_alters_fingerprint(
            bytes in proptest::collection::vec(any::<u8>(), 1..512),
            index in any::<prop::sample::Index>(),
            delta in 1u8..=255,
        ) {
            let mut changed = bytes.clone();
            let i = index.index(changed.len());
            changed[i] = changed[i].wrapping_add(delta);
            prop_assert_ne!(fingerprint(&bytes), fingerprint(&changed));
        }
    }
}
