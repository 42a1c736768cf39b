//! Streaming SHA-256 content digest.

use crate::core::fs::FileSystem;
use crate::core::record::ContentHash;
use sha2::{Digest, Sha256};
use std::io::{self, Read};
use std::path::Path;

/// Bytes read per chunk
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Digest everything `reader` yields, holding one chunk in memory at a time
pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<ContentHash> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..read]);
    }
    Ok(ContentHash::from_bytes(hasher.finalize().into()))
}

/// Digest a file through the filesystem layer
pub fn hash_file(fs: &dyn FileSystem, path: &Path) -> io::Result<ContentHash> {
    hash_reader(fs.open_read(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fs::LocalFileSystem;
    use std::io::Cursor;
    use tempfile::TempDir;

    #[test]
    fn empty_input_has_well_known_digest() {
        let hash = hash_reader(Cursor::new(Vec::<u8>::new())).unwrap();
        assert_eq!(
            hash.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn multi_chunk_input_matches_one_shot_digest() {
        let data: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        let streamed = hash_reader(Cursor::new(data.clone())).unwrap();
        let expected: [u8; 32] = Sha256::digest(&data).into();
        assert_eq!(streamed.as_bytes(), &expected);
    }

    #[test]
    fn hash_file_reads_through_filesystem() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.jpg");
        std::fs::write(&path, b"abc").unwrap();

        let hash = hash_file(&LocalFileSystem, &path).unwrap();

        assert_eq!(
            hash.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        assert!(hash_file(&LocalFileSystem, &dir.path().join("nope.jpg")).is_err());
    }
}
