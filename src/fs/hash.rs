use sha2::{Digest, Sha256};

/// SHA-256 over a node's logical content, fed block slice by block slice.
pub fn content_sha256<'a, I>(chunks: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut hasher = Sha256::new();
    for chunk in chunks {
        hasher.update(chunk);
    }
    hasher.finalize().to_vec()
}

/// Format a hash as a hex string.
pub fn hash_hex(hash: &[u8]) -> String {
    hash.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunking_does_not_change_the_digest() {
        let whole = content_sha256([b"hello world".as_slice()]);
        let split = content_sha256([b"hello ".as_slice(), b"world".as_slice()]);
        assert_eq!(whole, split);
        // Well-known digest of "hello world".
        assert_eq!(
            hash_hex(&whole),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn empty_content_digest() {
        assert_eq!(
            hash_hex(&content_sha256(std::iter::empty::<&[u8]>())),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
