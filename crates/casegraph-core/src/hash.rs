//! Content digests for dedup keys.

use sha2::{Digest, Sha256};

/// SHA-256 hex digest of `text`. Used as the `(dataset, raw_text_sha256)`
/// dedup key on cases and the per-document `text_sha256`.
pub fn sha256_hex(text: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(text.as_bytes());
  hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
  use super::sha256_hex;

  #[test]
  fn digest_is_stable_hex() {
    let digest = sha256_hex("hello");
    assert_eq!(digest.len(), 64);
    assert_eq!(
      digest,
      "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
    );
  }
}
