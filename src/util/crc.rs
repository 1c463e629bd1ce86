//! CRC helpers

/// CRC32 (IEEE) of a byte slice.
#[inline]
pub fn crc32(data: &[u8]) -> u32 {
  crc32fast::hash(data)
}

/// CRC32 over several slices, as if they were concatenated.
pub fn crc32_parts(parts: &[&[u8]]) -> u32 {
  let mut hasher = crc32fast::Hasher::new();
  for part in parts {
    hasher.update(part);
  }
  hasher.finalize()
}

#[cfg(test)]
mod tests {
  use super::{crc32, crc32_parts};

  #[test]
  fn parts_match_concatenation() {
    assert_eq!(crc32_parts(&[b"ctab", b"les"]), crc32(b"ctables"));
  }
}
