use blake3::Hasher;

/// Canonical form of question text used for content addressing.
///
/// Keeps letters and whitespace only, lowercases, and trims. Two questions that differ
/// only in punctuation, digits, or case share an embedding record.
pub fn normalize_question_text(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphabetic() || c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect::<String>()
        .trim()
        .to_string()
}

/// BLAKE3 hex digest of already-normalized text.
#[inline]
pub fn hash_normalized(normalized: &str) -> String {
    blake3::hash(normalized.as_bytes()).to_hex().to_string()
}

/// Normalizes `text` and returns its embedding hash.
#[inline]
pub fn hash_question_text(text: &str) -> String {
    hash_normalized(&normalize_question_text(text))
}

/// Stable document key for a cache entry.
///
/// Used as the file stem by the file store, so it must not change across releases.
#[inline]
pub fn hash_unit_key(unit_id: &str, unit_name: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(&(unit_id.len() as u64).to_le_bytes());
    hasher.update(unit_id.as_bytes());
    hasher.update(unit_name.to_lowercase().as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// First 8 bytes of a BLAKE3 hash as a little-endian `u64`.
#[inline]
pub fn hash_to_u64(data: &[u8]) -> u64 {
    let hash = blake3::hash(data);
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[0..8]);
    u64::from_le_bytes(bytes)
}
