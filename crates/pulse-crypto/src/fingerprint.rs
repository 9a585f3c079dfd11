use pulse_types::Blake3Hash;

const FINGERPRINT_CONTEXT: &str = "pulse-v1-article-fingerprint";

/// Content fingerprint of an article: keyed hash of title plus canonical
/// URL. Two sightings of the same (title, url) pair always collide, which
/// is what the ingestion dedup relies on.
pub fn article_fingerprint(title: &str, url: &str) -> Blake3Hash {
    let mut hasher = blake3::Hasher::new_derive_key(FINGERPRINT_CONTEXT);
    hasher.update(title.trim().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.trim().as_bytes());
    Blake3Hash::from_bytes(*hasher.finalize().as_bytes())
}
