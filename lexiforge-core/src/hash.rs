use sha2::{Digest, Sha256};

/// SHA-256 hex digest over `parts`, separated so that ("ab", "c") and
/// ("a", "bc") never collide.
pub fn fingerprint<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for (index, part) in parts.into_iter().enumerate() {
        if index > 0 {
            hasher.update([0x1f]);
        }
        hasher.update(part.as_ref().as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Short, log-safe identifier for a prompt.
pub fn prompt_hash(prompt: &str) -> String {
    let mut digest = fingerprint([prompt]);
    digest.truncate(12);
    digest
}
