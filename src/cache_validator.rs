use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Validates cached analysis records with SHA-256 checksums.
///
/// Cache entries are stored as JSON alongside a checksum computed at insert
/// time; the checksum is re-verified on retrieval and corrupted entries are
/// discarded, forcing a fresh analysis run instead of serving tampered data.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SealedEntry {
    payload: String,
    checksum: String,
}

fn compute_checksum(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    hex::encode(hasher.finalize())
}

/// Serializes `value` with an integrity checksum, ready for cache storage.
pub fn seal<T: Serialize>(value: &T) -> Option<String> {
    let payload = serde_json::to_string(value).ok()?;
    let entry = SealedEntry {
        checksum: compute_checksum(&payload),
        payload,
    };
    serde_json::to_string(&entry).ok()
}

/// Verifies and deserializes a sealed cache entry.
///
/// Returns `None` when the entry is not valid JSON or its checksum does not
/// match; the caller treats that as a cache miss.
pub fn open<T: DeserializeOwned>(serialized: &str) -> Option<T> {
    let entry: SealedEntry = serde_json::from_str(serialized).ok()?;

    if compute_checksum(&entry.payload) != entry.checksum {
        tracing::warn!(
            "Cache validation failed: checksum mismatch (payload length {})",
            entry.payload.len()
        );
        return None;
    }

    serde_json::from_str(&entry.payload).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn seal_then_open_round_trips() {
        let value = json!({"phone_number": "+14158586273", "risk_score": 12.5});
        let sealed = seal(&value).unwrap();

        let opened: serde_json::Value = open(&sealed).unwrap();
        assert_eq!(opened, value);
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let value = json!({"risk_level": "MINIMAL"});
        let sealed = seal(&value).unwrap();

        let tampered = sealed.replace("MINIMAL", "CRITICAL");
        assert_eq!(open::<serde_json::Value>(&tampered), None);
    }

    #[test]
    fn garbage_input_is_rejected() {
        assert_eq!(open::<serde_json::Value>("not json at all"), None);
        assert_eq!(open::<serde_json::Value>("{}"), None);
    }

    #[test]
    fn checksum_is_deterministic() {
        let value = json!({"a": 1});
        assert_eq!(seal(&value), seal(&value));
    }
}
