use sha1::{Digest, Sha1};

/// Derive the stable memory identity for a chat.
///
/// Format: `<prefix>-<first 8 bytes of SHA-1(chat_id) in hex>`. Equal chat
/// ids always yield the same memory identity; distinct chat ids almost
/// certainly differ. Used as the scheduler lock key, the memory-recall key,
/// and the `user_id` dimension of the plan-review store.
pub fn memory_identity(prefix: &str, chat_id: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(chat_id.as_bytes());
    let digest = hasher.finalize();
    format!("{prefix}-{}", hex::encode(&digest[..8]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_for_equal_chat_ids() {
        let a = memory_identity("lark", "oc_1");
        let b = memory_identity("lark", "oc_1");
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_for_distinct_chat_ids() {
        let a = memory_identity("lark", "oc_1");
        let b = memory_identity("lark", "oc_2");
        assert_ne!(a, b);
    }

    #[test]
    fn matches_expected_prefix_and_length() {
        let id = memory_identity("lark", "oc_1");
        assert!(id.starts_with("lark-"));
        // 8 bytes -> 16 hex chars
        assert_eq!(id.len(), "lark-".len() + 16);
    }
}
