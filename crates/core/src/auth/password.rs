//! Salted password hashing with constant-time verification.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Hex-encoded SHA-256 of `salt || password`.
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex_encode(&hasher.finalize())
}

/// Constant-time comparison against a stored hash.
pub fn verify_password(password: &str, salt: &str, stored_hash: &str) -> bool {
    let computed = hash_password(password, salt);
    computed.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

/// Random per-user salt.
pub fn generate_salt() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_round_trip() {
        let salt = generate_salt();
        let hash = hash_password("hunter2", &salt);
        assert!(verify_password("hunter2", &salt, &hash));
        assert!(!verify_password("hunter3", &salt, &hash));
    }

    #[test]
    fn test_salt_changes_hash() {
        let h1 = hash_password("secret", "salt-a");
        let h2 = hash_password("secret", "salt-b");
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_hash_is_hex() {
        let hash = hash_password("x", "y");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
