//! Password hashing and generation.

use bcrypt::DEFAULT_COST;
use rand::Rng;

// base32 alphabet, matching the generated admin password format
const PASSWORD_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Length of generated admin passwords.
pub const GENERATED_PASSWORD_LEN: usize = 12;

/// Hashes a plain password with bcrypt; the digest fits VARCHAR(72).
pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, DEFAULT_COST)
}

/// Verifies a plain password against a stored bcrypt digest.
pub fn verify_password(password: &str, hashed: &str) -> bool {
    bcrypt::verify(password, hashed).unwrap_or(false)
}

/// Generates a random base32 password of the given length.
pub fn generate_password(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| PASSWORD_ALPHABET[rng.gen_range(0..PASSWORD_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let password = "securepassword123";
        let hashed = hash_password(password).unwrap();

        assert!(verify_password(password, &hashed));
        assert!(!verify_password("wrongpassword", &hashed));
    }

    #[test]
    fn test_different_hashes_for_same_password() {
        let password = "securepassword123";
        let first = hash_password(password).unwrap();
        let second = hash_password(password).unwrap();

        // salts differ, both digests verify
        assert_ne!(first, second);
        assert!(verify_password(password, &first));
        assert!(verify_password(password, &second));
    }

    #[test]
    fn test_verify_garbage_hash() {
        assert!(!verify_password("password", "not-a-bcrypt-digest"));
    }

    #[test]
    fn test_generate_password() {
        let password = generate_password(GENERATED_PASSWORD_LEN);
        assert_eq!(password.len(), GENERATED_PASSWORD_LEN);
        assert!(password
            .bytes()
            .all(|b| PASSWORD_ALPHABET.contains(&b)));
    }
}
