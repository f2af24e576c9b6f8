use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::error::ErrorMessage;

/// Upper bound on password length, argon2 is deliberately slow
const MAX_PASSWORD_LENGTH: usize = 64;

/// Hash a password with Argon2id and a fresh random salt
///
/// The output is a PHC string (`$argon2id$v=19$m=19456,t=2,p=1$<salt>$<hash>`)
/// that carries its own salt and parameters, so it is the only thing stored in
/// `users.password`. Hashing the same password twice gives different strings.
pub fn hash(password: impl Into<String>) -> Result<String, ErrorMessage> {
    let password = password.into();

    if password.is_empty() {
        return Err(ErrorMessage::EmptyPassword);
    }

    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(ErrorMessage::ExceededMaxPasswordLength(MAX_PASSWORD_LENGTH));
    }

    let salt = SaltString::generate(&mut OsRng);

    let hashed_password = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| ErrorMessage::HashingError)?
        .to_string();

    Ok(hashed_password)
}

/// Check a plain password against a stored PHC hash
///
/// Returns `Ok(false)` on mismatch; `Err` only for unusable input or a
/// corrupted hash.
pub fn compare(password: &str, hashed_password: &str) -> Result<bool, ErrorMessage> {
    if password.is_empty() {
        return Err(ErrorMessage::EmptyPassword);
    }

    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(ErrorMessage::ExceededMaxPasswordLength(MAX_PASSWORD_LENGTH));
    }

    let parsed_hash =
        PasswordHash::new(hashed_password).map_err(|_| ErrorMessage::InvalidHashFormat)?;

    let password_matched = Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok();

    Ok(password_matched)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_compare() {
        let hashed = hash("correct horse").unwrap();
        assert!(hashed.starts_with("$argon2id$"));
        assert!(compare("correct horse", &hashed).unwrap());
        assert!(!compare("battery staple", &hashed).unwrap());
    }

    #[test]
    fn rejects_empty_and_oversized_passwords() {
        assert_eq!(hash(""), Err(ErrorMessage::EmptyPassword));
        let long = "x".repeat(MAX_PASSWORD_LENGTH + 1);
        assert_eq!(
            hash(long),
            Err(ErrorMessage::ExceededMaxPasswordLength(MAX_PASSWORD_LENGTH))
        );
    }

    #[test]
    fn corrupted_hash_is_an_error() {
        assert_eq!(
            compare("whatever", "not-a-phc-string"),
            Err(ErrorMessage::InvalidHashFormat)
        );
    }
}
