//! Database and registry identity generation.

use uuid::Uuid;

/// Generate a globally-unique database name from a caller-supplied key.
///
/// The name is `DB<key>_<32 hex chars>`; the suffix is a freshly drawn
/// 128-bit value, so two calls never collide in practice, even for the
/// same key.
///
/// # Examples
///
/// ```
/// let name = scratchdb::ident::database_name("unit");
/// assert!(name.starts_with("DBunit_"));
/// ```
pub fn database_name(key: &str) -> String {
    format!("DB{}_{}", key, Uuid::new_v4().simple())
}

/// A fresh 32-character lowercase hex string (128 bits of randomness).
///
/// Used for registry file names, which share the collision-resistance
/// requirement of database names.
pub(crate) fn random_hex() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_name_format() {
        let name = database_name("unit");
        assert!(name.starts_with("DBunit_"), "name should start with DBunit_");

        let suffix = name.strip_prefix("DBunit_").unwrap();
        assert_eq!(suffix.len(), 32);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_empty_key() {
        let name = database_name("");
        assert!(name.starts_with("DB_"));
        assert_eq!(name.len(), "DB_".len() + 32);
    }

    #[test]
    fn test_names_are_distinct() {
        assert_ne!(database_name("a"), database_name("a"));
        assert_ne!(database_name("a"), database_name("b"));
    }

    #[test]
    fn test_random_hex() {
        let hex = random_hex();
        assert_eq!(hex.len(), 32);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(hex, random_hex());
    }
}
