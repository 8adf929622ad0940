//! Unique ID generator.

use uuid::Uuid;

/// Generates unique identifiers for various entities.
pub struct IdGenerator;

impl IdGenerator {
    /// Generates a unique alert ID.
    pub fn alert_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Generates a short unique ID (first 8 characters of UUID), used to tag
    /// a single scheduler pass in logs.
    pub fn short_id() -> String {
        Uuid::new_v4().to_string()[..8].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_id_is_unique() {
        let id1 = IdGenerator::alert_id();
        let id2 = IdGenerator::alert_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_short_id_length() {
        let id = IdGenerator::short_id();
        assert_eq!(id.len(), 8);
    }
}
