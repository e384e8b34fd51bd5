//! Secret-bearing strings that never print their value.

use serde::{Serialize, Serializer};
use std::fmt;

/// Placeholder printed instead of a secret value.
pub const REDACTED: &str = "<retracted>";

/// A string whose `Debug`, `Display` and `Serialize` output is redacted.
///
/// The real value is only reachable through [`RedactedString::expose`].
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct RedactedString(String);

impl RedactedString {
    /// Wraps a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the secret value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for RedactedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("\"\"")
        } else {
            f.write_str(REDACTED)
        }
    }
}

impl fmt::Display for RedactedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            Ok(())
        } else {
            f.write_str(REDACTED)
        }
    }
}

impl Serialize for RedactedString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_never_printed() {
        let secret = RedactedString::new("hunter2");
        assert_eq!(secret.expose(), "hunter2");
        assert_eq!(format!("{secret:?}"), REDACTED);
        assert_eq!(secret.to_string(), REDACTED);
        let json = serde_json::to_string(&secret).expect("serializable");
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn test_empty_value_stays_empty() {
        assert_eq!(RedactedString::default().to_string(), "");
    }
}
