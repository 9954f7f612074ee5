use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

const ID_SPACE: u128 = 1_000_000_000_000;

// Identifiers look like `JOB-004821337761`. Only uniqueness matters, the
// prefix is there so humans can tell records apart in logs. Inserts redraw
// on the rare collision.
fn generate(prefix: &str) -> String {
    let n = Uuid::new_v4().as_u128() % ID_SPACE;
    format!("{}-{:012}", prefix, n)
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            pub fn generate() -> Self {
                Self(generate(Self::PREFIX))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Account identifier. Provider profiles share the id of their account.
    AccountId,
    "USR"
);
string_id!(RequestId, "REQ");
string_id!(JobId, "JOB");
string_id!(BidId, "BID");
string_id!(BookingId, "BK");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_carry_prefix_and_digits() {
        let id = JobId::generate();
        let (prefix, digits) = id.as_str().split_once('-').unwrap();
        assert_eq!(prefix, "JOB");
        assert_eq!(digits.len(), 12);
        assert!(digits.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = BookingId::from("BK-12345");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"BK-12345\"");
    }
}
