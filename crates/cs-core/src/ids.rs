//! Typed identifiers.
//!
//! Media are addressed by a short random token that appears in share links.
//! Jobs and variants use the integer row id assigned by the store.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// RFC 4648 base32 alphabet used for media tokens.
const MEDIA_ID_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Length of a media token (40 random bits).
pub const MEDIA_ID_LEN: usize = 8;

/// Short random identifier for an uploaded media asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaId(String);

impl MediaId {
    /// Generate a fresh random token.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let token = (0..MEDIA_ID_LEN)
            .map(|_| MEDIA_ID_ALPHABET[rng.gen_range(0..MEDIA_ID_ALPHABET.len())] as char)
            .collect();
        Self(token)
    }

    /// Borrow the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MediaId {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let valid = s.len() == MEDIA_ID_LEN && s.bytes().all(|b| MEDIA_ID_ALPHABET.contains(&b));
        if !valid {
            return Err(Error::Validation(format!("invalid media id: {s:?}")));
        }
        Ok(Self(s.to_string()))
    }
}

impl AsRef<str> for MediaId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Generate a newtype wrapper over an integer row id.
///
/// The macro produces a struct with:
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`, `Ord`, `Serialize`, `Deserialize`
/// - `Display` and `FromStr` delegating to the inner `i64`
/// - `From<i64>` and `Into<i64>` conversions
macro_rules! row_id {
    ($($(#[doc = $doc:expr])* $name:ident),+ $(,)?) => {
        $(
            $(#[doc = $doc])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(i64);

            impl $name {
                /// Return the inner row id.
                #[must_use]
                pub fn get(self) -> i64 {
                    self.0
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl FromStr for $name {
                type Err = std::num::ParseIntError;

                fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                    s.parse::<i64>().map(Self)
                }
            }

            impl From<i64> for $name {
                fn from(id: i64) -> Self {
                    Self(id)
                }
            }

            impl From<$name> for i64 {
                fn from(id: $name) -> Self {
                    id.0
                }
            }
        )+
    };
}

row_id! {
    /// Identifier of a queued unit of work.
    JobId,
    /// Identifier of a per-codec conversion output.
    VariantId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_media_ids_are_valid_tokens() {
        for _ in 0..100 {
            let id = MediaId::generate();
            assert_eq!(id.as_str().len(), MEDIA_ID_LEN);
            let parsed: MediaId = id.as_str().parse().unwrap();
            assert_eq!(parsed, id);
        }
    }

    #[test]
    fn generated_media_ids_differ() {
        assert_ne!(MediaId::generate(), MediaId::generate());
    }

    #[test]
    fn media_id_rejects_bad_input() {
        assert!("".parse::<MediaId>().is_err());
        assert!("abcdefgh".parse::<MediaId>().is_err());
        assert!("ABCDEFG1".parse::<MediaId>().is_err());
        assert!("ABCDEFGHI".parse::<MediaId>().is_err());
        assert!("ABCD2345".parse::<MediaId>().is_ok());
    }

    #[test]
    fn row_id_display_and_parse() {
        let id = JobId::from(42);
        assert_eq!(id.to_string(), "42");
        assert_eq!("42".parse::<JobId>().unwrap(), id);
        assert_eq!(i64::from(VariantId::from(7)), 7);
    }

    #[test]
    fn serde_is_transparent() {
        let json = serde_json::to_string(&JobId::from(3)).unwrap();
        assert_eq!(json, "3");
        let json = serde_json::to_string(&"ABCD2345".parse::<MediaId>().unwrap()).unwrap();
        assert_eq!(json, "\"ABCD2345\"");
    }
}
