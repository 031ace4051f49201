//! Fixed-length identifiers for objects written by a load test.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::error::{Error, Result};

/// Length of an [`ObjectId`] in bytes, both in memory and in the persisted pool format.
pub const ID_LENGTH: usize = 18;

/// Identifier of an object in the target store.
///
/// The first 16 bytes carry entropy (usually a random UUID), the last two bytes are reserved and
/// zero for generated identifiers. Identifiers compare byte-wise and render as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId([u8; ID_LENGTH]);

impl ObjectId {
    /// Creates an identifier from its raw bytes.
    pub const fn from_bytes(bytes: [u8; ID_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Creates an identifier from a slice, which must be exactly [`ID_LENGTH`] bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; ID_LENGTH] = bytes.try_into().map_err(|_| {
            Error::invalid(format!(
                "object id must be {ID_LENGTH} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Creates an identifier from a UUID, zero-padding the reserved bytes.
    pub fn from_uuid(uuid: Uuid) -> Self {
        let mut bytes = [0; ID_LENGTH];
        bytes[..16].copy_from_slice(uuid.as_bytes());
        Self(bytes)
    }

    /// Creates a new identifier from a random v4 UUID.
    pub fn random() -> Self {
        Self::from_uuid(Uuid::new_v4())
    }

    /// Returns the raw bytes of this identifier.
    pub fn as_bytes(&self) -> &[u8; ID_LENGTH] {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({self})")
    }
}

impl FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes =
            hex::decode(s).map_err(|err| Error::invalid(format!("invalid object id {s:?}: {err}")))?;
        Self::from_slice(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_layout() {
        let uuid = Uuid::from_u128(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef);
        let id = ObjectId::from_uuid(uuid);

        assert_eq!(&id.as_bytes()[..16], uuid.as_bytes());
        assert_eq!(&id.as_bytes()[16..], &[0, 0]);
        assert_eq!(id.to_string(), "0123456789abcdef0123456789abcdef0000");
    }

    #[test]
    fn parses_hex() {
        let id = ObjectId::random();
        let parsed: ObjectId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);

        assert!("not hex".parse::<ObjectId>().is_err());
        assert!("abcd".parse::<ObjectId>().is_err());
    }

    #[test]
    fn orders_bytewise() {
        let mut low = [0; ID_LENGTH];
        let mut high = [0; ID_LENGTH];
        low[0] = 0x7f;
        high[0] = 0x80;

        assert!(ObjectId::from_bytes(low) < ObjectId::from_bytes(high));
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(matches!(
            ObjectId::from_slice(&[0; 16]),
            Err(Error::InvalidParameter(_))
        ));
    }
}
