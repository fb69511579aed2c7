use crate::core::{DbError, Result};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

lazy_static! {
    /// Five bytes identifying this process, fixed for its lifetime.
    static ref PROCESS_UNIQUE: [u8; 5] = {
        let random = uuid::Uuid::new_v4();
        let bytes = random.as_bytes();
        [bytes[0], bytes[1], bytes[2], bytes[3], bytes[4]]
    };
    static ref COUNTER: AtomicU32 = AtomicU32::new(u32::from_be_bytes({
        let random = uuid::Uuid::new_v4();
        let bytes = random.as_bytes();
        [0, bytes[0], bytes[1], bytes[2]]
    }));
}

/// 12-byte object identifier: 4 bytes of seconds since the epoch, 5 bytes of
/// process-unique randomness and a 3 byte counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    pub fn generate() -> Self {
        let seconds = chrono::Utc::now().timestamp() as u32;
        let counter = COUNTER.fetch_add(1, Ordering::SeqCst) & 0x00FF_FFFF;

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(&*PROCESS_UNIQUE);
        bytes[9..].copy_from_slice(&counter.to_be_bytes()[1..]);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> [u8; 12] {
        self.0
    }

    /// Creation time encoded in the first four bytes.
    pub fn timestamp(&self) -> chrono::DateTime<chrono::Utc> {
        let seconds = u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]);
        chrono::DateTime::from_timestamp(seconds as i64, 0).unwrap_or_default()
    }
}

impl FromStr for ObjectId {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            DbError::TypeMismatch(format!(
                "'{}' is not a valid ObjectId: expected 24 hexadecimal characters",
                s
            ))
        };
        if s.len() != 24 || !s.is_ascii() {
            return Err(invalid());
        }
        let mut bytes = [0u8; 12];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_unique() {
        let a = ObjectId::generate();
        let b = ObjectId::generate();
        assert_ne!(a, b);
        assert_eq!(a.bytes()[4..9], b.bytes()[4..9]);
    }

    #[test]
    fn test_hex_round_trip() {
        let id: ObjectId = "111111111111111111111111".parse().unwrap();
        assert_eq!(id.to_string(), "111111111111111111111111");
        assert_eq!(id.bytes(), [0x11; 12]);
    }

    #[test]
    fn test_rejects_malformed_hex() {
        assert!("1234".parse::<ObjectId>().is_err());
        assert!("zz1111111111111111111111".parse::<ObjectId>().is_err());
    }

    #[test]
    fn test_timestamp_is_recent() {
        let id = ObjectId::generate();
        let age = chrono::Utc::now() - id.timestamp();
        assert!(age.num_seconds() < 60);
    }
}
