// Stored value wrapper

use bytes::Bytes;

/// Opaque value held by the keyspace. Every entry goes through this
/// wrapper so new value kinds can be added without touching the dict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataEntity {
    Bytes(Bytes),
}

impl DataEntity {
    pub fn type_name(&self) -> &'static str {
        match self {
            DataEntity::Bytes(_) => "string",
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            DataEntity::Bytes(b) => b,
        }
    }
}

impl From<Vec<u8>> for DataEntity {
    fn from(data: Vec<u8>) -> Self {
        DataEntity::Bytes(Bytes::from(data))
    }
}

impl From<&[u8]> for DataEntity {
    fn from(data: &[u8]) -> Self {
        DataEntity::Bytes(Bytes::copy_from_slice(data))
    }
}
