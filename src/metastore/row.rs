//! Row shapes and the versioned binary framing used to persist them,
//! grounded on `mndDb.c`'s `mndDbActionEncode`/`mndDbActionDecode` (a
//! schema-version byte, fixed fields, then a reserved forward-compat tail).

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::DbError;
use crate::Result;

/// Size of the forward-compatibility tail appended to every encoded row,
/// mirroring `mndDb.c`'s `SDB_RESERVE_SIZE`-style padding. Decoded but
/// ignored by this version of the store.
pub const RESERVE_TAIL_BYTES: usize = 64;

/// Current on-disk schema version written by this crate. Any other value
/// encountered on decode is rejected with `DataVersionMismatch`.
pub const CURRENT_SCHEMA_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SdbObjectType {
    Database,
    Vgroup,
    User,
    Connection,
}

/// Lifecycle tag carried in every row, matching the original's
/// CREATING/READY/DROPPING/DROPPED/UPDATING status set (mndDefs.h) used to
/// decide whether a torn-write row observed during a scan should be
/// honored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SdbStatus {
    Creating,
    Ready,
    Updating,
    Dropping,
    Dropped,
}

impl SdbStatus {
    fn to_byte(self) -> u8 {
        match self {
            SdbStatus::Creating => 0,
            SdbStatus::Ready => 1,
            SdbStatus::Updating => 2,
            SdbStatus::Dropping => 3,
            SdbStatus::Dropped => 4,
        }
    }

    fn from_byte(b: u8) -> Result<Self> {
        Ok(match b {
            0 => SdbStatus::Creating,
            1 => SdbStatus::Ready,
            2 => SdbStatus::Updating,
            3 => SdbStatus::Dropping,
            4 => SdbStatus::Dropped,
            other => return Err(DbError::DataVersionMismatch(format!("unknown sdb status byte {other}"))),
        })
    }
}

/// One versioned, acquire/release-counted row in the metadata store.
#[derive(Debug, Clone)]
pub struct SdbRow {
    pub obj_type: SdbObjectType,
    pub key: Vec<u8>,
    pub status: SdbStatus,
    pub payload: Vec<u8>,
    ref_count: i32,
}

impl SdbRow {
    pub fn new(obj_type: SdbObjectType, key: Vec<u8>, status: SdbStatus, payload: Vec<u8>) -> Self {
        Self { obj_type, key, status, payload, ref_count: 0 }
    }

    pub fn acquire(&mut self) -> i32 {
        self.ref_count += 1;
        self.ref_count
    }

    pub fn release(&mut self) -> i32 {
        self.ref_count = (self.ref_count - 1).max(0);
        self.ref_count
    }

    pub fn ref_count(&self) -> i32 {
        self.ref_count
    }
}

/// Raw on-disk / on-wire framing of one `SdbRow`: version byte, status
/// byte, key, payload, reserved tail.
#[derive(Debug, Clone)]
pub struct SdbRaw {
    pub bytes: Bytes,
}

impl SdbRaw {
    pub fn encode(row: &SdbRow) -> Self {
        let mut buf = BytesMut::with_capacity(
            2 + 4 + row.key.len() + 4 + row.payload.len() + RESERVE_TAIL_BYTES,
        );
        buf.put_u8(CURRENT_SCHEMA_VERSION);
        buf.put_u8(row.status.to_byte());
        buf.put_u32(row.key.len() as u32);
        buf.put_slice(&row.key);
        buf.put_u32(row.payload.len() as u32);
        buf.put_slice(&row.payload);
        buf.put_bytes(0, RESERVE_TAIL_BYTES);
        Self { bytes: buf.freeze() }
    }

    pub fn decode(&self, obj_type: SdbObjectType) -> Result<SdbRow> {
        let mut buf = self.bytes.clone();
        if buf.remaining() < 2 {
            return Err(DbError::DataVersionMismatch("sdb row too short".into()));
        }
        let version = buf.get_u8();
        if version != CURRENT_SCHEMA_VERSION {
            return Err(DbError::DataVersionMismatch(format!(
                "unsupported sdb row version {version}, expected {CURRENT_SCHEMA_VERSION}"
            )));
        }
        let status = SdbStatus::from_byte(buf.get_u8())?;
        if buf.remaining() < 4 {
            return Err(DbError::DataVersionMismatch("sdb row missing key length".into()));
        }
        let key_len = buf.get_u32() as usize;
        if buf.remaining() < key_len {
            return Err(DbError::DataVersionMismatch("sdb row truncated key".into()));
        }
        let key = buf.copy_to_bytes(key_len).to_vec();
        if buf.remaining() < 4 {
            return Err(DbError::DataVersionMismatch("sdb row missing payload length".into()));
        }
        let payload_len = buf.get_u32() as usize;
        if buf.remaining() < payload_len {
            return Err(DbError::DataVersionMismatch("sdb row truncated payload".into()));
        }
        let payload = buf.copy_to_bytes(payload_len).to_vec();
        // Remaining bytes are the reserved tail; ignored by this version.
        Ok(SdbRow::new(obj_type, key, status, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_round_trips_through_raw() {
        let row = SdbRow::new(
            SdbObjectType::Database,
            b"db1".to_vec(),
            SdbStatus::Ready,
            b"payload".to_vec(),
        );
        let raw = SdbRaw::encode(&row);
        let decoded = raw.decode(SdbObjectType::Database).unwrap();
        assert_eq!(decoded.key, b"db1");
        assert_eq!(decoded.payload, b"payload");
        assert_eq!(decoded.status, SdbStatus::Ready);
    }

    #[test]
    fn unknown_version_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u8(99);
        buf.put_u8(0);
        buf.put_u32(0);
        buf.put_u32(0);
        let raw = SdbRaw { bytes: buf.freeze() };
        assert!(raw.decode(SdbObjectType::Database).is_err());
    }

    #[test]
    fn acquire_release_ref_count() {
        let mut row = SdbRow::new(SdbObjectType::User, vec![1], SdbStatus::Ready, vec![]);
        assert_eq!(row.acquire(), 1);
        assert_eq!(row.acquire(), 2);
        assert_eq!(row.release(), 1);
        assert_eq!(row.release(), 0);
        assert_eq!(row.release(), 0); // never goes negative
    }
}
