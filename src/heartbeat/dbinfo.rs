//! DB-info heartbeat payload codec and handler, grounded on SPEC_FULL.md
//! §4.8 / original `clientHb.c` `hbProcessDBInfoRsp`/`hbGetExpiredDBInfo`.
//!
//! Wire shape (big-endian, per §6.1's general convention): a `u32` count of
//! entries, then per entry `(db-name, uid, vgVersion, vgNum,
//! {vgId, hashRange, epset}+)`.

use std::net::SocketAddr;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::catalog::{Catalog, DbVgroupLayout, EndpointSet, VgroupInfo};
use crate::error::DbError;
use crate::Result;

fn put_str(buf: &mut BytesMut, s: &str) {
    buf.put_u16(s.len() as u16);
    buf.put_slice(s.as_bytes());
}

fn get_str(buf: &mut Bytes) -> Result<String> {
    if buf.remaining() < 2 {
        return Err(DbError::Network("truncated db-info string length".into()));
    }
    let len = buf.get_u16() as usize;
    if buf.remaining() < len {
        return Err(DbError::Network("truncated db-info string body".into()));
    }
    let bytes = buf.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec()).map_err(|e| DbError::Network(e.to_string()))
}

/// Encode one connection's DB-version deltas into the wire payload
/// attached to a heartbeat request, listing entries the gather pass
/// believes are expired (§4.8 step 2).
pub fn encode_db_info_entries(entries: &[DbVgroupLayout]) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u32(entries.len() as u32);
    for entry in entries {
        put_str(&mut buf, &entry.db_name);
        buf.put_u64(entry.db_uid);
        buf.put_i32(entry.vgroup_version);
        buf.put_u32(entry.vgroups.len() as u32);
        for vg in &entry.vgroups {
            buf.put_i32(vg.vgroup_id);
            buf.put_u32(vg.hash_begin);
            buf.put_u32(vg.hash_end);
            buf.put_u32(vg.epset.endpoints.len() as u32);
            for ep in &vg.epset.endpoints {
                put_str(&mut buf, &ep.to_string());
            }
        }
    }
    buf.freeze()
}

/// Decode a DB-info response payload into the layouts it carries.
pub fn decode_db_info_entries(mut buf: Bytes) -> Result<Vec<DbVgroupLayout>> {
    if buf.remaining() < 4 {
        return Err(DbError::Network("truncated db-info entry count".into()));
    }
    let count = buf.get_u32() as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let db_name = get_str(&mut buf)?;
        if buf.remaining() < 8 + 4 + 4 {
            return Err(DbError::Network("truncated db-info header fields".into()));
        }
        let db_uid = buf.get_u64();
        let vgroup_version = buf.get_i32();
        let vg_num = buf.get_u32() as usize;
        let mut vgroups = Vec::with_capacity(vg_num);
        for _ in 0..vg_num {
            if buf.remaining() < 4 + 4 + 4 + 4 {
                return Err(DbError::Network("truncated vgroup entry".into()));
            }
            let vgroup_id = buf.get_i32();
            let hash_begin = buf.get_u32();
            let hash_end = buf.get_u32();
            let ep_count = buf.get_u32() as usize;
            let mut endpoints = Vec::with_capacity(ep_count);
            for _ in 0..ep_count {
                let addr_str = get_str(&mut buf)?;
                let addr: SocketAddr =
                    addr_str.parse().map_err(|_| DbError::Network(format!("invalid endpoint {addr_str}")))?;
                endpoints.push(addr);
            }
            vgroups.push(VgroupInfo { vgroup_id, hash_begin, hash_end, epset: EndpointSet { endpoints } });
        }
        out.push(DbVgroupLayout { db_name, db_uid, vgroup_version, vgroups });
    }
    Ok(out)
}

/// Apply a decoded DB-info response to the catalog: each entry atomically
/// replaces (or, if `vgroup_version < 0`, removes) that DB's cached
/// layout, per §4.8's handler contract.
pub fn apply_db_info(catalog: &Catalog, entries: Vec<DbVgroupLayout>) {
    for entry in entries {
        catalog.vgroups().apply(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DbVgroupLayout {
        DbVgroupLayout {
            db_name: "d1".into(),
            db_uid: 7,
            vgroup_version: 3,
            vgroups: vec![VgroupInfo {
                vgroup_id: 1,
                hash_begin: 0,
                hash_end: 100,
                epset: EndpointSet { endpoints: vec!["127.0.0.1:6030".parse().unwrap()] },
            }],
        }
    }

    #[test]
    fn round_trips_db_info_entries() {
        let encoded = encode_db_info_entries(&[sample()]);
        let decoded = decode_db_info_entries(encoded).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].db_name, "d1");
        assert_eq!(decoded[0].vgroups[0].vgroup_id, 1);
    }

    #[test]
    fn apply_updates_catalog_and_negative_version_removes() {
        let catalog = Catalog::new();
        apply_db_info(&catalog, vec![sample()]);
        assert!(catalog.vgroups().get("d1").is_some());

        let mut dropped = sample();
        dropped.vgroup_version = -1;
        apply_db_info(&catalog, vec![dropped]);
        assert!(catalog.vgroups().get("d1").is_none());
    }
}
