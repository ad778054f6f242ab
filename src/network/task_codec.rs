//! On-wire framing for task protocol messages (QUERY, READY, FETCH,
//! DROP-TASK and their responses), per SPEC_FULL.md §6.1.
//!
//! All integer fields are big-endian; string fields are length-prefixed
//! with a `u16` byte count. This mirrors the original `query.h` message
//! headers (`vgId`/`sId`/`queryId`/`taskId` framing) rather than using the
//! crate's internal `serde`/`bincode` representation, which is reserved for
//! structures that never cross the wire in this form (see SPEC_FULL.md
//! §1.1 on serialization).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::DbError;
use crate::Result;

/// Common header present on every task-protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskMsgHeader {
    pub vgroup_id: i32,
    pub schedule_id: u64,
    pub query_id: u64,
    pub task_id: u64,
}

impl TaskMsgHeader {
    pub const WIRE_LEN: usize = 4 + 8 + 8 + 8;

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32(self.vgroup_id);
        buf.put_u64(self.schedule_id);
        buf.put_u64(self.query_id);
        buf.put_u64(self.task_id);
    }

    pub fn decode(buf: &mut Bytes) -> Result<Self> {
        if buf.remaining() < Self::WIRE_LEN {
            return Err(DbError::Network("truncated task message header".into()));
        }
        Ok(Self {
            vgroup_id: buf.get_i32(),
            schedule_id: buf.get_u64(),
            query_id: buf.get_u64(),
            task_id: buf.get_u64(),
        })
    }
}

fn put_bytes_field(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u32(data.len() as u32);
    buf.put_slice(data);
}

fn get_bytes_field(buf: &mut Bytes) -> Result<Bytes> {
    if buf.remaining() < 4 {
        return Err(DbError::Network("truncated length-prefixed field".into()));
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(DbError::Network("truncated length-prefixed field body".into()));
    }
    Ok(buf.copy_to_bytes(len))
}

/// QUERY request: dispatches a serialized sub-plan to a target vnode.
#[derive(Debug, Clone)]
pub struct QueryMsg {
    pub header: TaskMsgHeader,
    pub task_type: u8,
    pub sub_plan: Bytes,
}

impl QueryMsg {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(TaskMsgHeader::WIRE_LEN + 5 + self.sub_plan.len());
        self.header.encode(&mut buf);
        buf.put_u8(self.task_type);
        put_bytes_field(&mut buf, &self.sub_plan);
        buf.freeze()
    }

    pub fn decode(mut bytes: Bytes) -> Result<Self> {
        let header = TaskMsgHeader::decode(&mut bytes)?;
        if bytes.remaining() < 1 {
            return Err(DbError::Network("truncated query message".into()));
        }
        let task_type = bytes.get_u8();
        let sub_plan = get_bytes_field(&mut bytes)?;
        Ok(Self { header, task_type, sub_plan })
    }
}

/// Status-only response shared by QUERY-RSP, READY-RSP, and DROP-TASK-RSP.
#[derive(Debug, Clone, Copy)]
pub struct AckMsg {
    pub header: TaskMsgHeader,
    pub code: i32,
}

impl AckMsg {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(TaskMsgHeader::WIRE_LEN + 4);
        self.header.encode(&mut buf);
        buf.put_i32(self.code);
        buf.freeze()
    }

    pub fn decode(mut bytes: Bytes) -> Result<Self> {
        let header = TaskMsgHeader::decode(&mut bytes)?;
        if bytes.remaining() < 4 {
            return Err(DbError::Network("truncated ack message".into()));
        }
        Ok(Self { header, code: bytes.get_i32() })
    }
}

/// FETCH response: one columnar data block plus completion status.
#[derive(Debug, Clone)]
pub struct FetchRspMsg {
    pub header: TaskMsgHeader,
    pub code: i32,
    pub num_rows: u32,
    pub completed: bool,
    pub data: Bytes,
}

impl FetchRspMsg {
    pub fn encode(&self) -> Bytes {
        let mut buf =
            BytesMut::with_capacity(TaskMsgHeader::WIRE_LEN + 4 + 4 + 1 + 4 + self.data.len());
        self.header.encode(&mut buf);
        buf.put_i32(self.code);
        buf.put_u32(self.num_rows);
        buf.put_u8(self.completed as u8);
        put_bytes_field(&mut buf, &self.data);
        buf.freeze()
    }

    pub fn decode(mut bytes: Bytes) -> Result<Self> {
        let header = TaskMsgHeader::decode(&mut bytes)?;
        if bytes.remaining() < 9 {
            return Err(DbError::Network("truncated fetch response".into()));
        }
        let code = bytes.get_i32();
        let num_rows = bytes.get_u32();
        let completed = bytes.get_u8() != 0;
        let data = get_bytes_field(&mut bytes)?;
        Ok(Self { header, code, num_rows, completed, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hdr() -> TaskMsgHeader {
        TaskMsgHeader { vgroup_id: 7, schedule_id: 1, query_id: 42, task_id: 3 }
    }

    #[test]
    fn query_msg_round_trips() {
        let msg = QueryMsg { header: hdr(), task_type: 1, sub_plan: Bytes::from_static(b"plan") };
        let decoded = QueryMsg::decode(msg.encode()).unwrap();
        assert_eq!(decoded.header, hdr());
        assert_eq!(decoded.task_type, 1);
        assert_eq!(decoded.sub_plan, Bytes::from_static(b"plan"));
    }

    #[test]
    fn fetch_rsp_round_trips() {
        let msg = FetchRspMsg {
            header: hdr(),
            code: 0,
            num_rows: 10,
            completed: true,
            data: Bytes::from_static(b"rows"),
        };
        let decoded = FetchRspMsg::decode(msg.encode()).unwrap();
        assert_eq!(decoded.num_rows, 10);
        assert!(decoded.completed);
        assert_eq!(decoded.data, Bytes::from_static(b"rows"));
    }

    #[test]
    fn truncated_header_errors() {
        let bytes = Bytes::from_static(b"short");
        assert!(QueryMsg::decode(bytes).is_err());
    }
}
