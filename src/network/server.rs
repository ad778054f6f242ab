//! Per-vnode task-protocol listener (C7's network front door), grounded on
//! the teacher's `tokio`-accept-loop `Server`/`ConnectionHandler` shape but
//! carrying SPEC_FULL.md §6.1's task messages instead of a generic SQL
//! request/response pair. One [`Server`] owns one [`QueryWorker`] and
//! dispatches each connection's framed messages into it; the scheduler
//! reaches this listener through `network::rpc`/`network::task_codec` on
//! the sending side (low-level connection pooling and transport concerns
//! are out of scope per SPEC_FULL.md §1).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::error::DbError;
use crate::network::task_codec::{AckMsg, FetchRspMsg, QueryMsg, TaskMsgHeader};
use crate::query_worker::{QueryWorker, WorkerTaskKey};
use crate::Result;

/// Maximum concurrent connections to prevent resource exhaustion.
pub const MAX_CONCURRENT_CONNECTIONS: usize = 10_000;

/// Message tags on the wire, one byte ahead of each frame's length+body,
/// mirroring `network::rpc::TaskMsgType`'s request-side variants.
const TAG_QUERY: u8 = 1;
const TAG_READY: u8 = 3;
const TAG_FETCH: u8 = 5;
const TAG_DROP_TASK: u8 = 7;

/// The vnode-side task-protocol server.
pub struct Server {
    worker: Arc<QueryWorker>,
    active_connections: Arc<AtomicUsize>,
}

impl Server {
    pub fn new() -> Self {
        Self { worker: Arc::new(QueryWorker::new()), active_connections: Arc::new(AtomicUsize::new(0)) }
    }

    pub async fn run(&self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr).await.map_err(|e| DbError::Network(e.to_string()))?;
        tracing::info!("query-worker listening on {}", addr);

        loop {
            let (socket, peer) = listener.accept().await.map_err(|e| DbError::Network(e.to_string()))?;

            let current = self.active_connections.load(Ordering::Relaxed);
            if current >= MAX_CONCURRENT_CONNECTIONS {
                tracing::warn!("connection limit reached ({current}/{MAX_CONCURRENT_CONNECTIONS}), rejecting {peer}");
                continue;
            }
            self.active_connections.fetch_add(1, Ordering::Relaxed);

            let worker = self.worker.clone();
            let active_connections = self.active_connections.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(socket, worker).await {
                    tracing::error!("connection from {peer} ended with error: {e}");
                }
                active_connections.fetch_sub(1, Ordering::Relaxed);
            });
        }
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

async fn handle_connection(mut socket: TcpStream, worker: Arc<QueryWorker>) -> Result<()> {
    loop {
        let mut tag_buf = [0u8; 1];
        match socket.read_exact(&mut tag_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(DbError::Network(e.to_string())),
        }

        let mut len_buf = [0u8; 4];
        socket.read_exact(&mut len_buf).await.map_err(|e| DbError::Network(e.to_string()))?;
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut body = vec![0u8; len];
        socket.read_exact(&mut body).await.map_err(|e| DbError::Network(e.to_string()))?;

        let response = dispatch_message(&worker, tag_buf[0], Bytes::from(body))?;
        socket
            .write_all(&(response.len() as u32).to_be_bytes())
            .await
            .map_err(|e| DbError::Network(e.to_string()))?;
        socket.write_all(&response).await.map_err(|e| DbError::Network(e.to_string()))?;
    }
}

fn worker_key(header: &TaskMsgHeader) -> WorkerTaskKey {
    WorkerTaskKey { query_id: header.query_id, task_id: header.task_id }
}

fn dispatch_message(worker: &QueryWorker, tag: u8, mut body: Bytes) -> Result<Bytes> {
    match tag {
        TAG_QUERY => {
            let msg = QueryMsg::decode(body)?;
            let key = worker_key(&msg.header);
            let code = if worker.on_query(key).is_ok() { 0 } else { -1 };
            Ok(AckMsg { header: msg.header, code }.encode())
        }
        TAG_READY => {
            let header = TaskMsgHeader::decode(&mut body)?;
            let code = if worker.on_ready(worker_key(&header)).is_ok() { 0 } else { -1 };
            Ok(AckMsg { header, code }.encode())
        }
        TAG_FETCH => {
            let header = TaskMsgHeader::decode(&mut body)?;
            let key = worker_key(&header);
            match worker.fetch_block(key) {
                Ok(out) => {
                    let data = match &out.block {
                        Some(block) => bincode::encode_to_vec(block, bincode::config::standard())
                            .map_err(|e| DbError::Serialization(e.to_string()))?,
                        None => Vec::new(),
                    };
                    let num_rows = out.block.as_ref().map(|b| b.row_count as u32).unwrap_or(0);
                    Ok(FetchRspMsg {
                        header,
                        code: 0,
                        num_rows,
                        completed: out.query_end,
                        data: Bytes::from(data),
                    }
                    .encode())
                }
                Err(_) => Ok(FetchRspMsg {
                    header,
                    code: -1,
                    num_rows: 0,
                    completed: true,
                    data: Bytes::new(),
                }
                .encode()),
            }
        }
        TAG_DROP_TASK => {
            let header = TaskMsgHeader::decode(&mut body)?;
            let code = if worker.on_drop(worker_key(&header)).is_ok() { 0 } else { -1 };
            Ok(AckMsg { header, code }.encode())
        }
        other => Err(DbError::Network(format!("unknown task message tag {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hdr(query_id: u64, task_id: u64) -> TaskMsgHeader {
        TaskMsgHeader { vgroup_id: 1, schedule_id: 1, query_id, task_id }
    }

    #[test]
    fn query_then_drop_round_trip() {
        let worker = QueryWorker::new();
        let msg = QueryMsg { header: hdr(1, 1), task_type: 1, sub_plan: Bytes::from_static(b"plan") };
        let resp = dispatch_message(&worker, TAG_QUERY, msg.encode()).unwrap();
        let ack = AckMsg::decode(resp).unwrap();
        assert_eq!(ack.code, 0);

        let mut drop_body = bytes::BytesMut::new();
        hdr(1, 1).encode(&mut drop_body);
        let resp = dispatch_message(&worker, TAG_DROP_TASK, drop_body.freeze()).unwrap();
        let ack = AckMsg::decode(resp).unwrap();
        assert_eq!(ack.code, 0);
    }

    #[test]
    fn unknown_tag_errors() {
        let worker = QueryWorker::new();
        assert!(dispatch_message(&worker, 99, Bytes::new()).is_err());
    }
}
