pub mod rpc;
pub mod server;
pub mod task_codec;

pub use rpc::{RpcKey, RpcOutcome, RpcShim, TaskMsgType};
pub use server::Server;
pub use task_codec::{AckMsg, FetchRspMsg, QueryMsg, TaskMsgHeader};
