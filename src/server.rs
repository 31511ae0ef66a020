//! Peer-to-peer RPC server: the TCP listener side of the wire protocol.
//!
//! One connection carries exactly one request and one response —
//! `Accepted → Reading → Dispatching → Writing → Closed` (§4.9). Each
//! accepted connection gets its own task, mirroring the accept-loop shape
//! of a long-lived transport listener, just without the multiplexing a
//! persistent session needs.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::node::Node;
use crate::wire::{self, Request};

/// A running listener. Dropping or calling [`ServerHandle::stop`] aborts
/// the accept-loop task, which drops the bound listener; handler tasks
/// already in flight are left to finish on their own.
pub struct ServerHandle {
    accept_task: JoinHandle<()>,
    local_addr: std::net::SocketAddr,
}

impl ServerHandle {
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    pub fn stop(&self) {
        self.accept_task.abort();
    }
}

/// Binds a listener on `bind_host`:`node.self_addr().port` and spawns the
/// accept loop.
///
/// The bind host and the node's announced address (`node.self_addr()`,
/// the identity peers use to reach and hash this node) are deliberately
/// distinct per §6.2: a node typically binds `0.0.0.0` to accept on every
/// local interface while announcing a single routable IP to the ring.
pub async fn spawn(node: Arc<Node>, bind_host: &str) -> std::io::Result<ServerHandle> {
    let socket_addr: std::net::SocketAddr = format!("{bind_host}:{}", node.self_addr().port)
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    let listener = TcpListener::bind(socket_addr).await?;
    let local_addr = listener.local_addr()?;

    log::info!("ring node listening: addr={local_addr}");

    let accept_task = tokio::spawn(async move {
        loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    log::error!("accept failed: {e}");
                    continue;
                }
            };

            if let Err(e) = stream.set_nodelay(true) {
                log::warn!("set_nodelay failed for {peer_addr}: {e}");
            }

            let node = node.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(node, stream).await {
                    log::warn!("connection with {peer_addr} ended with error: {e}");
                }
            });
        }
    });

    Ok(ServerHandle {
        accept_task,
        local_addr,
    })
}

async fn handle_connection(node: Arc<Node>, mut stream: TcpStream) -> std::io::Result<()> {
    let frame = match wire::read_frame(&mut stream).await? {
        Some(frame) => frame,
        None => return Ok(()),
    };

    let request: Request = match serde_json::from_value(frame) {
        Ok(request) => request,
        Err(e) => {
            let response = wire::error_response(format!("malformed request: {e}"));
            return wire::write_frame(&mut stream, &response).await;
        }
    };

    let response = dispatch(&node, request).await;
    wire::write_frame(&mut stream, &response).await
}

async fn dispatch(node: &Arc<Node>, request: Request) -> Value {
    let result = dispatch_inner(node, request).await;
    match result {
        Ok(value) => value,
        Err(e) => wire::error_response(e.to_string()),
    }
}

async fn dispatch_inner(node: &Arc<Node>, request: Request) -> crate::error::NodeResult<Value> {
    Ok(match request {
        Request::GetNext => {
            let next = node.state().successor();
            json!({ "next": [next.ip, next.port] })
        }
        Request::SetNext { new_next } => {
            node.state().set_successor(new_next.into());
            wire::success_response()
        }
        Request::GetPrev => {
            let prev = node.state().predecessor();
            json!({ "prev": prev.map(|p| vec![Value::from(p.ip), Value::from(p.port)]) })
        }
        Request::SetPrev { new_prev } => {
            node.state().set_predecessor(Some(new_prev.into()));
            wire::success_response()
        }
        Request::GetId => {
            json!({ "id": node.self_id() })
        }
        Request::FindSuccessor { key, iterations } => {
            let successor = node.find_successor(key, iterations).await?;
            json!({ "successor": [successor.ip, successor.port] })
        }
        Request::Lookup { key, history } => {
            let (value, owner, history) = node.lookup(key, history).await?;
            json!({
                "value": value.unwrap_or_else(|| "Key not found".to_string()),
                "node_address": owner.map(|a| vec![Value::from(a.ip), Value::from(a.port)]),
                "history": history,
            })
        }
        Request::Put { key, value } => {
            node.put(key, value).await?;
            wire::success_response()
        }
        Request::Notify { potential_prev } => {
            node.notify(potential_prev.into());
            wire::success_response()
        }
        Request::Join { potential_prev } => {
            node.join(Some(potential_prev.into())).await?;
            wire::success_response()
        }
        Request::PassData { receiver } => {
            node.pass_data(receiver.into()).await?;
            wire::success_response()
        }
        Request::UpdateData { new_data } => {
            node.state().merge_data(new_data.into_iter().collect());
            wire::success_response()
        }
    })
}
