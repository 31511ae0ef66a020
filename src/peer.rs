//! Uniform peer handle: one operation set, two implementations.
//!
//! [`PeerRef`] is either [`PeerRef::Local`], a direct handle into this
//! process's [`crate::node::Node`], or [`PeerRef::Remote`], an address
//! reachable only over the wire. Routing code in [`crate::node`] is
//! written against `PeerRef` and is oblivious to which one it holds —
//! the same pattern the spec's design notes call out for modeling the
//! source's subclass-based dispatch as a small capability interface.
//!
//! A `PeerRef` is always compared and identified by its [`Address`], even
//! across the Local/Remote boundary — a node may legitimately hold a
//! `Remote` handle whose address happens to be its own.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::address::Address;
use crate::error::{NodeError, NodeResult};
use crate::id::Id;
use crate::node::Node;
use crate::wire::{self, Request};

/// Default per-call timeout applied to the connect+send+recv triple of a
/// remote RPC.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub enum PeerRef {
    Local(Arc<Node>),
    Remote(RemotePeer),
}

impl PeerRef {
    pub fn local(node: Arc<Node>) -> Self {
        PeerRef::Local(node)
    }

    pub fn remote(addr: Address, timeout: Duration) -> Self {
        PeerRef::Remote(RemotePeer::new(addr, timeout))
    }

    pub fn address(&self) -> Address {
        match self {
            PeerRef::Local(node) => node.self_addr().clone(),
            PeerRef::Remote(r) => r.addr.clone(),
        }
    }

    pub fn id(&self) -> Id {
        match self {
            PeerRef::Local(node) => node.self_id(),
            PeerRef::Remote(r) => r.addr.id(),
        }
    }

    pub async fn get_successor(&self) -> NodeResult<Address> {
        match self {
            PeerRef::Local(node) => Ok(node.state().successor()),
            PeerRef::Remote(r) => r.get_successor().await,
        }
    }

    pub async fn set_successor(&self, addr: Address) -> NodeResult<()> {
        match self {
            PeerRef::Local(node) => {
                node.state().set_successor(addr);
                Ok(())
            }
            PeerRef::Remote(r) => r.set_successor(addr).await,
        }
    }

    pub async fn get_predecessor(&self) -> NodeResult<Option<Address>> {
        match self {
            PeerRef::Local(node) => Ok(node.state().predecessor()),
            PeerRef::Remote(r) => r.get_predecessor().await,
        }
    }

    pub async fn set_predecessor(&self, addr: Address) -> NodeResult<()> {
        match self {
            PeerRef::Local(node) => {
                node.state().set_predecessor(Some(addr));
                Ok(())
            }
            PeerRef::Remote(r) => r.set_predecessor(addr).await,
        }
    }

    pub async fn find_successor(&self, key_id: Id, depth: u32) -> NodeResult<Address> {
        match self {
            PeerRef::Local(node) => node.find_successor(key_id, depth).await,
            PeerRef::Remote(r) => r.find_successor(key_id, depth).await,
        }
    }

    pub async fn notify(&self, candidate: Address) -> NodeResult<()> {
        match self {
            PeerRef::Local(node) => {
                node.notify(candidate);
                Ok(())
            }
            PeerRef::Remote(r) => r.notify(candidate).await,
        }
    }

    pub async fn put(&self, key: String, value: String) -> NodeResult<()> {
        match self {
            PeerRef::Local(node) => node.put(key, value).await,
            PeerRef::Remote(r) => r.put(key, value).await,
        }
    }

    pub async fn lookup(
        &self,
        key: String,
        history: Vec<String>,
    ) -> NodeResult<(Option<String>, Option<Address>, Vec<String>)> {
        match self {
            PeerRef::Local(node) => node.lookup(key, history).await,
            PeerRef::Remote(r) => r.lookup(key, history).await,
        }
    }

    pub async fn pass_data(&self, receiver: Address) -> NodeResult<()> {
        match self {
            PeerRef::Local(node) => node.pass_data(receiver).await,
            PeerRef::Remote(r) => r.pass_data(receiver).await,
        }
    }

    pub async fn update_data(&self, data: HashMap<String, String>) -> NodeResult<()> {
        match self {
            PeerRef::Local(node) => {
                node.state().merge_data(data.into_iter().collect());
                Ok(())
            }
            PeerRef::Remote(r) => r.update_data(data).await,
        }
    }

    pub async fn join(&self, bootstrap: Option<Address>) -> NodeResult<()> {
        match self {
            PeerRef::Local(node) => node.join(bootstrap).await,
            PeerRef::Remote(r) => r.join(bootstrap).await,
        }
    }
}

/// A peer reachable only by opening a fresh TCP connection per call.
#[derive(Clone)]
pub struct RemotePeer {
    pub addr: Address,
    pub timeout: Duration,
}

impl RemotePeer {
    pub fn new(addr: Address, timeout: Duration) -> Self {
        Self { addr, timeout }
    }

    async fn call(&self, request: Request) -> NodeResult<serde_json::Value> {
        let fut = self.call_inner(request);
        match timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(NodeError::Timeout(self.timeout)),
        }
    }

    async fn call_inner(&self, request: Request) -> NodeResult<serde_json::Value> {
        let socket_addr = self
            .addr
            .socket_addr()
            .map_err(|e| NodeError::InvalidInput(e.to_string()))?;

        let mut stream = TcpStream::connect(socket_addr)
            .await
            .map_err(|e| NodeError::PeerUnreachable(format!("{}: {e}", self.addr)))?;

        let body = serde_json::to_value(&request)
            .map_err(|e| NodeError::ProtocolError(e.to_string()))?;

        wire::write_frame(&mut stream, &body)
            .await
            .map_err(|e| NodeError::PeerUnreachable(e.to_string()))?;

        let response = wire::read_frame(&mut stream)
            .await
            .map_err(|e| NodeError::ProtocolError(e.to_string()))?
            .ok_or_else(|| NodeError::ProtocolError("empty response".into()))?;

        if let Some(reason) = response.get("error").and_then(|v| v.as_str()) {
            return Err(NodeError::ProtocolError(reason.to_string()));
        }

        Ok(response)
    }

    fn extract_addr(value: &serde_json::Value, field: &str) -> NodeResult<Address> {
        let pair = value
            .get(field)
            .and_then(|v| v.as_array())
            .ok_or_else(|| NodeError::ProtocolError(format!("missing `{field}` in response")))?;

        let ip = pair
            .first()
            .and_then(|v| v.as_str())
            .ok_or_else(|| NodeError::ProtocolError("malformed address".into()))?;

        let port = pair
            .get(1)
            .and_then(|v| v.as_u64())
            .ok_or_else(|| NodeError::ProtocolError("malformed address".into()))?;

        Ok(Address::new(ip, port as u16))
    }

    pub async fn get_successor(&self) -> NodeResult<Address> {
        let resp = self.call(Request::GetNext).await?;
        Self::extract_addr(&resp, "next")
    }

    pub async fn set_successor(&self, addr: Address) -> NodeResult<()> {
        self.call(Request::SetNext {
            new_next: (addr.ip, addr.port),
        })
        .await?;
        Ok(())
    }

    pub async fn get_predecessor(&self) -> NodeResult<Option<Address>> {
        let resp = self.call(Request::GetPrev).await?;
        match resp.get("prev") {
            Some(serde_json::Value::Null) | None => Ok(None),
            _ => Ok(Some(Self::extract_addr(&resp, "prev")?)),
        }
    }

    pub async fn set_predecessor(&self, addr: Address) -> NodeResult<()> {
        self.call(Request::SetPrev {
            new_prev: (addr.ip, addr.port),
        })
        .await?;
        Ok(())
    }

    pub async fn find_successor(&self, key: Id, iterations: u32) -> NodeResult<Address> {
        let resp = self
            .call(Request::FindSuccessor { key, iterations })
            .await?;
        Self::extract_addr(&resp, "successor")
    }

    pub async fn notify(&self, candidate: Address) -> NodeResult<()> {
        self.call(Request::Notify {
            potential_prev: (candidate.ip, candidate.port),
        })
        .await?;
        Ok(())
    }

    pub async fn put(&self, key: String, value: String) -> NodeResult<()> {
        self.call(Request::Put { key, value }).await?;
        Ok(())
    }

    pub async fn lookup(
        &self,
        key: String,
        history: Vec<String>,
    ) -> NodeResult<(Option<String>, Option<Address>, Vec<String>)> {
        let resp = self.call(Request::Lookup { key, history }).await?;

        let value = resp
            .get("value")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        let owner = match resp.get("node_address") {
            Some(serde_json::Value::Null) | None => None,
            _ => Some(Self::extract_addr(&resp, "node_address")?),
        };

        let history = resp
            .get("history")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        let value = value.filter(|v| v != "Key not found");
        Ok((value, owner, history))
    }

    pub async fn pass_data(&self, receiver: Address) -> NodeResult<()> {
        self.call(Request::PassData {
            receiver: (receiver.ip, receiver.port),
        })
        .await?;
        Ok(())
    }

    pub async fn update_data(&self, data: HashMap<String, String>) -> NodeResult<()> {
        self.call(Request::UpdateData { new_data: data }).await?;
        Ok(())
    }

    pub async fn join(&self, bootstrap: Option<Address>) -> NodeResult<()> {
        let potential_prev = bootstrap.unwrap_or_else(|| self.addr.clone());
        self.call(Request::Join {
            potential_prev: (potential_prev.ip, potential_prev.port),
        })
        .await?;
        Ok(())
    }
}
