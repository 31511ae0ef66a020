//! Controller façade: the one layer that turns `NodeError` into a
//! `{success, message}` shape UI/CLI code can consume without matching on
//! error kinds. Core code below this layer always returns `NodeResult<T>`.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;

use crate::address::Address;
use crate::id::M;
use crate::maintenance::{self, MaintenanceHandle};
use crate::node::Node;
use crate::server::{self, ServerHandle};

const ADDRESS_PATTERN: &str = r"^\d{1,3}(\.\d{1,3}){3}:\d{1,5}$";

#[derive(Debug, Serialize)]
pub struct Outcome<T> {
    pub success: bool,
    pub message: Option<String>,
    #[serde(flatten)]
    pub data: Option<T>,
}

impl<T> Outcome<T> {
    fn ok(data: T) -> Self {
        Self { success: true, message: None, data: Some(data) }
    }

    fn ok_with_message(message: impl Into<String>) -> Self {
        Self { success: true, message: Some(message.into()), data: None }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self { success: false, message: Some(message.into()), data: None }
    }
}

#[derive(Debug, Serialize, Default)]
pub struct Empty;

#[derive(Debug, Serialize)]
pub struct LookupResult {
    pub value: String,
    pub owner: String,
    pub history: Vec<String>,
}

pub struct Controller {
    node: Arc<Node>,
    bind_host: String,
    rpc_timeout: Duration,
    maintenance_interval: Duration,
    maintenance: Option<MaintenanceHandle>,
    server: Option<ServerHandle>,
}

impl Controller {
    pub fn new(port: u16, rpc_timeout: Duration, maintenance_interval: Duration) -> Self {
        Self::with_bind_host(
            port,
            crate::config::DEFAULT_BIND_HOST.to_string(),
            rpc_timeout,
            maintenance_interval,
        )
    }

    /// Like [`Controller::new`], but binds the listener to `bind_host`
    /// instead of the default `0.0.0.0` (§6.2: bind host and announced
    /// identity are distinct).
    pub fn with_bind_host(
        port: u16,
        bind_host: String,
        rpc_timeout: Duration,
        maintenance_interval: Duration,
    ) -> Self {
        let ip = crate::address::detect_local_ip();
        let node = Node::new(Address::new(ip, port), rpc_timeout);

        Self {
            node,
            bind_host,
            rpc_timeout,
            maintenance_interval,
            maintenance: None,
            server: None,
        }
    }

    /// Binds the listener and starts a solo ring.
    pub async fn start_network(&mut self) -> Outcome<Empty> {
        match server::spawn(self.node.clone(), &self.bind_host).await {
            Ok(handle) => self.server = Some(handle),
            Err(e) => return Outcome::fail(format!("failed to bind listener: {e}")),
        }

        if let Err(e) = self.node.join(None).await {
            return Outcome::fail(e.to_string());
        }

        self.maintenance = Some(maintenance::spawn(self.node.clone(), self.maintenance_interval));
        Outcome::ok_with_message(format!("Network started at {}", self.node.self_addr()))
    }

    /// Validates `address`, then binds a listener and joins through it.
    pub async fn join_network(&mut self, address: &str) -> Outcome<Empty> {
        let bootstrap = match Self::validate_address(address) {
            Ok(addr) => addr,
            Err(message) => return Outcome::fail(message),
        };

        if self.server.is_none() {
            match server::spawn(self.node.clone(), &self.bind_host).await {
                Ok(handle) => self.server = Some(handle),
                Err(e) => return Outcome::fail(format!("failed to bind listener: {e}")),
            }
        }

        if let Err(e) = self.node.join(Some(bootstrap.clone())).await {
            return Outcome::fail(e.to_string());
        }

        if self.maintenance.is_none() {
            self.maintenance = Some(maintenance::spawn(self.node.clone(), self.maintenance_interval));
        }

        Outcome::ok_with_message(format!("Connected to the network at {bootstrap}"))
    }

    pub fn validate_address(address: &str) -> Result<Address, String> {
        let pattern = Regex::new(ADDRESS_PATTERN).expect("address pattern is valid");
        if !pattern.is_match(address) {
            return Err("Endereço inválido. Use o formato IP:PORTA".to_string());
        }

        let (ip, port_str) = address
            .rsplit_once(':')
            .ok_or_else(|| "Endereço inválido. Use o formato IP:PORTA".to_string())?;

        let port: u32 = port_str
            .parse()
            .map_err(|_| "Endereço inválido. Use o formato IP:PORTA".to_string())?;

        if port == 0 || port > 65535 {
            return Err("Endereço inválido. Use o formato IP:PORTA".to_string());
        }

        Ok(Address::new(ip, port as u16))
    }

    pub async fn put(&self, key: &str, value: &str) -> Outcome<Empty> {
        if key.is_empty() || value.is_empty() {
            return Outcome::fail("Chave e valor não podem ser vazios");
        }

        match self.node.put(key.to_string(), value.to_string()).await {
            Ok(()) => Outcome::ok_with_message(format!("Chave '{key}' armazenada com sucesso")),
            Err(e) => Outcome::fail(e.to_string()),
        }
    }

    pub async fn get(&self, key: &str) -> Outcome<LookupResult> {
        if key.is_empty() {
            return Outcome::fail("A chave não pode ser vazia");
        }

        match self.node.lookup(key.to_string(), Vec::new()).await {
            Ok((Some(value), Some(owner), history)) => Outcome::ok(LookupResult {
                value,
                owner: owner.to_string(),
                history,
            }),
            Ok((_, _, _)) => Outcome::fail(format!("Chave '{key}' não encontrada")),
            Err(e) => Outcome::fail(e.to_string()),
        }
    }

    pub fn get_neighbors(&self) -> (Option<Address>, Address) {
        (self.node.state().predecessor(), self.node.state().successor())
    }

    pub fn get_local_dict(&self) -> ahash::HashMap<String, String> {
        self.node.state().snapshot_data()
    }

    pub fn get_finger_table(&self) -> Vec<Address> {
        self.node.state().finger_table()
    }

    pub fn get_id(&self) -> u16 {
        self.node.self_id()
    }

    pub fn get_address(&self) -> Address {
        self.node.self_addr().clone()
    }

    pub const fn ring_size() -> u32 {
        M
    }

    /// Gracefully exits the network and stops the listener and
    /// maintenance loop. Does not terminate the process — the caller's
    /// REPL loop decides when to exit.
    pub async fn stop(&mut self) -> Outcome<Empty> {
        if let Some(maintenance) = self.maintenance.take() {
            maintenance.stop();
        }

        if let Err(e) = self.node.exit_network().await {
            return Outcome::fail(e.to_string());
        }

        if let Some(server) = self.server.take() {
            server.stop();
        }

        Outcome::ok_with_message("Node stopped")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_address_accepts_well_formed_input() {
        assert!(Controller::validate_address("127.0.0.1:8008").is_ok());
    }

    #[test]
    fn validate_address_rejects_garbage() {
        let err = Controller::validate_address("999.0.0.1:70000").unwrap_err();
        assert_eq!(err, "Endereço inválido. Use o formato IP:PORTA");
    }

    #[test]
    fn validate_address_rejects_port_out_of_range() {
        assert!(Controller::validate_address("127.0.0.1:70000").is_err());
    }

    #[tokio::test]
    async fn put_rejects_empty_key() {
        let controller = Controller::new(0, Duration::from_millis(300), Duration::from_secs(60));
        let outcome = controller.put("", "value").await;
        assert!(!outcome.success);
    }
}
