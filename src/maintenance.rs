//! Background stabilization loop.
//!
//! `stabilize`/`fix_fingers` are defined by the core routing algorithm but
//! nothing in the source schedules them — left as an open parameter. This
//! runs them periodically once a node has joined, the way a long-running
//! background worker is spawned and aborted.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::node::Node;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

pub struct MaintenanceHandle {
    task: JoinHandle<()>,
}

impl MaintenanceHandle {
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawns the periodic `stabilize` + `fix_fingers` loop for `node`.
pub fn spawn(node: Arc<Node>, interval: Duration) -> MaintenanceHandle {
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if let Err(e) = node.stabilize().await {
                log::warn!("stabilize failed for {}: {e}", node.self_addr());
                continue;
            }

            if let Err(e) = node.fix_fingers().await {
                log::warn!("fix_fingers failed for {}: {e}", node.self_addr());
            }
        }
    });

    MaintenanceHandle { task }
}
