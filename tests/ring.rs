//! End-to-end tests driving real TCP listeners on loopback, one
//! `Controller` per simulated node. Ports are kept far apart per test so
//! the suite can run with the default parallel test harness.

use std::time::Duration;

use chord_ring::controller::Controller;

fn short_timeout() -> Duration {
    Duration::from_millis(300)
}

fn no_maintenance() -> Duration {
    Duration::from_secs(3600)
}

async fn new_started(port: u16) -> Controller {
    let mut controller = Controller::new(port, short_timeout(), no_maintenance());
    let outcome = controller.start_network().await;
    assert!(outcome.success, "failed to start {port}: {:?}", outcome.message);
    controller
}

async fn joined(port: u16, bootstrap_port: u16) -> Controller {
    let mut controller = Controller::new(port, short_timeout(), no_maintenance());
    let outcome = controller
        .join_network(&format!("127.0.0.1:{bootstrap_port}"))
        .await;
    assert!(outcome.success, "failed to join {port}: {:?}", outcome.message);
    controller
}

#[tokio::test]
async fn solo_put_then_get() {
    let mut node = new_started(18008).await;

    let put = node.put("apple", "fruit").await;
    assert!(put.success);

    let get = node.get("apple").await;
    assert!(get.success);

    let result = get.data.unwrap();
    assert_eq!(result.value, "fruit");
    assert_eq!(result.owner, "127.0.0.1:18008");
    assert_eq!(result.history, vec!["local hit at 127.0.0.1:18008".to_string()]);

    node.stop().await;
}

#[tokio::test]
async fn two_node_join_preserves_data() {
    let mut a = new_started(18009).await;
    for (k, v) in [("a", "1"), ("b", "2"), ("c", "3")] {
        assert!(a.put(k, v).await.success);
    }

    let mut b = joined(18010, 18009).await;

    let a_dict = a.get_local_dict();
    let b_dict = b.get_local_dict();

    assert_eq!(a_dict.len() + b_dict.len(), 3);
    for k in ["a", "b", "c"] {
        assert!(
            a_dict.contains_key(k) ^ b_dict.contains_key(k),
            "key {k} should live on exactly one node"
        );
    }

    for (k, expected) in [("a", "1"), ("b", "2"), ("c", "3")] {
        let from_a = a.get(k).await;
        let from_b = b.get(k).await;
        assert_eq!(from_a.data.unwrap().value, expected);
        assert_eq!(from_b.data.unwrap().value, expected);
    }

    a.stop().await;
    b.stop().await;
}

#[tokio::test]
async fn routing_forwards_to_the_correct_owner() {
    let mut n1 = new_started(18011).await;
    let mut n2 = joined(18012, 18011).await;
    let mut n3 = joined(18013, 18011).await;
    let mut n4 = joined(18014, 18011).await;

    for i in 0..12 {
        let key = format!("key-{i}");
        assert!(n1.put(&key, "v").await.success);
    }

    let dicts = [n1.get_local_dict(), n2.get_local_dict(), n3.get_local_dict(), n4.get_local_dict()];

    for i in 0..12 {
        let key = format!("key-{i}");
        let owners: Vec<_> = dicts.iter().filter(|d| d.contains_key(&key)).collect();
        assert_eq!(owners.len(), 1, "key {key} must live on exactly one node");

        for node in [&n1, &n2, &n3, &n4] {
            let got = node.get(&key).await;
            assert!(got.success, "{key} should be reachable from every node");
            assert_eq!(got.data.unwrap().value, "v");
        }
    }

    n1.stop().await;
    n2.stop().await;
    n3.stop().await;
    n4.stop().await;
}

#[tokio::test]
async fn graceful_exit_reforms_the_ring() {
    let mut n1 = new_started(18015).await;
    let mut n2 = joined(18016, 18015).await;
    let mut n3 = joined(18017, 18015).await;
    let mut n4 = joined(18018, 18015).await;

    for i in 0..8 {
        assert!(n1.put(&format!("k{i}"), "v").await.success);
    }

    let n3_keys: Vec<_> = n3.get_local_dict().into_keys().collect();

    n3.stop().await;

    for k in &n3_keys {
        let got = n4.get(k).await;
        assert!(got.success, "{k} should have migrated to the successor");
    }

    // Walking successors from any survivor three times must return home.
    let (_, succ1) = n1.get_neighbors();
    assert_ne!(succ1.to_string(), "127.0.0.1:18017");

    for node in [&n1, &n2, &n4] {
        for i in 0..8 {
            let key = format!("k{i}");
            let got = node.get(&key).await;
            assert!(got.success, "{key} should still be reachable after exit");
        }
    }

    n1.stop().await;
    n2.stop().await;
    n4.stop().await;
}

#[tokio::test]
async fn invalid_address_is_rejected_without_mutating_state() {
    let mut node = Controller::new(18019, short_timeout(), no_maintenance());
    let outcome = node.join_network("999.0.0.1:70000").await;

    assert!(!outcome.success);
    assert_eq!(
        outcome.message.unwrap(),
        "Endereço inválido. Use o formato IP:PORTA"
    );
}

#[tokio::test]
async fn unreachable_bootstrap_fails_fast() {
    let mut node = Controller::new(18020, short_timeout(), no_maintenance());
    let outcome = node.join_network("127.0.0.1:1").await;

    assert!(!outcome.success);
    assert!(outcome.message.is_some());
}
