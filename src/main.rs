#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::io::{self, BufRead, Write};

use chord_ring::config::Config;
use chord_ring::controller::Controller;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    chord_ring::logger::init(config.log_level)?;

    let mut controller = Controller::with_bind_host(
        config.port,
        config.bind_host.clone(),
        config.rpc_timeout,
        config.maintenance_interval,
    );

    log::info!("chord-ring ready at {} — type `help` for commands", controller.get_address());

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("> ");
        io::stdout().flush().ok();

        let Some(line) = lines.next() else {
            break;
        };

        let line = line?;
        let mut parts = line.trim().splitn(3, ' ');
        let command = parts.next().unwrap_or("");

        match command {
            "" => continue,
            "help" => print_help(),
            "start" => {
                let outcome = controller.start_network().await;
                println!("{}", outcome.message.unwrap_or_default());
            }
            "join" => {
                let Some(addr) = parts.next() else {
                    println!("usage: join <ip:port>");
                    continue;
                };
                let outcome = controller.join_network(addr).await;
                println!("{}", outcome.message.unwrap_or_default());
            }
            "put" => {
                let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
                    println!("usage: put <key> <value>");
                    continue;
                };
                let outcome = controller.put(key, value).await;
                println!("{}", outcome.message.unwrap_or_default());
            }
            "get" => {
                let Some(key) = parts.next() else {
                    println!("usage: get <key>");
                    continue;
                };
                let outcome = controller.get(key).await;
                match outcome.data {
                    Some(result) => println!("{} (owner {})", result.value, result.owner),
                    None => println!("{}", outcome.message.unwrap_or_default()),
                }
            }
            "neighbors" => {
                let (predecessor, successor) = controller.get_neighbors();
                println!(
                    "predecessor: {}",
                    predecessor.map(|a| a.to_string()).unwrap_or_else(|| "none".into())
                );
                println!("successor: {successor}");
            }
            "fingers" => {
                for (i, addr) in controller.get_finger_table().into_iter().enumerate() {
                    println!("[{i}] {addr}");
                }
            }
            "dict" => {
                for (key, value) in controller.get_local_dict() {
                    println!("{key} = {value}");
                }
            }
            "id" => println!("{}", controller.get_id()),
            "address" => println!("{}", controller.get_address()),
            "exit" | "quit" => {
                let outcome = controller.stop().await;
                println!("{}", outcome.message.unwrap_or_default());
                break;
            }
            other => println!("unknown command: {other} (type `help`)"),
        }
    }

    Ok(())
}

fn print_help() {
    println!(
        "commands:\n\
         \u{20}start               start a new ring\n\
         \u{20}join <ip:port>      join an existing ring via a bootstrap peer\n\
         \u{20}put <key> <value>   store a value\n\
         \u{20}get <key>           look up a value\n\
         \u{20}neighbors           show predecessor/successor\n\
         \u{20}fingers             show the finger table\n\
         \u{20}dict                show locally-owned keys\n\
         \u{20}id                  show this node's ring id\n\
         \u{20}address             show this node's address\n\
         \u{20}exit                leave the ring and stop"
    );
}
