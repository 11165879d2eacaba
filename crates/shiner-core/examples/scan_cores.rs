//! Example: Scanning for Shiner Cores
//!
//! This example scans for cores advertising the Shiner service and prints
//! them as they appear and disappear.
//!
//! Run with: `cargo run --example scan_cores`

use std::sync::Arc;
use std::time::Duration;

use shiner_core::{BleTransport, CoreManager, ManagerEvent};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let transport = Arc::new(BleTransport::new().await?);
    let manager = Arc::new(CoreManager::new(transport));
    let mut events = manager.subscribe();

    manager.start().await?;
    manager.start_scanning().await?;

    println!("Scanning for Shiner cores for 15 seconds...");
    println!();

    let deadline = tokio::time::sleep(Duration::from_secs(15));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = events.recv() => match event {
                Ok(ManagerEvent::Found { core, rssi }) => {
                    let rssi = rssi
                        .map(|r| format!("{} dBm", r))
                        .unwrap_or_else(|| "N/A".to_string());
                    println!("  + {}", core.display_name());
                    println!("    Identifier: {}", core.id);
                    println!("    RSSI: {}", rssi);
                }
                Ok(ManagerEvent::Lost { core }) => println!("  - {}", core),
                Ok(ManagerEvent::TransportStateChanged { ready }) => {
                    println!("Bluetooth {}", if ready { "ready" } else { "unavailable" });
                }
                Ok(_) => {}
                Err(_) => break,
            },
        }
    }

    let cores = manager.cores().await;
    println!();
    if cores.is_empty() {
        println!("No Shiner cores found.");
        println!();
        println!("Make sure:");
        println!("  - The core is powered on");
        println!("  - Bluetooth is enabled on this computer");
        println!("  - The core is not connected to another phone");
    } else {
        println!("Found {} core(s).", cores.len());
    }

    manager.shutdown().await;
    Ok(())
}
