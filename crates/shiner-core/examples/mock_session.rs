//! Example: A Session Against the Mock Transport
//!
//! Runs discovery, connection and a burst of writes without any Bluetooth
//! hardware, printing the events the engine produces.
//!
//! Run with: `cargo run --example mock_session`

use std::sync::Arc;
use std::time::Duration;

use shiner_core::mock::{MockLink, MockTransport};
use shiner_core::{CoreManager, Property, uuids};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let transport = Arc::new(MockTransport::new());
    let link = MockLink::builder()
        .id("MOCK-000001")
        .value(uuids::COLOR, "255 64 0")
        .value(uuids::BRIGHTNESS, "128")
        .value(uuids::NAME, "Desk lamp")
        .echo_writes(true)
        .build();
    transport.add_peripheral(Arc::clone(&link)).await;

    let manager = Arc::new(CoreManager::new(transport.clone()));
    let mut manager_events = manager.subscribe();
    manager.start().await?;
    manager.start_scanning().await?;

    transport.advertise("MOCK-000001", Some("Desk lamp"), Some(-42)).await;
    let event = manager_events.recv().await?;
    println!("manager: {:?}", event);

    let core = manager.connect("MOCK-000001").await?;
    let mut core_events = core.subscribe();
    println!("manager: {:?}", manager_events.recv().await?);

    for level in ["10", "20", "30", "40"] {
        core.write(Property::Brightness, level).await?;
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    while let Ok(event) = core_events.try_recv() {
        println!("core:    {}", serde_json::to_string(&event)?);
    }
    println!("device received: {:?}", link.writes_to(uuids::BRIGHTNESS).await);

    manager.shutdown().await;
    Ok(())
}
