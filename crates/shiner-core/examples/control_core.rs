//! Example: Controlling a Shiner Core
//!
//! Connects to a core, prints every property, then fades the brightness and
//! changes the color.
//!
//! Run with: `cargo run --example control_core -- <IDENTIFIER>`

use std::env;
use std::sync::Arc;
use std::time::Duration;

use shiner_core::{BleTransport, CoreManager, ManagerEvent, Property, PropertyValue, Rgb};
use tokio::time::{sleep, timeout};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let identifier = if args.len() > 1 {
        args[1].clone()
    } else {
        eprintln!("Usage: {} <IDENTIFIER>", args[0]);
        std::process::exit(1);
    };

    let transport = Arc::new(BleTransport::new().await?);
    let manager = Arc::new(CoreManager::new(transport));
    let mut events = manager.subscribe();
    manager.start().await?;
    manager.start_scanning().await?;

    println!("Waiting for {}...", identifier);
    timeout(Duration::from_secs(30), async {
        while let Ok(event) = events.recv().await {
            if let ManagerEvent::Found { core, .. } = event
                && core.id == identifier
            {
                return;
            }
        }
    })
    .await?;
    manager.stop_scanning().await?;

    let core = manager.connect(&identifier).await?;
    println!("Connected to {}", core.id());
    println!();

    for snapshot in core.snapshots().await {
        if !snapshot.available {
            continue;
        }
        let raw = snapshot.raw.as_deref().unwrap_or("-");
        println!("  {:<14} {}", snapshot.property.name(), raw);
    }

    for option in core.options(Property::BlendMode).await {
        println!("  blend mode option: {}", option);
    }

    if core.is_available(Property::Brightness).await {
        println!();
        println!("Fading brightness...");
        // writes faster than the throttle delay coalesce on the device side
        for level in (0..=255).step_by(5) {
            core.write(Property::Brightness, level.to_string()).await?;
            sleep(Duration::from_millis(20)).await;
        }
    }

    if core.is_available(Property::Color).await {
        core.write_value(Property::Color, PropertyValue::Color(Rgb::new(0, 128, 255)))
            .await?;
        println!("Color set to {}", Rgb::new(0, 128, 255));
    }

    sleep(Duration::from_millis(500)).await;
    manager.disconnect(&identifier).await?;
    manager.shutdown().await;
    Ok(())
}
