//! Live temperature monitoring example
//!
//! Run with: cargo run --example temperature_monitor -- <ADDRESS> [c|f]
//!
//! The device must already be known to the adapter (paired or seen in a
//! recent scan).

use easyhome_ble::{
    BtleplugTransport, Error, Measurement, Result, SessionConfig, SessionEvent, SessionManager,
    TemperatureUnit,
};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (RUST_LOG overrides)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let mut args = std::env::args().skip(1);
    let address = args.next().ok_or_else(|| Error::DeviceNotFound {
        address: "<none given>".to_string(),
    })?;
    let unit = match args.next().as_deref() {
        Some("f") | Some("F") => TemperatureUnit::Fahrenheit,
        _ => TemperatureUnit::Celsius,
    };

    println!("Basal Thermometer Monitor");
    println!("=========================\n");

    let transport = BtleplugTransport::new().await?;
    let config = SessionConfig::default().with_unit_on_connect(Some(unit));
    let session = SessionManager::with_callback(&address, transport, config, move |m| {
        display_measurement(&m, unit)
    });
    let mut events = session.subscribe_events();

    println!("Connecting to {}...", address);
    session.connect_timeout(Duration::from_secs(30)).await?;

    println!("Connected! Take a reading on the thermometer.");
    println!("Press Ctrl+C to exit.\n");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nExiting...");
                break;
            }
            event = events.recv() => match event {
                Ok(SessionEvent::StateChanged { state, .. }) if !state.is_connected() => {
                    if !state.is_transitioning() {
                        println!("Link lost.");
                        break;
                    }
                }
                Ok(SessionEvent::FrameRejected { error, .. }) => {
                    println!("  (ignored malformed frame: {})", error);
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    }

    session.disconnect().await?;

    Ok(())
}

fn display_measurement(measurement: &Measurement, unit: TemperatureUnit) {
    let kind = if measurement.is_live() {
        "live"
    } else {
        "memory"
    };
    let other = match unit {
        TemperatureUnit::Celsius => TemperatureUnit::Fahrenheit,
        TemperatureUnit::Fahrenheit => TemperatureUnit::Celsius,
    };

    println!(
        "  [{:6}] {}  {:6.2}{} ({:6.2}{})",
        kind,
        measurement.timestamp().format("%Y-%m-%d %H:%M:%S"),
        measurement.temperature(),
        unit.symbol(),
        measurement.temperature_in(unit, other),
        other.symbol()
    );
}
