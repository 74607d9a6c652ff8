//! Enroll one finger against a sensor behind a TCP serial bridge
//!
//! ```text
//! THUMBID_ADDR=192.168.1.50 THUMBID_PORT=8888 THUMBID_PASSKEY=123456 \
//!     cargo run --example enroll
//! ```

use std::sync::Arc;

use anyhow::Context;
use thumbid::{
    Binder, Device, Enroller, EnrollmentConfig, EnrollmentOutcome, MemoryDirectory,
    MemoryRecordStore, Registration,
};
use thumbid_types::{IdentityContext, Passkey, UserId};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let addr = std::env::var("THUMBID_ADDR").unwrap_or_else(|_| "192.168.1.50".to_string());
    let port = std::env::var("THUMBID_PORT")
        .unwrap_or_else(|_| "8888".to_string())
        .parse::<u16>()
        .context("THUMBID_PORT is not a port number")?;
    let passkey: Passkey = std::env::var("THUMBID_PASSKEY")
        .unwrap_or_else(|_| "123456".to_string())
        .parse()
        .context("THUMBID_PASSKEY must be six digits")?;

    // Demo directory with a single user
    let directory = Arc::new(MemoryDirectory::new());
    directory.insert(passkey, IdentityContext::new(UserId::new("demo-user"), "A01"));
    let store = Arc::new(MemoryRecordStore::new());

    let identity = Registration::new(directory, store.clone())
        .prepare(passkey)
        .await?;

    let mut device = Device::new(addr, port);
    device.connect().await?;
    println!("Sensor connected!");

    let enroller = Enroller::spawn(device, Binder::new(store.clone()), EnrollmentConfig::default());
    let mut attempt = enroller.start_enrollment(identity).await?;

    while let Some(update) = attempt.next_update().await {
        println!("{}", update.status);

        match update.outcome {
            Some(EnrollmentOutcome::Succeeded(record)) => println!("Enrolled as {}", record),
            Some(EnrollmentOutcome::Failed(failure)) if failure.is_retryable() => {
                println!("Try again: {}", failure)
            }
            Some(EnrollmentOutcome::Failed(failure)) => println!("Giving up: {}", failure),
            None => {}
        }
    }

    let mut device = enroller.shutdown().await?;
    device.disconnect().await?;

    for binding in store.bindings() {
        println!("{} -> {} at {}", binding.user_id, binding.record, binding.bound_at);
    }

    Ok(())
}
