//! Scull CLI Demo
//!
//! Builds a device registry from `SCULL_*` environment variables and walks
//! through the store and the three access policies.
//! Run with `RUST_LOG=debug` to see what the store and locks are doing.

use std::sync::Arc;
use std::time::Duration;

use scull::{
    AccessMode, Credentials, Device, DeviceRegistry, OpenRequest, Params, ScullError, SeekFrom,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let params = Params::from_env()?;
    let registry = DeviceRegistry::new(params);
    println!(
        "{} devices, quantum={} qset={}",
        registry.len(),
        params.geometry.quantum(),
        params.geometry.qset()
    );

    let scull0 = registry.by_name("scull0").ok_or("scull0 missing")?;
    store_demo(&scull0).await?;

    let single = registry
        .by_name(scull::registry::SINGLE_NAME)
        .ok_or("scullsingle missing")?;
    single_demo(&single).await?;

    let wuid = registry
        .by_name(scull::registry::WUID_NAME)
        .ok_or("scullwuid missing")?;
    wuid_demo(&wuid).await?;

    registry.shutdown();
    println!("Registry shut down");
    Ok(())
}

async fn store_demo(device: &Arc<Device>) -> Result<(), ScullError> {
    let quantum = device.stats().geometry.quantum();
    let mut handle = device
        .open(OpenRequest::new(AccessMode::ReadWrite, Credentials::user(1000)))
        .await?;

    // Straddle the first quantum boundary
    let start = i64::try_from(quantum).unwrap_or(i64::MAX).saturating_sub(5).max(0);
    handle.seek(SeekFrom::Start(start))?;
    let data = b"hello, quantum world";
    let mut written = 0;
    while written < data.len() {
        written += handle.write(&data[written..])?;
    }
    println!("({}) wrote {} bytes, size={}", device.name(), written, device.size());

    handle.seek(SeekFrom::Start(start))?;
    let mut out = vec![0u8; data.len()];
    let mut read = 0;
    loop {
        let n = handle.read(&mut out[read..])?;
        if n == 0 {
            break;
        }
        println!("({}) read chunk of {} bytes", device.name(), n);
        read += n;
    }
    println!("({}): {}", device.name(), String::from_utf8_lossy(&out[..read]));

    handle.release();
    Ok(())
}

async fn single_demo(device: &Arc<Device>) -> Result<(), ScullError> {
    let first = device
        .open(OpenRequest::new(AccessMode::ReadOnly, Credentials::user(1000)))
        .await?;
    let second = device
        .open(OpenRequest::new(AccessMode::ReadOnly, Credentials::user(1000)))
        .await;
    println!("({}) second open: {:?}", device.name(), second.err());
    drop(first);
    Ok(())
}

async fn wuid_demo(device: &Arc<Device>) -> Result<(), ScullError> {
    let mut owner = device
        .open(OpenRequest::new(AccessMode::ReadWrite, Credentials::user(1000)))
        .await?;

    let contender = Arc::clone(device);
    let waiter = tokio::spawn(async move {
        contender
            .open(OpenRequest::new(AccessMode::ReadOnly, Credentials::user(1001)))
            .await
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("({}) uid 1001 waiting, releasing uid 1000", device.name());
    owner.release();

    match waiter.await {
        Ok(Ok(handle)) => println!(
            "({}) uid 1001 admitted as session {}, owner={:?}",
            device.name(),
            handle.id(),
            device.owner()
        ),
        Ok(Err(e)) => eprintln!("({}) uid 1001 failed: {e}", device.name()),
        Err(e) => eprintln!("({}) waiter task failed: {e}", device.name()),
    }
    Ok(())
}
