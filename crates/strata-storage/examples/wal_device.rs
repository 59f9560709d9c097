//! Open a WAL device or file, write a few records and read them back.
//!
//! ```bash
//! cargo run -p strata-storage --example wal_device -- /tmp/strata-wal.img 64
//! cargo run -p strata-storage --example wal_device -- /tmp/strata-wal.img 0 --recovery
//! ```

use strata_core::BLOCK_SIZE;
use strata_storage::{BlockDeviceChannel, WalChannel, WalChannelConfig};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let log_level = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info".to_string())
        .parse()
        .unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <path> <capacity_mb> [--recovery]", args[0]);
        std::process::exit(1);
    }

    let path = &args[1];
    let capacity = args[2].parse::<u64>()? * 1024 * 1024;
    let recovery_mode = args.iter().any(|a| a == "--recovery");

    let direct_io = match BlockDeviceChannel::check_available(path) {
        None => true,
        Some(reason) => {
            warn!(%reason, "Falling back to buffered I/O");
            false
        }
    };

    let config = WalChannelConfig {
        recovery_mode,
        direct_io,
        ..Default::default()
    };
    let mut channel = BlockDeviceChannel::new(path, capacity, config)?;
    channel.open(None)?;
    info!(kind = ?channel.kind(), capacity = ?channel.capacity(), "WAL ready");

    if !recovery_mode {
        for i in 0..4u64 {
            let record = format!("record-{}", i);
            channel.write(record.as_bytes(), (i + 1) * BLOCK_SIZE)?;
        }
        channel.flush()?;
    }

    for i in 0..4u64 {
        let mut record = [0u8; 8];
        channel.read(&mut record, (i + 1) * BLOCK_SIZE)?;
        println!("block {}: {}", i + 1, String::from_utf8_lossy(&record));
    }

    channel.close();
    Ok(())
}
