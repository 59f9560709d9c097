//! Load stream data blocks through the inflight read throttle and dump the
//! resulting metrics.
//!
//! ```bash
//! cargo run -p strata-storage --example read_path -- 32 1
//! ```

use bytes::Bytes;
use object_store::memory::InMemory;
use object_store::ObjectStore;
use std::sync::Arc;
use strata_core::DataBlockIndex;
use strata_storage::{DataBlockLoader, InflightReadThrottle, StreamDataBlock};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    strata_observability::init();

    let args: Vec<String> = std::env::args().collect();
    let block_count: u32 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(32);
    let budget_mb: u64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(1);
    const BLOCK: u32 = 256 * 1024;

    let store = Arc::new(InMemory::new());
    let throttle = Arc::new(InflightReadThrottle::new(budget_mb * 1024 * 1024));
    let loader = Arc::new(DataBlockLoader::new(store.clone(), throttle.clone(), "data"));

    store
        .put(
            &loader.object_path(1),
            Bytes::from(vec![0u8; (BLOCK * block_count) as usize]),
        )
        .await?;

    let mut tasks = Vec::new();
    for i in 0..block_count {
        let index = DataBlockIndex::new(i, (i * BLOCK) as u64, BLOCK, 1000)?;
        let start = i as u64 * 1000;
        let block = Arc::new(StreamDataBlock::new(1, start, start + 1000, 1, index)?);
        let loader = loader.clone();
        tasks.push(tokio::spawn(async move {
            let loaded = loader.load(block).await?;
            // Simulate handing the block to a slow consumer
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            loaded.release();
            Ok::<_, strata_storage::Error>(())
        }));
    }
    for task in tasks {
        task.await??;
    }

    info!(
        available = throttle.available_bytes(),
        max = throttle.max_bytes(),
        "All blocks loaded"
    );
    println!("{}", strata_observability::exporter::encode_text()?);
    Ok(())
}
