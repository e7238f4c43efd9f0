// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Offline round trip through local cache and cloud storage.
//!
//! Demonstrates:
//! 1. Writing collections with no backend configured
//! 2. A transaction list large enough to be chunked in cloud storage
//! 3. "Reinstalling" the app: empty local cache, same cloud storage
//! 4. Restoring collections from cloud storage on startup
//! 5. Displaying metrics
//!
//! # Run
//!
//! ```bash
//! RUST_LOG=finance_sync=debug cargo run --example offline_roundtrip
//! ```

use std::sync::Arc;
use std::time::Duration;
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use finance_sync::{Collection, MemoryBridge, SyncConfig, SyncCoordinator, SyncEvent};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("finance_sync=info")))
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           finance-sync: Offline Round Trip                    ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // Shared across both "installs", like the chat client's cloud storage
    let cloud = Arc::new(MemoryBridge::new(4000));

    // ─────────────────────────────────────────────────────────────────────────
    // 1. First install: write locally, mirror to cloud
    // ─────────────────────────────────────────────────────────────────────────
    println!("📱 First install (no backend, cloud storage available)");
    let first = SyncCoordinator::builder(SyncConfig::default())
        .remote(cloud.clone())
        .build()?;

    let initial = first.load_all()?;
    println!("   └─ Loaded {} collections (defaults on cold start)", initial.len());

    let transactions: Vec<_> = (1..=120)
        .map(|i| {
            json!({
                "id": i,
                "date": format!("2024-05-{:02}", (i % 28) + 1),
                "amount": i * 250,
                "category": "Groceries",
                "account": 1,
                "comment": "Weekly shop at the market"
            })
        })
        .collect();

    first.set(Collection::Transactions, &json!(transactions))?;
    first.set(Collection::ExpensePlan, &json!(85_000))?;
    first.set(Collection::ClosedMonths, &json!(["2024-04"]))?;
    println!("   └─ Wrote transactions ({} entries), plan and closed months", transactions.len());

    // Mirrors run detached; give them a moment
    tokio::time::sleep(Duration::from_millis(200)).await;
    println!("\n☁️  Cloud storage keys:");
    for key in cloud.keys() {
        let len = cloud.peek(&key).map_or(0, |v| v.chars().count());
        println!("   └─ {} ({} chars)", key, len);
    }
    first.shutdown().await;

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Second install: empty local cache, restore from cloud
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📱 Second install (fresh local cache)");
    let second = SyncCoordinator::builder(SyncConfig::default())
        .remote(cloud.clone())
        .build()?;
    let mut events = second.subscribe();

    let first_paint = second.load_all()?;
    println!(
        "   └─ First paint: {} transactions",
        first_paint[&Collection::Transactions].as_array().map_or(0, Vec::len)
    );

    match tokio::time::timeout(Duration::from_secs(2), events.recv()).await {
        Ok(Ok(SyncEvent::Refreshed(set))) => {
            println!(
                "   └─ Restored: {} transactions, plan {}, closed {}",
                set[&Collection::Transactions].as_array().map_or(0, Vec::len),
                set[&Collection::ExpensePlan],
                set[&Collection::ClosedMonths]
            );
        }
        Ok(Ok(other)) => println!("   └─ Unexpected event: {:?}", other),
        Ok(Err(e)) => println!("   └─ Event stream error: {}", e),
        Err(_) => println!("   └─ No refresh within 2s"),
    }

    let plan = second.get(Collection::ExpensePlan).await?;
    println!("   └─ get(expense_plan) → {:?}", plan);
    println!("   └─ Status: {}", second.status());

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Metrics:");
    dump_metrics(&snapshotter);

    second.shutdown().await;

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines: Vec<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, value)| {
            let (_, key) = composite_key.into_parts();
            let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
            let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };
            let rendered = match value {
                DebugValue::Counter(v) => v.to_string(),
                DebugValue::Gauge(v) => format!("{:.2}", v.into_inner()),
                DebugValue::Histogram(samples) => format!("{} samples", samples.len()),
            };
            format!("{}{} = {}", key.name(), label_str, rendered)
        })
        .collect();
    lines.sort();

    if lines.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
    for line in lines {
        println!("   └─ {}", line);
    }
}
