use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ulid::Ulid;

use agenda::clock::ManualClock;
use agenda::engine::{days_of_month, Engine, EngineError, Settings};
use agenda::model::*;
use agenda::remote::MemoryRemote;

// 2025-01-01T12:00:00Z
const JAN_1_NOON: Ms = 1_735_732_800_000;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.3}ms, p50={:.3}ms, p95={:.3}ms, p99={:.3}ms, max={:.3}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().map_or(0.0, |d| d.as_secs_f64() * 1000.0),
    );
}

fn officials(n: usize) -> Vec<Resource> {
    let hours: Vec<TimeOfDay> = (9..17).filter_map(|h| TimeOfDay::hm(h, 0)).collect();
    (0..n)
        .map(|i| Resource {
            id: format!("m{i}"),
            name: None,
            active: true,
            // Every official works a different 5-hour window of the day.
            available_hours: hours.iter().copied().cycle().skip(i % 8).take(5).collect(),
        })
        .collect()
}

async fn setup(engine: &Engine) -> Vec<DateKey> {
    let mut days = Vec::new();
    for month in 1..=12 {
        for date in days_of_month(2025, month).expect("valid month") {
            engine.apply_template(date).await.expect("template");
            days.push(date);
        }
    }
    println!("  configured {} days", days.len());
    days
}

async fn phase1_create(engine: &Engine, days: &[DateKey]) {
    let times: Vec<TimeOfDay> = (9..17).filter_map(|h| TimeOfDay::hm(h, 0)).collect();
    let mut latencies = Vec::new();
    let mut full = 0usize;
    let start = Instant::now();
    for (i, date) in days.iter().enumerate() {
        for (j, time) in times.iter().enumerate() {
            let t = Instant::now();
            let subject = format!("org-{i}-{j}");
            match engine.create(*date, *time, &subject, BTreeMap::new()).await {
                Ok(_) => {}
                Err(EngineError::SlotFull { .. }) => full += 1,
                Err(e) => panic!("create failed: {e}"),
            }
            latencies.push(t.elapsed());
        }
    }
    let elapsed = start.elapsed();
    println!(
        "  {} creates ({full} full) in {:.2}s = {:.0} ops/sec",
        latencies.len(),
        elapsed.as_secs_f64(),
        latencies.len() as f64 / elapsed.as_secs_f64()
    );
    print_latency("create latency", &mut latencies);
}

async fn phase2_month_view(engine: &Engine) {
    let mut latencies = Vec::new();
    for _ in 0..20 {
        for month in 1..=12 {
            let t = Instant::now();
            let view = engine.month_view(2025, month).await.expect("month view");
            latencies.push(t.elapsed());
            assert!(!view.available.is_empty() || !view.partial.is_empty() || !view.unavailable.is_empty());
        }
    }
    print_latency("month_view latency", &mut latencies);
}

async fn phase3_free_slots_under_load(engine: Arc<Engine>, days: &[DateKey]) {
    let writer = {
        let engine = engine.clone();
        let days = days.to_vec();
        tokio::spawn(async move {
            let time = TimeOfDay::hm(9, 0).unwrap_or(TimeOfDay::MIDNIGHT);
            for date in days.iter().cycle().take(2_000) {
                let _ = engine
                    .create(*date, time, &Ulid::new().to_string(), BTreeMap::new())
                    .await;
            }
        })
    };

    let mut latencies = Vec::new();
    for date in days.iter().cycle().take(2_000) {
        let t = Instant::now();
        engine.free_slots_on(*date).await.expect("free slots");
        latencies.push(t.elapsed());
    }
    let _ = writer.await;
    print_latency("free_slots_on latency (concurrent writer)", &mut latencies);
}

#[tokio::main]
async fn main() {
    let dir = std::env::temp_dir().join(format!("agenda_bench_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).expect("bench dir");

    let remote = Arc::new(MemoryRemote::with_resources(officials(24)));
    let clock = Arc::new(ManualClock::new(JAN_1_NOON));
    let engine = Arc::new(
        Engine::new(dir.join("bench.wal"), remote, clock, Settings::default()).expect("engine"),
    );

    println!("=== agenda availability benchmark ===\n");

    println!("[setup]");
    let days = setup(&engine).await;

    println!("\n[phase 1] sequential create");
    phase1_create(&engine, &days).await;

    println!("\n[phase 2] month view");
    phase2_month_view(&engine).await;

    println!("\n[phase 3] free slots under write load");
    phase3_free_slots_under_load(engine.clone(), &days).await;

    let appends = engine.wal_appends_since_compact().await;
    let t = Instant::now();
    engine.compact_wal().await.expect("compact");
    println!("\n[compact] {appends} appends compacted in {:.2}ms", t.elapsed().as_secs_f64() * 1000.0);

    let _ = std::fs::remove_dir_all(&dir);
    println!("\n=== benchmark complete ===");
}
