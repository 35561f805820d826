use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};

use appointd::engine::AppointmentService;
use appointd::model::*;
use appointd::notify::NotifyHub;
use appointd::store::WalStore;

fn bench_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("appointd_bench");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn open(name: &str) -> Arc<AppointmentService> {
    let store = Arc::new(WalStore::open(&bench_wal_path(name)).unwrap());
    Arc::new(AppointmentService::new(store, Arc::new(NotifyHub::new())))
}

fn hour(i: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::hours(i)
}

fn booking(resource: &str, start: DateTime<Utc>) -> AppointmentDraft {
    AppointmentDraft {
        customer_name: "Bench".into(),
        start: Some(start),
        duration_minutes: 60,
        resource: resource.into(),
        ..Default::default()
    }
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

async fn phase1_sequential(admin: &User) {
    let svc = open("phase1.wal");
    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let t = Instant::now();
        svc.create(admin, booking("RoomA", hour(i as i64))).await.unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("create latency", &mut latencies);
}

async fn phase2_concurrent(admin: &User) {
    let svc = open("phase2.wal");
    let n_tasks = 10;
    let n_per_task = 200;

    let start = Instant::now();
    let mut handles = Vec::new();
    for t in 0..n_tasks {
        let svc = svc.clone();
        let admin = admin.clone();
        handles.push(tokio::spawn(async move {
            let resource = format!("Room{t}");
            for j in 0..n_per_task {
                svc.create(&admin, booking(&resource, hour(j))).await.unwrap();
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task as usize;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} bookings = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

async fn phase3_contention(admin: &User) {
    let svc = open("phase3.wal");
    let n_tasks = 50;
    let slots = 20;
    let won = Arc::new(AtomicUsize::new(0));
    let lost = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..n_tasks {
        let svc = svc.clone();
        let admin = admin.clone();
        let won = won.clone();
        let lost = lost.clone();
        handles.push(tokio::spawn(async move {
            for s in 0..slots {
                match svc.create(&admin, booking("Hot", hour(s))).await {
                    Ok(_) => won.fetch_add(1, Ordering::Relaxed),
                    Err(_) => lost.fetch_add(1, Ordering::Relaxed),
                };
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let won = won.load(Ordering::Relaxed);
    let lost = lost.load(Ordering::Relaxed);
    println!(
        "  {n_tasks} tasks racing for {slots} slots: {won} booked, {lost} conflicts in {:.2}s",
        start.elapsed().as_secs_f64()
    );
    assert_eq!(won, slots as usize, "double booking detected");
}

async fn phase4_read_under_load(admin: &User) {
    let svc = open("phase4.wal");
    for i in 0..200 {
        svc.create(admin, booking("RoomR", hour(i))).await.unwrap();
    }

    let stop = Arc::new(AtomicBool::new(false));
    let mut writers = Vec::new();
    for w in 0..5 {
        let svc = svc.clone();
        let admin = admin.clone();
        let stop = stop.clone();
        writers.push(tokio::spawn(async move {
            let resource = format!("Writer{w}");
            let mut i = 0i64;
            while !stop.load(Ordering::Relaxed) {
                let _ = svc.create(&admin, booking(&resource, hour(i))).await;
                i += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut readers = Vec::new();
    for _ in 0..n_readers {
        let svc = svc.clone();
        let admin = admin.clone();
        readers.push(tokio::spawn(async move {
            let query = ListQuery {
                limit: 100,
                sort: Some(SortOrder::StartAsc),
                ..Default::default()
            };
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for _ in 0..reads_per_reader {
                let t = Instant::now();
                svc.get_all(&admin, query.clone()).await.unwrap();
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all = Vec::new();
    for h in readers {
        all.extend(h.await.unwrap());
    }
    stop.store(true, Ordering::Relaxed);
    for h in writers {
        let _ = h.await;
    }
    print_latency("list query", &mut all);
}

#[tokio::main]
async fn main() {
    let admin = User::new(Role::Admin);

    println!("=== appointd stress benchmark ===");

    println!("\n[phase 1] sequential create throughput");
    phase1_sequential(&admin).await;

    println!("\n[phase 2] concurrent create throughput");
    phase2_concurrent(&admin).await;

    println!("\n[phase 3] contention on one resource");
    phase3_contention(&admin).await;

    println!("\n[phase 4] list latency under write load");
    phase4_read_under_load(&admin).await;

    println!("\n=== done ===");
}
