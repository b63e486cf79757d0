use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio_postgres::{Config, NoTls};

// Runs against a live server loaded with the built-in timetable. Every phase
// cancels what it books, so the catalogue ends where it started.

async fn connect(host: &str, port: u16, user: &str) -> tokio_postgres::Client {
    let password = std::env::var("SEATLEDGER_PASSWORD").unwrap_or_else(|_| "seatledger".into());
    let mut config = Config::new();
    config
        .host(host)
        .port(port)
        .dbname("seatledger")
        .user(user)
        .password(password);

    let (client, conn) = config.connect(NoTls).await.expect("connect failed");
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            eprintln!("connection error: {e}");
        }
    });
    client
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
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

async fn book(client: &tokio_postgres::Client, trip: &str) -> bool {
    client
        .batch_execute(&format!(
            "INSERT INTO bookings (trip_id) VALUES ('{trip}')"
        ))
        .await
        .is_ok()
}

async fn cancel(client: &tokio_postgres::Client, trip: &str) {
    client
        .batch_execute(&format!("DELETE FROM bookings WHERE trip_id = '{trip}'"))
        .await
        .unwrap();
}

async fn phase1_sequential(host: &str, port: u16) {
    let client = connect(host, port, "bench-seq").await;
    let n = 2000;
    let mut book_latencies = Vec::with_capacity(n);
    let mut cancel_latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for _ in 0..n {
        let t = Instant::now();
        assert!(book(&client, "G100").await, "G100 sold out during phase 1");
        book_latencies.push(t.elapsed());

        let t = Instant::now();
        cancel(&client, "G100").await;
        cancel_latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = (2 * n) as f64 / elapsed.as_secs_f64();
    println!(
        "  {n} book/cancel pairs in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
    print_latency("book latency", &mut book_latencies);
    print_latency("cancel latency", &mut cancel_latencies);
}

async fn phase2_contended(host: &str, port: u16) {
    // K300 seats three; everyone fights over it.
    let n_tasks = 10;
    let n_per_task = 200;
    let booked = Arc::new(AtomicUsize::new(0));
    let refused = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();
    let mut handles = Vec::new();

    for i in 0..n_tasks {
        let host = host.to_string();
        let booked = booked.clone();
        let refused = refused.clone();
        handles.push(tokio::spawn(async move {
            let client = connect(&host, port, &format!("bench-rider-{i}")).await;
            for _ in 0..n_per_task {
                if book(&client, "K300").await {
                    booked.fetch_add(1, Ordering::Relaxed);
                    cancel(&client, "K300").await;
                } else {
                    refused.fetch_add(1, Ordering::Relaxed);
                }
            }
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} attempts = {total} total in {:.2}s = {ops:.0} attempts/sec",
        elapsed.as_secs_f64()
    );
    println!(
        "  booked={}, refused={}",
        booked.load(Ordering::Relaxed),
        refused.load(Ordering::Relaxed)
    );
}

async fn phase3_read_under_load(host: &str, port: u16) {
    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    let write_trips = ["G100", "D200", "G101", "D201", "G102"];

    for (w, trip) in write_trips.iter().enumerate() {
        let host = host.to_string();
        let stop = stop.clone();
        let trip = trip.to_string();
        writer_handles.push(tokio::spawn(async move {
            let client = connect(&host, port, &format!("bench-writer-{w}")).await;
            while !stop.load(Ordering::Relaxed) {
                if book(&client, &trip).await {
                    cancel(&client, &trip).await;
                }
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut reader_handles = Vec::new();

    for r in 0..n_readers {
        let host = host.to_string();
        reader_handles.push(tokio::spawn(async move {
            let client = connect(&host, port, &format!("bench-reader-{r}")).await;
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for i in 0..reads_per_reader {
                let sql = if i % 2 == 0 {
                    "SELECT * FROM trips"
                } else {
                    "SELECT * FROM trips WHERE origin = 'beijing' AND destination = 'shanghai'"
                };
                let t = Instant::now();
                client.simple_query(sql).await.unwrap();
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        all_latencies.extend(h.await.unwrap());
    }

    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("list/search query", &mut all_latencies);
}

async fn phase4_connection_storm(host: &str, port: u16) {
    let n_conns = 50;
    let ops_per_conn = 10;

    let start = Instant::now();
    let mut handles = Vec::new();
    let success = Arc::new(AtomicUsize::new(0));

    for c in 0..n_conns {
        let host = host.to_string();
        let success = success.clone();
        handles.push(tokio::spawn(async move {
            let client = connect(&host, port, &format!("bench-storm-{c}")).await;
            for _ in 0..ops_per_conn {
                if book(&client, "G101").await {
                    cancel(&client, "G101").await;
                }
            }
            client.simple_query("SELECT * FROM bookings").await.unwrap();
            success.fetch_add(1, Ordering::Relaxed);
        }));
    }

    for h in handles {
        let _ = h.await;
    }

    let elapsed = start.elapsed();
    let ok = success.load(Ordering::Relaxed);
    println!(
        "  {n_conns} connections, {ops_per_conn} ops each: {ok}/{n_conns} succeeded in {:.2}s",
        elapsed.as_secs_f64()
    );
}

#[tokio::main]
async fn main() {
    let host = std::env::var("SEATLEDGER_HOST").unwrap_or_else(|_| "127.0.0.1".into());
    let port: u16 = std::env::var("SEATLEDGER_PORT")
        .unwrap_or_else(|_| "5434".into())
        .parse()
        .expect("invalid SEATLEDGER_PORT");

    println!("=== seatledger stress benchmark ===");
    println!("target: {host}:{port}\n");

    println!("[phase 1] sequential book/cancel throughput");
    phase1_sequential(&host, port).await;

    println!("\n[phase 2] contended last-seat booking");
    phase2_contended(&host, port).await;

    println!("\n[phase 3] read latency under write load");
    phase3_read_under_load(&host, port).await;

    println!("\n[phase 4] connection storm");
    phase4_connection_storm(&host, port).await;

    println!("\n=== benchmark complete ===");
}
