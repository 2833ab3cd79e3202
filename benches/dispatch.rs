//! Dispatcher fan-out benchmark, grounded on the teacher's
//! `benches/throughput.rs` shape: one `criterion_group`, concrete inputs,
//! `Throughput::Elements` sized to the batch being measured.

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use rportd_fleet::config::Config;
use rportd_fleet::db::Database;
use rportd_fleet::dispatch::{MultiJobRequest, dispatch_multi_job};
use rportd_fleet::error::SessionError;
use rportd_fleet::jobs::JobSpec;
use rportd_fleet::state::{Fleet, JobOutcome, Transport};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

struct InstantTransport;

#[async_trait]
impl Transport for InstantTransport {
    async fn run_job(&self, _spec: &JobSpec) -> Result<JobOutcome, SessionError> {
        Ok(JobOutcome {
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        })
    }

    async fn cancel_job(&self) {}
    async fn close(&self) {}
    fn is_closed(&self) -> bool {
        false
    }
}

fn test_config() -> Config {
    toml::from_str("[server]\nname = \"bench\"\n").expect("static test config parses")
}

async fn fleet_with_clients(n: usize) -> Fleet {
    let db = Database::new(":memory:").await.expect("in-memory db opens");
    let fleet = Fleet::new(test_config(), db).await.expect("fleet constructs");
    for i in 0..n {
        fleet
            .attach(format!("client-{i}"), "auth".into(), "box".into(), Arc::new(InstantTransport))
            .await
            .expect("attach succeeds");
    }
    fleet
}

fn request(client_ids: Vec<String>, concurrent: bool) -> MultiJobRequest {
    MultiJobRequest {
        client_ids,
        command: "uptime".into(),
        timeout_sec: 5,
        concurrent,
        abort_on_err: false,
        interpreter: None,
        cwd: None,
        is_sudo: false,
    }
}

fn concurrent_fanout_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("dispatch_concurrent");

    for &n in &[10usize, 100] {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_function(format!("{n}_clients"), |b| {
            b.to_async(&rt).iter(|| async {
                let fleet = fleet_with_clients(n).await;
                let client_ids: Vec<String> = (0..n).map(|i| format!("client-{i}")).collect();
                dispatch_multi_job(
                    &fleet,
                    "bench-job".into(),
                    "bench".into(),
                    &client_ids,
                    request(client_ids.clone(), true),
                    CancellationToken::new(),
                )
                .await
                .unwrap();
            });
        });
    }
    group.finish();
}

fn sequential_fanout_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("dispatch_sequential");
    group.throughput(Throughput::Elements(10));

    group.bench_function("10_clients", |b| {
        b.to_async(&rt).iter(|| async {
            let fleet = fleet_with_clients(10).await;
            let client_ids: Vec<String> = (0..10).map(|i| format!("client-{i}")).collect();
            dispatch_multi_job(
                &fleet,
                "bench-job".into(),
                "bench".into(),
                &client_ids,
                request(client_ids.clone(), false),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        });
    });
    group.finish();
}

criterion_group!(benches, concurrent_fanout_benchmark, sequential_fanout_benchmark);
criterion_main!(benches);
