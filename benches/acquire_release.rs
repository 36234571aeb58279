// benches/acquire_release.rs

//! Hot-path cost of borrowing and returning a warm connection.

use async_trait::async_trait;
use connpool::{Connection, ConnectionFactory, ConnectionId, ConnectionPool, PoolConfig};
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::time::Duration;
use tokio::runtime::Runtime;

struct NullConn(ConnectionId);

impl Connection for NullConn {
    fn id(&self) -> ConnectionId {
        self.0
    }

    fn is_closed(&self) -> bool {
        false
    }
}

struct NullFactory;

#[async_trait]
impl ConnectionFactory for NullFactory {
    type Connection = NullConn;

    async fn create(&self) -> connpool::Result<NullConn> {
        Ok(NullConn(ConnectionId::new()))
    }

    async fn destroy(&self, _conn: NullConn) -> connpool::Result<()> {
        Ok(())
    }
}

fn bench_acquire_release(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let config = PoolConfig::default()
        .with_min_idle(4)
        .with_max_total(16)
        .with_reclaim_interval(Duration::from_secs(3600));
    let pool = ConnectionPool::new(config, NullFactory).unwrap();
    runtime.block_on(pool.start()).unwrap();

    c.bench_function("acquire_release_warm", |b| {
        b.to_async(&runtime).iter(|| async {
            let conn = pool.acquire().await.unwrap();
            black_box(conn.id());
            pool.release(conn).await;
        })
    });

    c.bench_function("guarded_get_drop", |b| {
        b.to_async(&runtime).iter(|| async {
            let conn = pool.get().await.unwrap();
            black_box(conn.id());
        })
    });

    runtime.block_on(pool.shutdown());
}

criterion_group!(benches, bench_acquire_release);
criterion_main!(benches);
