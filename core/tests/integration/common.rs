use hashspill_core::{Row, Value};
use rand::distributions::Alphanumeric;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub fn maybe_setup_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_line_number(true)
                .with_thread_ids(true),
        )
        .with(EnvFilter::from_default_env())
        .try_init();
}

/// Seeded RNG. Set SEED to reproduce a failing run.
pub fn rng_from_env() -> (ChaCha8Rng, u64) {
    let seed: u64 = std::env::var("SEED")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| rand::thread_rng().gen());
    tracing::info!("seed: {seed}");
    (ChaCha8Rng::seed_from_u64(seed), seed)
}

/// Rows shaped `[id, key, payload]` with unique ids, random (possibly negative)
/// keys and random-length text payloads.
pub fn random_rows(rng: &mut ChaCha8Rng, count: usize) -> Vec<Row> {
    (0..count as i64)
        .map(|id| {
            let key = rng.gen_range(-10_000i64..10_000);
            let len = rng.gen_range(0..64);
            let payload: String = (&mut *rng)
                .sample_iter(&Alphanumeric)
                .take(len)
                .map(char::from)
                .collect();
            Row::new(vec![
                Value::Integer(id),
                Value::Integer(key),
                Value::Text(payload),
            ])
        })
        .collect()
}

pub fn row_id(row: &Row) -> i64 {
    match row.get(0) {
        Some(Value::Integer(id)) => *id,
        other => panic!("row without an integer id: {other:?}"),
    }
}

pub fn row_key(row: &Row) -> Option<Value> {
    row.get(1).cloned()
}
