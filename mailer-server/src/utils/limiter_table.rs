use std::{
    collections::HashMap,
    hash::Hash,
    sync::Mutex,
    time::{Duration, Instant},
};

use tokio::sync::RwLock;

#[derive(Debug)]
pub struct LimiterEntry {
    /// Hits allowed in the current window, less any that were released
    pub count: u32,
    /// Attempts blocked in the current window
    pub over_limit: u32,
    pub window_start: Instant,
}

pub struct LimiterTable<K> {
    pub map: HashMap<K, Mutex<LimiterEntry>>,
    pub last_clear: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckAndRecordResult {
    /// The hit was recorded against the window that started at `window_start`.
    Allowed { window_start: Instant },
    /// Request is blocked; contains how many attempts have been blocked in this window
    /// (including this one) and the time left until the window ends.
    Blocked { over_limit: u32, retry_after: Duration },
}

impl<K> LimiterTable<K> {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            last_clear: Instant::now(),
        }
    }
}

/// Create a leaked, `'static` set of sharded tables.
pub fn new_sharded_tables<K, const SHARDS: usize>() -> &'static [RwLock<LimiterTable<K>>; SHARDS]
{
    Box::leak(Box::new(std::array::from_fn(|_| {
        RwLock::new(LimiterTable::new())
    })))
}

/// Check and record a hit against the given key in the selected shard.
///
/// Windows are fixed: the first hit for a key opens a window of length `period`, and at most
/// `max_per_period` hits are allowed before it ends.
pub async fn check_and_record<K: Eq + Hash>(
    shard: &RwLock<LimiterTable<K>>,
    key: K,
    now: Instant,
    max_per_period: u32,
    period: Duration,
    clear_frequency: Duration,
) -> CheckAndRecordResult {
    {
        // The read lock is intentionally scoped in this block to ensure it gets
        // dropped before the write lock is acquired.
        let table = shard.read().await;

        if let Some(entry) = table.map.get(&key) {
            let mut entry = entry.lock().unwrap_or_else(|e| e.into_inner());
            return record_hit(&mut entry, now, max_per_period, period);
        }
    }

    let mut table = shard.write().await;

    if now.duration_since(table.last_clear) >= clear_frequency {
        // Drop keys whose window has already ended so the table doesn't grow without bound
        table.map.retain(|_, entry| {
            let entry = entry.get_mut().unwrap_or_else(|e| e.into_inner());
            now.duration_since(entry.window_start) <= period
        });
        table.map.shrink_to_fit();
        table.last_clear = now;
    }

    // Another task may have inserted the key before we acquired the lock
    let entry = table.map.entry(key).or_insert_with(|| {
        Mutex::new(LimiterEntry {
            count: 0,
            over_limit: 0,
            window_start: now,
        })
    });

    let entry = entry.get_mut().unwrap_or_else(|e| e.into_inner());
    record_hit(entry, now, max_per_period, period)
}

/// Give back a hit recorded by `check_and_record()`. Nothing happens if the key's window has
/// since been replaced by a newer one.
pub async fn release<K: Eq + Hash>(
    shard: &RwLock<LimiterTable<K>>,
    key: &K,
    window_start: Instant,
) {
    let table = shard.read().await;

    if let Some(entry) = table.map.get(key) {
        let mut entry = entry.lock().unwrap_or_else(|e| e.into_inner());

        if entry.window_start == window_start {
            entry.count = entry.count.saturating_sub(1);
        }
    }
}

fn record_hit(
    entry: &mut LimiterEntry,
    now: Instant,
    max_per_period: u32,
    period: Duration,
) -> CheckAndRecordResult {
    let elapsed = now.saturating_duration_since(entry.window_start);

    if elapsed >= period {
        entry.window_start = now;
        entry.count = 1;
        entry.over_limit = 0;
        return CheckAndRecordResult::Allowed {
            window_start: entry.window_start,
        };
    }

    // Blocked attempts never take a slot, so a later release can't hand back more than was
    // taken. They are tallied separately so callers can warn about sustained over-limit traffic.
    if entry.count >= max_per_period {
        entry.over_limit = entry.over_limit.saturating_add(1);

        return CheckAndRecordResult::Blocked {
            over_limit: entry.over_limit,
            retry_after: period - elapsed,
        };
    }

    entry.count += 1;

    CheckAndRecordResult::Allowed {
        window_start: entry.window_start,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLEAR_FREQUENCY: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_blocks_after_max_per_period() {
        let tables = new_sharded_tables::<u32, 1>();
        let shard = &tables[0];
        let period = Duration::from_secs(60);
        let now = Instant::now();

        for _ in 0..3 {
            let result = check_and_record(shard, 7, now, 3, period, CLEAR_FREQUENCY).await;
            assert_eq!(result, CheckAndRecordResult::Allowed { window_start: now });
        }

        let later = now + Duration::from_secs(20);
        let result = check_and_record(shard, 7, later, 3, period, CLEAR_FREQUENCY).await;
        assert_eq!(
            result,
            CheckAndRecordResult::Blocked {
                over_limit: 1,
                retry_after: Duration::from_secs(40),
            }
        );

        // Other keys are unaffected
        let result = check_and_record(shard, 8, later, 3, period, CLEAR_FREQUENCY).await;
        assert_eq!(result, CheckAndRecordResult::Allowed { window_start: later });
    }

    #[tokio::test]
    async fn test_window_resets_after_period() {
        let tables = new_sharded_tables::<u32, 1>();
        let shard = &tables[0];
        let period = Duration::from_secs(60);
        let now = Instant::now();

        check_and_record(shard, 1, now, 1, period, CLEAR_FREQUENCY).await;
        assert!(matches!(
            check_and_record(shard, 1, now, 1, period, CLEAR_FREQUENCY).await,
            CheckAndRecordResult::Blocked { .. }
        ));

        let next_window = now + period;
        assert_eq!(
            check_and_record(shard, 1, next_window, 1, period, CLEAR_FREQUENCY).await,
            CheckAndRecordResult::Allowed {
                window_start: next_window
            }
        );
    }

    #[tokio::test]
    async fn test_release_returns_slot() {
        let tables = new_sharded_tables::<u32, 1>();
        let shard = &tables[0];
        let period = Duration::from_secs(60);
        let now = Instant::now();

        for _ in 0..5 {
            let CheckAndRecordResult::Allowed { window_start } =
                check_and_record(shard, 1, now, 2, period, CLEAR_FREQUENCY).await
            else {
                panic!("Released hits should not count against the limit");
            };

            release(shard, &1, window_start).await;
        }

        check_and_record(shard, 1, now, 2, period, CLEAR_FREQUENCY).await;
        check_and_record(shard, 1, now, 2, period, CLEAR_FREQUENCY).await;
        assert!(matches!(
            check_and_record(shard, 1, now, 2, period, CLEAR_FREQUENCY).await,
            CheckAndRecordResult::Blocked { over_limit: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_release_ignores_stale_window() {
        let tables = new_sharded_tables::<u32, 1>();
        let shard = &tables[0];
        let period = Duration::from_secs(60);
        let now = Instant::now();

        check_and_record(shard, 1, now, 1, period, CLEAR_FREQUENCY).await;

        let next_window = now + period;
        check_and_record(shard, 1, next_window, 1, period, CLEAR_FREQUENCY).await;

        // Releasing against the old window must not free the new window's slot
        release(shard, &1, now).await;

        assert!(matches!(
            check_and_record(shard, 1, next_window, 1, period, CLEAR_FREQUENCY).await,
            CheckAndRecordResult::Blocked { .. }
        ));
    }

    #[tokio::test]
    async fn test_clear_drops_only_expired_windows() {
        let tables = new_sharded_tables::<u32, 1>();
        let shard = &tables[0];
        let period = Duration::from_secs(60);
        let clear_frequency = Duration::from_secs(90);
        let start = shard.read().await.last_clear;

        check_and_record(shard, 1, start, 1, period, clear_frequency).await;
        check_and_record(shard, 2, start + Duration::from_secs(80), 1, period, clear_frequency)
            .await;

        // Inserting a new key after the clear frequency has passed triggers the cleanup
        let now = start + Duration::from_secs(100);
        check_and_record(shard, 3, now, 1, period, clear_frequency).await;

        let table = shard.read().await;
        assert!(!table.map.contains_key(&1));
        assert!(table.map.contains_key(&2));
        assert!(table.map.contains_key(&3));
        assert_eq!(table.last_clear, now);
    }

    #[tokio::test]
    async fn test_blocked_attempts_do_not_outlive_release() {
        let tables = new_sharded_tables::<u32, 1>();
        let shard = &tables[0];
        let period = Duration::from_secs(60);
        let now = Instant::now();

        check_and_record(shard, 1, now, 2, period, CLEAR_FREQUENCY).await;
        let CheckAndRecordResult::Allowed {
            window_start: in_flight,
        } = check_and_record(shard, 1, now, 2, period, CLEAR_FREQUENCY).await
        else {
            panic!("Second hit should be within the limit");
        };

        // Attempts blocked while a request is in flight must not eat into its released slot
        for attempt in 1..=3 {
            assert!(matches!(
                check_and_record(shard, 1, now, 2, period, CLEAR_FREQUENCY).await,
                CheckAndRecordResult::Blocked { over_limit, .. } if over_limit == attempt
            ));
        }

        release(shard, &1, in_flight).await;

        assert_eq!(
            check_and_record(shard, 1, now, 2, period, CLEAR_FREQUENCY).await,
            CheckAndRecordResult::Allowed { window_start: now }
        );
        assert!(matches!(
            check_and_record(shard, 1, now, 2, period, CLEAR_FREQUENCY).await,
            CheckAndRecordResult::Blocked { over_limit: 4, .. }
        ));
    }

    #[tokio::test]
    async fn test_over_limit_resets_with_window() {
        let tables = new_sharded_tables::<u32, 1>();
        let shard = &tables[0];
        let period = Duration::from_secs(60);
        let now = Instant::now();

        check_and_record(shard, 1, now, 1, period, CLEAR_FREQUENCY).await;
        check_and_record(shard, 1, now, 1, period, CLEAR_FREQUENCY).await;
        check_and_record(shard, 1, now, 1, period, CLEAR_FREQUENCY).await;

        let next_window = now + period;
        check_and_record(shard, 1, next_window, 1, period, CLEAR_FREQUENCY).await;
        assert!(matches!(
            check_and_record(shard, 1, next_window, 1, period, CLEAR_FREQUENCY).await,
            CheckAndRecordResult::Blocked { over_limit: 1, .. }
        ));
    }
}
