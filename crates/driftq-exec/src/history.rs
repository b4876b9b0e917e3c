//! History of recently demoted and removed brokers.

use chrono::Utc;
use dashmap::DashMap;
use driftq_cluster::types::BrokerId;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Sentinel start time marking an entry that never expires.
pub const PERMANENT_MARK_MS: i64 = 0;

/// Two broker → start-time maps with retention and permanent markers.
///
/// Entries are written when a demotion or removal begins and swept once
/// older than the configured retention, except permanent ones. The maps
/// allow concurrent reads and writes; the sweeper runs on its own timer.
#[derive(Debug)]
pub struct BrokerHistory {
    demoted: DashMap<BrokerId, i64>,
    removed: DashMap<BrokerId, i64>,
    demotion_retention_ms: i64,
    removal_retention_ms: i64,
}

impl BrokerHistory {
    pub fn new(demotion_retention_ms: i64, removal_retention_ms: i64) -> Self {
        Self {
            demoted: DashMap::new(),
            removed: DashMap::new(),
            demotion_retention_ms,
            removal_retention_ms,
        }
    }

    /// Record that a demotion of the broker started now. A permanent entry
    /// is never overwritten.
    pub fn note_demotion_start(&self, broker: BrokerId, now_ms: i64) {
        Self::note_start(&self.demoted, broker, now_ms);
    }

    /// Record that a removal of the broker started now. A permanent entry
    /// is never overwritten.
    pub fn note_removal_start(&self, broker: BrokerId, now_ms: i64) {
        Self::note_start(&self.removed, broker, now_ms);
    }

    fn note_start(map: &DashMap<BrokerId, i64>, broker: BrokerId, now_ms: i64) {
        map.entry(broker)
            .and_modify(|start| {
                if *start != PERMANENT_MARK_MS {
                    *start = now_ms;
                }
            })
            .or_insert(now_ms);
    }

    pub fn mark_demotion_permanent(&self, brokers: &[BrokerId]) {
        for broker in brokers {
            self.demoted.insert(*broker, PERMANENT_MARK_MS);
        }
    }

    pub fn mark_removal_permanent(&self, brokers: &[BrokerId]) {
        for broker in brokers {
            self.removed.insert(*broker, PERMANENT_MARK_MS);
        }
    }

    pub fn drop_demotions(&self, brokers: &[BrokerId]) {
        for broker in brokers {
            self.demoted.remove(broker);
        }
    }

    pub fn drop_removals(&self, brokers: &[BrokerId]) {
        for broker in brokers {
            self.removed.remove(broker);
        }
    }

    pub fn demotion_start(&self, broker: BrokerId) -> Option<i64> {
        self.demoted.get(&broker).map(|e| *e)
    }

    pub fn removal_start(&self, broker: BrokerId) -> Option<i64> {
        self.removed.get(&broker).map(|e| *e)
    }

    pub fn recently_demoted(&self) -> Vec<BrokerId> {
        self.demoted.iter().map(|e| *e.key()).collect()
    }

    pub fn recently_removed(&self) -> Vec<BrokerId> {
        self.removed.iter().map(|e| *e.key()).collect()
    }

    /// Drop entries older than the retention. Permanent entries stay.
    pub fn sweep(&self, now_ms: i64) {
        let demotion_retention = self.demotion_retention_ms;
        self.demoted
            .retain(|_, start| *start == PERMANENT_MARK_MS || now_ms - *start <= demotion_retention);

        let removal_retention = self.removal_retention_ms;
        self.removed
            .retain(|_, start| *start == PERMANENT_MARK_MS || now_ms - *start <= removal_retention);
    }

    /// Start the periodic sweeper on its own timer.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let history = Arc::clone(self);
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                timer.tick().await;
                history.sweep(Utc::now().timestamp_millis());
                tracing::trace!("Swept broker history");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> BrokerHistory {
        BrokerHistory::new(1_000, 2_000)
    }

    #[test]
    fn test_note_start_and_query() {
        let h = history();
        h.note_demotion_start(BrokerId(1), 100);
        h.note_removal_start(BrokerId(2), 200);

        assert_eq!(h.demotion_start(BrokerId(1)), Some(100));
        assert_eq!(h.removal_start(BrokerId(2)), Some(200));
        assert_eq!(h.demotion_start(BrokerId(2)), None);
    }

    #[test]
    fn test_note_start_updates_non_permanent() {
        let h = history();
        h.note_demotion_start(BrokerId(1), 100);
        h.note_demotion_start(BrokerId(1), 500);
        assert_eq!(h.demotion_start(BrokerId(1)), Some(500));
    }

    #[test]
    fn test_permanent_is_not_overwritten_by_note_start() {
        let h = history();
        h.mark_demotion_permanent(&[BrokerId(1)]);
        h.note_demotion_start(BrokerId(1), 500);
        assert_eq!(h.demotion_start(BrokerId(1)), Some(PERMANENT_MARK_MS));
    }

    #[test]
    fn test_sweep_respects_retention_boundary() {
        let h = history();
        h.note_demotion_start(BrokerId(1), 1_000);
        h.note_demotion_start(BrokerId(2), 3_000);

        // Retention 1000: entry at 1000 is exactly at the boundary at 2000
        h.sweep(2_000);
        assert_eq!(h.demotion_start(BrokerId(1)), Some(1_000));

        // One past the boundary it is gone
        h.sweep(2_001);
        assert_eq!(h.demotion_start(BrokerId(1)), None);
        assert_eq!(h.demotion_start(BrokerId(2)), Some(3_000));
    }

    #[test]
    fn test_sweep_never_removes_permanent_entries() {
        let h = history();
        h.mark_removal_permanent(&[BrokerId(7)]);
        h.sweep(i64::MAX);
        assert_eq!(h.removal_start(BrokerId(7)), Some(PERMANENT_MARK_MS));
    }

    #[test]
    fn test_maps_have_independent_retention() {
        let h = history();
        h.note_demotion_start(BrokerId(1), 0);
        h.note_removal_start(BrokerId(1), 0);

        h.sweep(1_500);
        // Demotion retention is 1000, removal retention 2000
        assert_eq!(h.demotion_start(BrokerId(1)), None);
        assert_eq!(h.removal_start(BrokerId(1)), Some(0));
    }

    #[test]
    fn test_drop_removes_entries() {
        let h = history();
        h.note_demotion_start(BrokerId(1), 100);
        h.mark_demotion_permanent(&[BrokerId(2)]);

        h.drop_demotions(&[BrokerId(1), BrokerId(2)]);
        assert!(h.recently_demoted().is_empty());
    }
}
