//! Per-client token-bucket admission.
//!
//! Each [`ClientTracker`] keeps one [`ClientEntry`] per client id in a
//! `DashMap`, each holding its own GCRA limiter from `governor`.
//! Lookup-or-create, last-seen refresh and token consumption all
//! happen while the entry guard is held, so requests from the same client are
//! serialized. Idle entries are dropped by [`ClientTracker::evict_idle`],
//! driven from a background loop.

use dashmap::DashMap;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;

use crate::config::TierSettings;
use crate::error::Tier;
use crate::metrics::{ADMISSIONS_DENIED, TRACKED_CLIENTS};

// Rate limit entry - one per client id
pub struct ClientEntry {
    pub limiter: DefaultDirectRateLimiter,
    pub last_seen: Instant,
}

pub struct ClientTracker {
    entries: DashMap<String, ClientEntry>,
    quota: Quota,
    idle_after: Duration,
}

impl ClientTracker {
    /// `max_requests` per `window` with a burst of `max_requests`.
    pub fn new(tier: TierSettings, idle_after: Duration) -> Self {
        let burst = NonZeroU32::new(tier.max_requests).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(tier.window / burst.get())
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);

        Self {
            entries: DashMap::new(),
            quota,
            idle_after,
        }
    }

    pub fn admit(&self, client_id: &str) -> bool {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(client_id.to_string())
            .or_insert_with(|| ClientEntry {
                limiter: RateLimiter::direct(self.quota),
                last_seen: now,
            });

        entry.last_seen = now;
        entry.limiter.check().is_ok()
    }

    /// Drop entries not seen within the idle threshold. Returns how many went.
    pub fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now())
    }

    pub fn evict_idle_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        let idle_after = self.idle_after;
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= idle_after);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.entries.contains_key(client_id)
    }
}

/// The two admission tiers applied at the HTTP boundary.
pub struct Admission {
    pub api: Arc<ClientTracker>,
    pub convert: Arc<ClientTracker>,
}

impl Admission {
    pub fn new(api: TierSettings, convert: TierSettings, idle_after: Duration) -> Self {
        Self {
            api: Arc::new(ClientTracker::new(api, idle_after)),
            convert: Arc::new(ClientTracker::new(convert, idle_after)),
        }
    }

    pub fn tracker(&self, tier: Tier) -> &Arc<ClientTracker> {
        match tier {
            Tier::Api => &self.api,
            Tier::Convert => &self.convert,
        }
    }

    pub fn admit(&self, tier: Tier, client_id: &str) -> bool {
        let allowed = self.tracker(tier).admit(client_id);
        if !allowed {
            ADMISSIONS_DENIED.with_label_values(&[tier.as_str()]).inc();
            tracing::warn!(tier = tier.as_str(), client = client_id, "Rate limit exceeded");
        }
        allowed
    }
}

// Evictor - runs every `every` for the life of the process
pub async fn run_evictor(tracker: Arc<ClientTracker>, tier: Tier, every: Duration) {
    let mut interval = interval(every);
    tracing::info!(tier = tier.as_str(), interval = ?every, "Client evictor started");

    loop {
        interval.tick().await;

        let evicted = tracker.evict_idle();
        TRACKED_CLIENTS
            .with_label_values(&[tier.as_str()])
            .set(tracker.len() as f64);
        if evicted > 0 {
            tracing::debug!(tier = tier.as_str(), evicted, remaining = tracker.len(), "Evicted idle clients");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn tier(max_requests: u32, window: Duration) -> TierSettings {
        TierSettings {
            max_requests,
            window,
        }
    }

    #[test]
    fn test_steady_client_always_admitted() {
        // 2 per 200ms = one token every 100ms
        let tracker = ClientTracker::new(tier(2, Duration::from_millis(200)), Duration::from_secs(180));

        for i in 0..10 {
            assert!(tracker.admit("10.0.0.1"), "request {i} denied");
            sleep(Duration::from_millis(120));
        }
    }

    #[test]
    fn test_burst_beyond_capacity_is_denied() {
        let tracker = ClientTracker::new(tier(20, Duration::from_secs(900)), Duration::from_secs(180));

        let admitted = (0..25).filter(|_| tracker.admit("10.0.0.2")).count();
        assert_eq!(admitted, 20);
        assert!(!tracker.admit("10.0.0.2"));
    }

    #[test]
    fn test_bucket_refills_over_time() {
        let tracker = ClientTracker::new(tier(2, Duration::from_millis(200)), Duration::from_secs(180));

        assert!(tracker.admit("c"));
        assert!(tracker.admit("c"));
        assert!(!tracker.admit("c"));
        sleep(Duration::from_millis(150));
        assert!(tracker.admit("c"));
    }

    #[test]
    fn test_clients_are_independent() {
        let tracker = ClientTracker::new(tier(1, Duration::from_secs(60)), Duration::from_secs(180));

        assert!(tracker.admit("a"));
        assert!(!tracker.admit("a"));
        assert!(tracker.admit("b"));
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_idle_entries_are_evicted() {
        let tracker = ClientTracker::new(tier(5, Duration::from_secs(60)), Duration::from_secs(180));
        let now = Instant::now();

        tracker.admit("one-shot");
        tracker.admit("regular");

        assert_eq!(tracker.evict_idle_at(now + Duration::from_secs(100)), 0);
        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.evict_idle_at(now + Duration::from_secs(400)), 2);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_recent_client_survives_eviction() {
        let tracker = ClientTracker::new(tier(5, Duration::from_secs(60)), Duration::from_millis(100));

        tracker.admit("one-shot");
        tracker.admit("regular");
        sleep(Duration::from_millis(150));
        tracker.admit("regular");

        assert_eq!(tracker.evict_idle(), 1);
        assert!(!tracker.contains("one-shot"));
        assert!(tracker.contains("regular"));
    }

    #[test]
    fn test_concurrent_admits_never_exceed_capacity() {
        let tracker = Arc::new(ClientTracker::new(tier(50, Duration::from_secs(3600)), Duration::from_secs(180)));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || (0..20).filter(|_| tracker.admit("shared")).count())
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_admission_tiers_are_separate() {
        let window = Duration::from_secs(900);
        let admission = Admission::new(tier(100, window), tier(1, window), Duration::from_secs(180));

        assert!(admission.admit(Tier::Api, "x"));
        assert!(admission.admit(Tier::Convert, "x"));
        assert!(!admission.admit(Tier::Convert, "x"));
        assert!(admission.admit(Tier::Api, "x"));
    }
}
