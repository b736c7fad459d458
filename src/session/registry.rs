//! Session registry
//!
//! Owns every active [`Session`] keyed by SSRC. Sessions are created on the
//! first datagram bearing a new SSRC and live until retired explicitly (or
//! by idle eviction, when the engine is configured for it).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::audio::jitter::JitterConfig;
use crate::audio::level::LevelConfig;
use crate::error::SessionError;
use crate::protocol::{round_to, SessionSnapshot};
use crate::session::talker::Session;

pub struct SessionRegistry {
    sessions: HashMap<u32, Session>,
    names: HashMap<u32, String>,
    jitter: JitterConfig,
    meter: LevelConfig,
}

impl SessionRegistry {
    pub fn new(names: HashMap<u32, String>, jitter: JitterConfig, meter: LevelConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            names,
            jitter,
            meter,
        }
    }

    /// Display name for an SSRC: the configured name, or `SSRC <n>`.
    pub fn display_name(&self, ssrc: u32) -> String {
        self.names
            .get(&ssrc)
            .cloned()
            .unwrap_or_else(|| format!("SSRC {}", ssrc))
    }

    /// Look up a session, creating it if this SSRC is new.
    ///
    /// The flag is true when the session was created by this call.
    pub fn get_or_create(&mut self, ssrc: u32, now: Instant) -> (&mut Session, bool) {
        let mut created = false;
        let (names, jitter, meter) = (&self.names, &self.jitter, &self.meter);
        let session = self.sessions.entry(ssrc).or_insert_with(|| {
            created = true;
            let name = names
                .get(&ssrc)
                .cloned()
                .unwrap_or_else(|| format!("SSRC {}", ssrc));
            tracing::debug!("New talker {} ({})", ssrc, name);
            Session::new(ssrc, name, jitter.clone(), meter.clone(), now)
        });
        (session, created)
    }

    /// Remove a session.
    pub fn retire(&mut self, ssrc: u32) -> Result<Session, SessionError> {
        let session = self.sessions.remove(&ssrc).ok_or(SessionError::NotFound(ssrc))?;
        tracing::debug!("Retired talker {} ({})", ssrc, session.name());
        Ok(session)
    }

    /// Retire every session idle for at least `timeout`. Returns their SSRCs.
    pub fn evict_idle(&mut self, now: Instant, timeout: Duration) -> Vec<u32> {
        let stale: Vec<u32> = self
            .sessions
            .values()
            .filter(|s| now.saturating_duration_since(s.last_activity()) >= timeout)
            .map(|s| s.ssrc())
            .collect();
        for ssrc in &stale {
            let _ = self.retire(*ssrc);
        }
        stale
    }

    /// Replace the name table; existing sessions pick up new names.
    pub fn set_names(&mut self, names: HashMap<u32, String>) {
        self.names = names;
        let names = &self.names;
        for session in self.sessions.values_mut() {
            let name = names
                .get(&session.ssrc())
                .cloned()
                .unwrap_or_else(|| format!("SSRC {}", session.ssrc()));
            session.set_name(name);
        }
    }

    pub fn get(&self, ssrc: u32) -> Option<&Session> {
        self.sessions.get(&ssrc)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.values_mut()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Point-in-time view of every session, sorted by name then SSRC.
    pub fn snapshot(&self, now: Instant) -> Vec<SessionSnapshot> {
        let mut out: Vec<SessionSnapshot> = self
            .sessions
            .values()
            .map(|s| SessionSnapshot {
                ssrc: s.ssrc(),
                name: s.name().to_string(),
                packets: s.packets(),
                level_db: s.level_db().map(|db| round_to(db, 1)),
                last_seen_sec: round_to(now.saturating_duration_since(s.last_activity()).as_secs_f64(), 2),
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.ssrc.cmp(&b.ssrc)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SessionRegistry {
        let names = HashMap::from([(12_345_678, "Unit A".to_string()), (23_456_789, "Unit B".to_string())]);
        SessionRegistry::new(
            names,
            JitterConfig::new(48000, Duration::from_millis(50)),
            LevelConfig::new(48000, Duration::from_millis(100), Duration::from_millis(500)),
        )
    }

    #[test]
    fn test_created_once_per_ssrc() {
        let mut reg = registry();
        let now = Instant::now();
        assert!(reg.get_or_create(5, now).1);
        assert!(!reg.get_or_create(5, now).1);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_display_names() {
        let reg = registry();
        assert_eq!(reg.display_name(12_345_678), "Unit A");
        assert_eq!(reg.display_name(42), "SSRC 42");
    }

    #[test]
    fn test_snapshot_sorted_by_name_then_ssrc() {
        let mut reg = registry();
        let now = Instant::now();
        for ssrc in [23_456_789, 99, 12_345_678, 7] {
            reg.get_or_create(ssrc, now);
        }
        let order: Vec<u32> = reg.snapshot(now).iter().map(|s| s.ssrc).collect();
        // "SSRC 7" < "SSRC 99" < "Unit A" < "Unit B"
        assert_eq!(order, vec![7, 99, 12_345_678, 23_456_789]);
        assert!(reg.snapshot(now).iter().all(|s| s.level_db.is_none()));
    }

    #[test]
    fn test_retire() {
        let mut reg = registry();
        reg.get_or_create(1, Instant::now());
        assert!(reg.retire(1).is_ok());
        assert!(matches!(reg.retire(1), Err(SessionError::NotFound(1))));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_evict_idle() {
        let mut reg = registry();
        let t0 = Instant::now();
        reg.get_or_create(1, t0);
        reg.get_or_create(2, t0 + Duration::from_secs(5));
        let evicted = reg.evict_idle(t0 + Duration::from_secs(10), Duration::from_secs(8));
        assert_eq!(evicted, vec![1]);
        assert!(reg.get(2).is_some());
    }

    #[test]
    fn test_rename_applies_to_live_sessions() {
        let mut reg = registry();
        reg.get_or_create(42, Instant::now());
        reg.set_names(HashMap::from([(42, "Stage".to_string())]));
        assert_eq!(reg.get(42).unwrap().name(), "Stage");
    }

    proptest::proptest! {
        #[test]
        fn prop_one_session_per_ssrc(ssrcs in proptest::collection::vec(0u32..16, 0..200)) {
            let mut reg = registry();
            let now = Instant::now();
            let mut expected: HashMap<u32, u64> = HashMap::new();
            for ssrc in &ssrcs {
                let (_, created) = reg.get_or_create(*ssrc, now);
                let seen = expected.entry(*ssrc).or_insert(0);
                proptest::prop_assert_eq!(created, *seen == 0);
                *seen += 1;
            }
            proptest::prop_assert_eq!(reg.len(), expected.len());
            let snap = reg.snapshot(now);
            proptest::prop_assert_eq!(snap.len(), expected.len());
        }
    }
}
