//! Per-epoch utterance deduplication.

use std::collections::HashSet;

use crate::geometry::{Proximity, Zone};

/// Identity of an object announcement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnnouncementKey {
    pub label: String,
    pub zone: Zone,
    pub proximity: Proximity,
}

impl AnnouncementKey {
    pub fn new(label: impl Into<String>, zone: Zone, proximity: Proximity) -> Self {
        Self {
            label: label.into(),
            zone,
            proximity,
        }
    }
}

/// Remembers which (label, zone, proximity) triples were spoken since the last
/// clear-path reset. A triple is spoken at most once per epoch no matter how
/// many frames re-detect it.
#[derive(Debug, Clone, Default)]
pub struct Deduplicator {
    announced: HashSet<AnnouncementKey>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn should_announce(&self, key: &AnnouncementKey) -> bool {
        !self.announced.contains(key)
    }

    pub fn record(&mut self, key: AnnouncementKey) {
        self.announced.insert(key);
    }

    pub fn reset(&mut self) {
        self.announced.clear();
    }

    pub fn len(&self) -> usize {
        self.announced.len()
    }

    pub fn is_empty(&self) -> bool {
        self.announced.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_suppresses() {
        let mut dedup = Deduplicator::new();
        let key = AnnouncementKey::new("person", Zone::Left, Proximity::Far);
        assert!(dedup.should_announce(&key));
        dedup.record(key.clone());
        assert!(!dedup.should_announce(&key));
        dedup.record(key);
        assert_eq!(dedup.len(), 1);
    }

    #[test]
    fn any_component_change_is_a_new_key() {
        let mut dedup = Deduplicator::new();
        dedup.record(AnnouncementKey::new("person", Zone::Left, Proximity::Far));
        assert!(dedup.should_announce(&AnnouncementKey::new("person", Zone::Center, Proximity::Far)));
        assert!(dedup.should_announce(&AnnouncementKey::new("person", Zone::Left, Proximity::Close)));
        assert!(dedup.should_announce(&AnnouncementKey::new("dog", Zone::Left, Proximity::Far)));
    }

    #[test]
    fn reset_starts_new_epoch() {
        let mut dedup = Deduplicator::new();
        let key = AnnouncementKey::new("car", Zone::Right, Proximity::VeryClose);
        dedup.record(key.clone());
        dedup.reset();
        assert!(dedup.is_empty());
        assert!(dedup.should_announce(&key));
    }
}
