//! Fragment reassembly for one inbound channel.
//!
//! Large messages are split by the sender into fragments that share a group
//! id. Each fragment carries its number, its own byte size and the size of the
//! whole message in bits.
//!
//! # Fragment Lifecycle
//!
//! 1. **Reception**: the first fragment of an unseen group id creates a
//!    [`FragmentGroup`]; later fragments with that id are appended to it.
//! 2. **Completion**: once the byte sizes of the received fragments add up to
//!    at least `ceil(total_bits / 8)`, the fragments are stably sorted by
//!    fragment number, concatenated, and the group is removed.
//! 3. **Expiry**: groups that never complete are only discarded when the
//!    configured policy says so: an optional age limit
//!    ([`Config::fragment_group_timeout`]) and a cap on pending groups
//!    ([`Config::max_pending_fragment_groups`]) that evicts the oldest group.
//!
//! Duplicate or out-of-range fragment numbers are not detected: a duplicate
//! counts towards the byte total like any other fragment.
//!
//! [`Config::fragment_group_timeout`]: tether_core::config::Config::fragment_group_timeout
//! [`Config::max_pending_fragment_groups`]: tether_core::config::Config::max_pending_fragment_groups

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use tether_core::{config::Config, shared::SharedBytes};
use tether_protocol::header::{FragmentHeader, LibraryHeader};

/// Fragments received so far for one group id.
#[derive(Debug)]
pub struct FragmentGroup {
    /// Library header of the first fragment; kind, channel and sequence of the message
    header: LibraryHeader,
    /// Fragments in arrival order
    fragments: Vec<(FragmentHeader, SharedBytes)>,
    /// Sum of the `fragment_size` fields received
    received_bytes: usize,
    /// When the first fragment arrived
    created_at: Instant,
}

impl FragmentGroup {
    /// Creates an empty group for a message described by `header`.
    pub fn new(header: LibraryHeader, created_at: Instant) -> Self {
        Self { header, fragments: Vec::new(), received_bytes: 0, created_at }
    }

    /// Appends a fragment and returns the running byte total.
    pub fn add_fragment(&mut self, fragment: FragmentHeader, payload: SharedBytes) -> usize {
        self.received_bytes += fragment.fragment_size as usize;
        self.fragments.push((fragment, payload));
        self.received_bytes
    }

    /// Returns the sum of received fragment sizes.
    pub fn received_bytes(&self) -> usize {
        self.received_bytes
    }

    /// Returns the number of fragments received.
    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// Returns the header the message will be delivered with.
    pub fn header(&self) -> &LibraryHeader {
        &self.header
    }

    /// Returns when the first fragment arrived.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Concatenates the fragments ordered by fragment number.
    ///
    /// The sort is stable, so fragments sharing a number keep arrival order.
    /// Each fragment contributes at most `fragment_size` bytes.
    pub fn reassemble(mut self) -> Vec<u8> {
        self.fragments.sort_by_key(|(fragment, _)| fragment.fragment_number);

        let mut result = Vec::with_capacity(self.received_bytes);
        for (fragment, payload) in &self.fragments {
            let len = (fragment.fragment_size as usize).min(payload.len());
            result.extend_from_slice(&payload[..len]);
        }
        result
    }
}

/// A message rebuilt from its fragments.
#[derive(Debug, Clone, PartialEq)]
pub struct Reassembled {
    /// Header of the first fragment received
    pub header: LibraryHeader,
    /// Concatenated payload
    pub payload: Vec<u8>,
}

/// Pending fragment groups of one channel, keyed by group id.
#[derive(Debug)]
pub struct FragmentGroups {
    groups: HashMap<u32, FragmentGroup>,
    /// Max pending groups (0 = unlimited)
    max_pending: usize,
    /// Age limit for incomplete groups
    timeout: Option<Duration>,
}

impl FragmentGroups {
    /// Creates an empty set with the expiry policy from `config`.
    pub fn new(config: &Config) -> Self {
        Self {
            groups: HashMap::new(),
            max_pending: config.max_pending_fragment_groups,
            timeout: config.fragment_group_timeout,
        }
    }

    /// Returns the number of incomplete groups.
    pub fn pending(&self) -> usize {
        self.groups.len()
    }

    /// Returns true if a group with this id is pending.
    #[cfg(test)]
    pub fn contains(&self, group_id: u32) -> bool {
        self.groups.contains_key(&group_id)
    }

    /// Adds a fragment, returning the reassembled message if its group just completed.
    ///
    /// `evicted` is incremented for every group dropped to make room.
    pub fn insert(
        &mut self,
        header: LibraryHeader,
        fragment: FragmentHeader,
        payload: SharedBytes,
        time: Instant,
        evicted: &mut u64,
    ) -> Option<Reassembled> {
        if !self.groups.contains_key(&fragment.group_id) {
            *evicted += self.make_room() as u64;
        }

        let group = self
            .groups
            .entry(fragment.group_id)
            .or_insert_with(|| FragmentGroup::new(header, time));
        let received = group.add_fragment(fragment, payload);

        if received < fragment.total_bytes() {
            tracing::trace!(
                "Fragment group {} pending: {}/{} bytes",
                fragment.group_id,
                received,
                fragment.total_bytes()
            );
            return None;
        }

        let group = self.groups.remove(&fragment.group_id)?;
        let header = *group.header();
        Some(Reassembled { header, payload: group.reassemble() })
    }

    /// Evicts the oldest groups until one more fits under the cap.
    fn make_room(&mut self) -> usize {
        if self.max_pending == 0 {
            return 0;
        }
        let mut evicted = 0;
        while self.groups.len() >= self.max_pending {
            let oldest = self
                .groups
                .iter()
                .min_by_key(|(_, group)| group.created_at())
                .map(|(id, _)| *id);
            match oldest {
                Some(id) => {
                    self.groups.remove(&id);
                    evicted += 1;
                }
                None => break,
            }
        }
        if evicted > 0 {
            tracing::warn!(
                "Evicted {} incomplete fragment group(s): more than {} pending",
                evicted,
                self.max_pending
            );
        }
        evicted
    }

    /// Removes groups older than the configured timeout. Returns how many were removed.
    pub fn cleanup_stale(&mut self, time: Instant) -> usize {
        let Some(timeout) = self.timeout else {
            return 0;
        };

        let before = self.groups.len();
        self.groups
            .retain(|_, group| time.saturating_duration_since(group.created_at()) <= timeout);
        let removed = before - self.groups.len();

        if removed > 0 {
            tracing::warn!(
                "Cleaning up {} stale fragment group(s) that timed out after {:?}",
                removed,
                timeout
            );
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use tether_protocol::message::MessageKind;

    use super::*;

    fn header() -> LibraryHeader {
        LibraryHeader::new(MessageKind::Data, 0, 0).fragmented()
    }

    fn fragment(group_id: u32, number: u16, size: u16, total_bits: u32) -> FragmentHeader {
        FragmentHeader { group_id, fragment_number: number, fragment_size: size, total_bits }
    }

    fn filled(byte: u8, size: usize) -> SharedBytes {
        SharedBytes::from_vec(vec![byte; size])
    }

    #[test]
    fn test_group_reassembles_by_fragment_number() {
        let mut groups = FragmentGroups::new(&Config::default());
        let time = Instant::now();
        let mut evicted = 0;

        assert!(groups
            .insert(header(), fragment(7, 1, 100, 2000), filled(1, 100), time, &mut evicted)
            .is_none());
        assert!(groups
            .insert(header(), fragment(7, 0, 100, 2000), filled(0, 100), time, &mut evicted)
            .is_none());
        assert!(groups.contains(7));

        let done = groups
            .insert(header(), fragment(7, 2, 50, 2000), filled(2, 50), time, &mut evicted)
            .unwrap();

        let mut expected = vec![0u8; 100];
        expected.extend(vec![1u8; 100]);
        expected.extend(vec![2u8; 50]);
        assert_eq!(done.payload, expected);
        assert_eq!(groups.pending(), 0);
        assert_eq!(evicted, 0);
    }

    #[test]
    fn test_group_below_threshold_stays_pending() {
        let mut groups = FragmentGroups::new(&Config::default());
        let time = Instant::now();
        let mut evicted = 0;

        groups.insert(header(), fragment(1, 0, 10, 160), filled(0, 10), time, &mut evicted);
        groups.insert(header(), fragment(1, 1, 9, 160), filled(1, 9), time, &mut evicted);

        assert_eq!(groups.pending(), 1);
        assert_eq!(groups.cleanup_stale(time + Duration::from_secs(3600)), 0);
        assert_eq!(groups.pending(), 1);
    }

    #[test]
    fn test_duplicate_numbers_keep_arrival_order() {
        let mut group = FragmentGroup::new(header(), Instant::now());
        group.add_fragment(fragment(3, 1, 1, 24), filled(b'b', 1));
        group.add_fragment(fragment(3, 0, 1, 24), filled(b'x', 1));
        group.add_fragment(fragment(3, 0, 1, 24), filled(b'y', 1));
        assert_eq!(group.received_bytes(), 3);
        assert_eq!(group.fragment_count(), 3);
        assert_eq!(group.reassemble(), b"xyb".to_vec());
    }

    #[test]
    fn test_fragment_size_bounds_copied_bytes() {
        let mut group = FragmentGroup::new(header(), Instant::now());
        group.add_fragment(fragment(3, 0, 2, 16), filled(5, 4));
        assert_eq!(group.reassemble(), vec![5, 5]);
    }

    #[test]
    fn test_cap_evicts_oldest_group() {
        let mut config = Config::default();
        config.max_pending_fragment_groups = 2;
        let mut groups = FragmentGroups::new(&config);
        let start = Instant::now();
        let mut evicted = 0;

        for (i, group_id) in [10u32, 11, 12].into_iter().enumerate() {
            let time = start + Duration::from_millis(i as u64);
            groups.insert(header(), fragment(group_id, 0, 1, 80), filled(0, 1), time, &mut evicted);
        }

        assert_eq!(evicted, 1);
        assert_eq!(groups.pending(), 2);
        assert!(!groups.contains(10));
        assert!(groups.contains(11));
        assert!(groups.contains(12));
    }

    #[test]
    fn test_timeout_removes_only_stale_groups() {
        let mut config = Config::default();
        config.fragment_group_timeout = Some(Duration::from_secs(5));
        let mut groups = FragmentGroups::new(&config);
        let start = Instant::now();
        let mut evicted = 0;

        groups.insert(header(), fragment(100, 0, 1, 80), filled(0, 1), start, &mut evicted);
        let later = start + Duration::from_secs(6);
        groups.insert(header(), fragment(200, 0, 1, 80), filled(0, 1), later, &mut evicted);

        assert_eq!(groups.cleanup_stale(later), 1);
        assert!(groups.contains(200));
        assert!(!groups.contains(100));
    }
}
