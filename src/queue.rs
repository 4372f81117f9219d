//! Bounded FIFO of keys awaiting a fetch.

// std
use std::collections::{HashSet, VecDeque};
// self
use crate::key::EnrichKey;

/// Result of [`PendingQueue::push`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
	/// The key was appended.
	Queued,
	/// The key is already pending.
	Duplicate,
	/// The queue is at capacity; the key was dropped.
	Full,
}

/// FIFO queue with O(1) membership checks and a hard capacity.
#[derive(Clone, Debug)]
pub struct PendingQueue {
	order: VecDeque<EnrichKey>,
	members: HashSet<EnrichKey>,
	capacity: usize,
}
impl PendingQueue {
	/// Creates an empty queue holding at most `capacity` keys.
	pub fn new(capacity: usize) -> Self {
		Self { order: VecDeque::new(), members: HashSet::new(), capacity }
	}

	/// Appends `key` unless it is already pending or the queue is full.
	pub fn push(&mut self, key: EnrichKey) -> PushOutcome {
		if self.members.contains(&key) {
			return PushOutcome::Duplicate;
		}
		if self.order.len() >= self.capacity {
			return PushOutcome::Full;
		}

		self.members.insert(key.clone());
		self.order.push_back(key);

		PushOutcome::Queued
	}

	/// Removes and returns the oldest pending key.
	pub fn pop(&mut self) -> Option<EnrichKey> {
		let key = self.order.pop_front()?;

		self.members.remove(&key);

		Some(key)
	}

	/// Returns `true` if `key` is pending.
	pub fn contains(&self, key: &str) -> bool {
		self.members.contains(key)
	}

	/// Drops every pending key.
	pub fn clear(&mut self) {
		self.order.clear();
		self.members.clear();
	}

	/// Iterates pending keys in FIFO order.
	pub fn iter(&self) -> impl Iterator<Item = &EnrichKey> {
		self.order.iter()
	}

	/// Number of pending keys.
	pub fn len(&self) -> usize {
		self.order.len()
	}

	/// Returns `true` if nothing is pending.
	pub fn is_empty(&self) -> bool {
		self.order.is_empty()
	}

	/// Maximum number of pending keys.
	pub fn capacity(&self) -> usize {
		self.capacity
	}
}
