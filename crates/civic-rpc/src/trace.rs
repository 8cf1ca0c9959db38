//! Bounded request trace history.

use civic_types::RequestTrace;

/// Number of traces kept by the manager.
pub const TRACE_CAPACITY: usize = 100;

/// Fixed-size ring of traces with a write cursor.
///
/// Appending is O(1); once full, each append overwrites the oldest trace.
#[derive(Debug, Clone)]
pub struct TraceBuffer {
	slots: Vec<Option<RequestTrace>>,
	/// Slot the next trace is written to.
	cursor: usize,
	len: usize,
}

impl Default for TraceBuffer {
	fn default() -> Self {
		Self::with_capacity(TRACE_CAPACITY)
	}
}

impl TraceBuffer {
	/// Creates a ring holding at most `capacity` traces (at least one).
	pub fn with_capacity(capacity: usize) -> Self {
		let capacity = capacity.max(1);
		Self {
			slots: vec![None; capacity],
			cursor: 0,
			len: 0,
		}
	}

	pub fn push(&mut self, trace: RequestTrace) {
		self.slots[self.cursor] = Some(trace);
		self.cursor = (self.cursor + 1) % self.slots.len();
		self.len = (self.len + 1).min(self.slots.len());
	}

	/// Returns up to `limit` traces, most recent first.
	pub fn recent(&self, limit: usize) -> Vec<RequestTrace> {
		let capacity = self.slots.len();
		(1..=self.len.min(limit))
			.filter_map(|back| self.slots[(self.cursor + capacity - back) % capacity].clone())
			.collect()
	}
}
