// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for relayed uploads.
#[derive(Debug, Default)]
pub struct RelayMetrics {
	uploads: AtomicU64,
	completed: AtomicU64,
	failed: AtomicU64,
	chunks: AtomicU64,
	retries: AtomicU64,
	bytes: AtomicU64,
}
impl RelayMetrics {
	/// Uploads started.
	pub fn uploads(&self) -> u64 {
		self.uploads.load(Ordering::Relaxed)
	}

	/// Uploads that produced a remote object.
	pub fn completed(&self) -> u64 {
		self.completed.load(Ordering::Relaxed)
	}

	/// Uploads that ended in any error.
	pub fn failed(&self) -> u64 {
		self.failed.load(Ordering::Relaxed)
	}

	/// Chunks acknowledged by the remote.
	pub fn chunks(&self) -> u64 {
		self.chunks.load(Ordering::Relaxed)
	}

	/// Retries of chunk sends and session opens.
	pub fn retries(&self) -> u64 {
		self.retries.load(Ordering::Relaxed)
	}

	/// Bytes of completed objects.
	pub fn bytes(&self) -> u64 {
		self.bytes.load(Ordering::Relaxed)
	}

	pub(crate) fn record_start(&self) {
		self.uploads.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_chunk(&self) {
		self.chunks.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_retries(&self, retries: u32) {
		self.retries.fetch_add(u64::from(retries), Ordering::Relaxed);
	}

	pub(crate) fn record_completed(&self, bytes: u64) {
		self.completed.fetch_add(1, Ordering::Relaxed);
		self.bytes.fetch_add(bytes, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failed.fetch_add(1, Ordering::Relaxed);
	}
}
