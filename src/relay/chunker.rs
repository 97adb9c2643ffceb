//! Splits an incoming byte stream into fixed-size chunks with one frame of lookahead.

// crates.io
use bytes::BytesMut;
use futures::{Stream, StreamExt};
// self
use crate::{_prelude::*, storage::ChunkUpload};

/// Pulls frames from `S` and yields [`ChunkUpload`]s of exactly `chunk_size` bytes, except the
/// final one, which is flagged `last` as soon as the stream is known to be exhausted.
///
/// At most one chunk plus one frame is buffered at a time.
pub(crate) struct Chunker<S> {
	stream: S,
	chunk_size: usize,
	buf: BytesMut,
	offset: u64,
	exhausted: bool,
	finished: bool,
}
impl<S, E> Chunker<S>
where
	S: Stream<Item = Result<Bytes, E>> + Unpin,
{
	pub(crate) fn new(stream: S, chunk_size: usize) -> Self {
		Self {
			stream,
			chunk_size,
			buf: BytesMut::new(),
			offset: 0,
			exhausted: false,
			finished: false,
		}
	}

	/// Next chunk, or `None` once the final chunk has been handed out (or the stream was empty).
	pub(crate) async fn next_chunk(&mut self) -> Result<Option<ChunkUpload>, E> {
		if self.finished {
			return Ok(None);
		}

		// Buffer one byte past the chunk boundary so `last` is known before the chunk leaves.
		while self.buf.len() <= self.chunk_size && !self.exhausted {
			match self.stream.next().await {
				Some(frame) => self.buf.extend_from_slice(&frame?),
				None => self.exhausted = true,
			}
		}

		if self.buf.is_empty() {
			self.finished = true;

			return Ok(None);
		}

		let last = self.exhausted && self.buf.len() <= self.chunk_size;
		let data = self.buf.split_to(self.buf.len().min(self.chunk_size)).freeze();
		let chunk = ChunkUpload { offset: self.offset, data, last };

		self.offset = chunk.end();
		self.finished = last;

		Ok(Some(chunk))
	}
}
