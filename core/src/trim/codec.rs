// Copyright 2019 The Grin Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Lag-window coding of bucket record prefixes. Writers emit values in
//! (almost) non-decreasing order, so records only store the low bits; the
//! reader reconstructs the full value from the previous one, interpreting
//! small implied backward jumps as jitter and anything larger as wrap-around.

/// Codec over a fixed number of stored low bits
#[derive(Clone, Copy, Debug)]
pub struct LagCodec {
	mask: u64,
	lag: u64,
}

impl LagCodec {
	/// New codec storing `bits` low bits. The lag window is a quarter of the
	/// representable range.
	pub fn new(bits: u32) -> LagCodec {
		let mask = (1u64 << bits) - 1;
		LagCodec {
			mask,
			lag: mask >> 2,
		}
	}

	/// The lag window
	pub fn lag(&self) -> u64 {
		self.lag
	}

	/// Low bits actually stored in the record
	#[inline]
	pub fn encode(&self, value: u64) -> u64 {
		value & self.mask
	}

	/// Reconstruct a value from its stored low bits and the previously
	/// decoded value. Valid as long as the true value lies within
	/// [prev - lag, prev - lag + 2^bits).
	#[inline]
	pub fn decode(&self, prev: u64, low: u64) -> u64 {
		let base = prev.saturating_sub(self.lag);
		base + (low.wrapping_sub(base) & self.mask)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use rand::{thread_rng, Rng};

	#[test]
	fn round_trip_increasing_stream() {
		let codec = LagCodec::new(18);
		let max_gap = (1u64 << 18) - codec.lag() - 1;
		let mut rng = thread_rng();
		let mut value = 0u64;
		let mut prev = codec.lag();
		for _ in 0..10_000 {
			value += rng.gen_range(0, max_gap) + 1;
			let decoded = codec.decode(prev, codec.encode(value));
			assert_eq!(decoded, value);
			prev = decoded;
		}
	}

	#[test]
	fn tolerates_jitter_within_lag() {
		let codec = LagCodec::new(8);
		let prev = 1000u64;
		for delta in 0..codec.lag() {
			let value = prev - delta;
			assert_eq!(codec.decode(prev, codec.encode(value)), value);
		}
	}

	#[test]
	fn wide_codec_is_exact() {
		// when the stored width covers the whole domain, decoding is the
		// identity no matter the previous value
		let codec = LagCodec::new(31);
		for &v in &[0u64, 1, 77, 1 << 20, (1 << 31) - 1] {
			assert_eq!(codec.decode(12345, codec.encode(v)), v);
		}
	}

	#[test]
	fn gap_past_window_wraps() {
		let codec = LagCodec::new(8);
		// a gap of the full range aliases back onto itself
		let prev = 500u64;
		let value = prev + 256;
		assert_eq!(codec.decode(prev, codec.encode(value)), prev);
	}
}
