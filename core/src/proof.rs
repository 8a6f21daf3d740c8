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

//! A Cuckoo Cycle proof of work: the edge_bits giving the graph size and the
//! sorted nonces of the cycle edges, plus its canonical BLAKE2b-256 digest.

use std::fmt;
use std::iter;

use blake2::blake2b::blake2b;
use byteorder::{LittleEndian, WriteBytesExt};
use rand::{thread_rng, Rng};

use crate::error::Error;
use crate::params::EDGEBITS;

/// A Cuckoo Cycle proof of work, consisting of the edge_bits to get the graph
/// size and the nonces of the graph solution. While being expressed as u64
/// for simplicity, nonces a.k.a. edge indices range from 0 to
/// (1 << edge_bits) - 1.
#[derive(Clone, PartialOrd, PartialEq, Serialize, Deserialize)]
pub struct Proof {
	/// Power of 2 used for the size of the cuckoo graph
	pub edge_bits: u32,
	/// The nonces
	pub nonces: Vec<u64>,
}

impl fmt::Debug for Proof {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Cuckoo{}(", self.edge_bits)?;
		for (i, val) in self.nonces[..].iter().enumerate() {
			write!(f, "{:x}", val)?;
			if i < self.nonces.len() - 1 {
				write!(f, " ")?;
			}
		}
		write!(f, ")")
	}
}

impl Eq for Proof {}

impl Proof {
	/// Builds a proof with provided nonces at default edge_bits
	pub fn new(mut in_nonces: Vec<u64>) -> Proof {
		in_nonces.sort_unstable();
		Proof {
			edge_bits: EDGEBITS,
			nonces: in_nonces,
		}
	}

	/// Builds a proof with all bytes zeroed out
	pub fn zero(proof_size: usize) -> Proof {
		Proof {
			edge_bits: EDGEBITS,
			nonces: vec![0; proof_size],
		}
	}

	/// Builds a proof with random data, so tests that don't care about the
	/// actual cycle still get distinct proofs
	pub fn random(proof_size: usize) -> Proof {
		let nonce_mask = (1u64 << EDGEBITS) - 1;
		let mut rng = thread_rng();
		let mut v: Vec<u64> = iter::repeat(())
			.map(|()| rng.gen::<u64>() & nonce_mask)
			.take(proof_size)
			.collect();
		v.sort_unstable();
		Proof {
			edge_bits: EDGEBITS,
			nonces: v,
		}
	}

	/// Returns the proof size
	pub fn proof_size(&self) -> usize {
		self.nonces.len()
	}

	/// BLAKE2b-256 of the proof in its wire encoding, 42 little-endian
	/// 32-bit nonces. This is the digest the rest of the stack treats as
	/// the PoW hash.
	pub fn cyclehash(&self) -> Result<[u8; 32], Error> {
		let mut packed = Vec::with_capacity(4 * self.nonces.len());
		for n in &self.nonces {
			packed.write_u32::<LittleEndian>(*n as u32)?;
		}
		let h = blake2b(32, &[], &packed);
		let mut out = [0u8; 32];
		out.copy_from_slice(h.as_bytes());
		Ok(out)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn proof_new_sorts() {
		let p = Proof::new(vec![9, 4, 7, 2]);
		assert_eq!(p.nonces, vec![2, 4, 7, 9]);
	}

	#[test]
	fn cyclehash_stable() {
		let p1 = Proof::new((0u64..42).map(|n| n * 3 + 1).collect());
		let p2 = p1.clone();
		assert_eq!(p1.cyclehash().unwrap(), p2.cyclehash().unwrap());

		let mut flipped = p1.clone();
		flipped.nonces[17] += 1;
		assert_ne!(p1.cyclehash().unwrap(), flipped.cyclehash().unwrap());
	}

	#[test]
	fn random_proofs_in_range() {
		let p = Proof::random(42);
		assert_eq!(p.proof_size(), 42);
		for n in p.nonces {
			assert!(n < 1u64 << EDGEBITS);
		}
	}
}
