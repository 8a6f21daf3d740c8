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

//! Mean-style solver for the Cuckoo Cycle proof of work designed by John
//! Tromp: a bucketed, multi-round edge trimming pipeline followed by a
//! path-growing cycle finder on the few surviving edges, plus verification
//! of the resulting 42-nonce proofs.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![warn(missing_docs)]

extern crate blake2_rfc as blake2;
extern crate byteorder;
extern crate croaring;
extern crate failure;
#[macro_use]
extern crate failure_derive;
extern crate hex;
#[macro_use]
extern crate log;
extern crate rand;
extern crate serde;
#[macro_use]
extern crate serde_derive;

extern crate cuckoo_mean_util as util;

pub mod error;
pub mod graph;
pub mod params;
pub mod proof;
pub mod recover;
pub mod siphash;
pub mod trim;

pub use crate::error::{Error, ErrorKind};
pub use crate::params::{
	create_siphash_keys, set_header_nonce, Params, EDGEBITS, NUM_THREADS_PARAM, NUM_TRIMS_PARAM,
	PROOFSIZE,
};
pub use crate::proof::Proof;

use byteorder::{BigEndian, WriteBytesExt};

/// Solver context: the parameter set keyed on a header, driving the trimmer,
/// cycle finder and recovery, and verifying proofs against the same graph
pub struct CuckooContext {
	params: Params,
}

impl CuckooContext {
	/// New solver context for the given sizes and tunables
	pub fn new(
		edge_bits: u32,
		proof_size: usize,
		num_trims: u32,
		num_threads: u32,
	) -> Result<CuckooContext, Error> {
		Ok(CuckooContext {
			params: Params::new(edge_bits, proof_size, num_trims, num_threads)?,
		})
	}

	/// Set the header (and optional nonce spliced into its last 4 bytes)
	/// this context solves or verifies for
	pub fn set_header_nonce(&mut self, header: Vec<u8>, nonce: Option<u32>) -> Result<(), Error> {
		self.params.reset_header_nonce(header, nonce)
	}

	/// The derived parameter set
	pub fn params(&self) -> &Params {
		&self.params
	}

	/// Get a siphash key as a hex string (for display convenience)
	pub fn sipkey_hex(&self, index: usize) -> Result<String, Error> {
		let mut rdr = vec![];
		rdr.write_u64::<BigEndian>(self.params.siphash_keys[index])?;
		Ok(hex::encode(rdr))
	}

	/// Run the full solve pipeline: trim, find cycles, recover their nonces.
	/// Every returned proof has been re-verified against the keyed graph.
	pub fn find_cycles(&mut self) -> Result<Vec<Proof>, Error> {
		let trimmed = trim::Trimmer::new(&self.params).trim()?;
		let cycles = graph::CycleFinder::new(&self.params, &trimmed).find_cycles()?;
		let mut sols = vec![];
		for cycle in cycles {
			match recover::recover(&self.params, &trimmed, &cycle) {
				Ok(proof) => {
					self.verify(&proof)?;
					sols.push(proof);
				}
				Err(e) => {
					// a cycle that can't be witnessed is rejected, the solve
					// itself carries on
					warn!("rejected unrecoverable cycle: {}", e);
				}
			}
		}
		if sols.is_empty() {
			Err(ErrorKind::NoSolution.into())
		} else {
			debug!("found {} solution(s)", sols.len());
			Ok(sols)
		}
	}

	/// Verify that the given edge nonces are ascending and form a cycle of
	/// the right length in the header-generated graph
	pub fn verify(&self, proof: &Proof) -> Result<(), Error> {
		let size = proof.proof_size();
		if size != self.params.proof_size {
			return Err(ErrorKind::Verification("wrong cycle length".to_owned()).into());
		}
		let nonces = &proof.nonces;
		let mut uvs = vec![0u64; 2 * size];
		let mask = u64::max_value() >> (size as u64).leading_zeros(); // round size up to 2-power - 1
		let mut xor0: u64 = (size as u64 / 2) & 1;
		let mut xor1: u64 = xor0;
		// the next two arrays form a linked list of nodes with matching low bits
		let mut headu = vec![2 * size; 1 + mask as usize];
		let mut headv = vec![2 * size; 1 + mask as usize];
		let mut prev = vec![0usize; 2 * size];

		for n in 0..size {
			if nonces[n] > self.params.edge_mask {
				return Err(ErrorKind::Verification("edge too big".to_owned()).into());
			}
			if n > 0 && nonces[n] <= nonces[n - 1] {
				return Err(ErrorKind::Verification("edges not ascending".to_owned()).into());
			}
			let u = self.params.sipnode(nonces[n], 0);
			let v = self.params.sipnode(nonces[n], 1);

			uvs[2 * n] = u;
			let ubits = (u >> 1 & mask) as usize;
			prev[2 * n] = headu[ubits];
			headu[ubits] = 2 * n;

			uvs[2 * n + 1] = v;
			let vbits = (v >> 1 & mask) as usize;
			prev[2 * n + 1] = headv[vbits];
			headv[vbits] = 2 * n + 1;

			xor0 ^= u;
			xor1 ^= v;
		}
		if xor0 | xor1 != 0 {
			return Err(ErrorKind::Verification("endpoints don't match up".to_owned()).into());
		}
		// make prev lists circular
		for n in 0..size {
			if prev[2 * n] == 2 * size {
				let ubits = (uvs[2 * n] >> 1 & mask) as usize;
				prev[2 * n] = headu[ubits];
			}
			if prev[2 * n + 1] == 2 * size {
				let vbits = (uvs[2 * n + 1] >> 1 & mask) as usize;
				prev[2 * n + 1] = headv[vbits];
			}
		}
		let mut n = 0;
		let mut i = 0;
		let mut j;
		loop {
			// follow cycle
			j = i;
			let mut k = j;
			loop {
				k = prev[k];
				if k == i {
					break;
				}
				if uvs[k] >> 1 == uvs[i] >> 1 {
					// find the other edge endpoint matching the one at i
					if j != i {
						return Err(ErrorKind::Verification("branch in cycle".to_owned()).into());
					}
					j = k;
				}
			}
			if j == i || uvs[j] == uvs[i] {
				return Err(ErrorKind::Verification("cycle dead ends".to_owned()).into());
			}
			i = j ^ 1;
			n += 1;
			if i == 0 {
				break;
			}
		}
		if n == size {
			Ok(())
		} else {
			Err(ErrorKind::Verification("cycle too short".to_owned()).into())
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	// Cuckatoo 29 Solution for Header [0u8;80] - nonce 20
	static V1_29: [u64; 42] = [
		0x48a9e2, 0x9cf043, 0x155ca30, 0x18f4783, 0x248f86c, 0x2629a64, 0x5bad752, 0x72e3569,
		0x93db760, 0x97d3b37, 0x9e05670, 0xa315d5a, 0xa3571a1, 0xa48db46, 0xa7796b6, 0xac43611,
		0xb64912f, 0xbb6c71e, 0xbcc8be1, 0xc38a43a, 0xd4faa99, 0xe018a66, 0xe37e49c, 0xfa975fa,
		0x11786035, 0x1243b60a, 0x12892da0, 0x141b5453, 0x1483c3a0, 0x1505525e, 0x1607352c,
		0x16181fe3, 0x17e3a1da, 0x180b651e, 0x1899d678, 0x1931b0bb, 0x19606448, 0x1b041655,
		0x1b2c20ad, 0x1bd7a83c, 0x1c05d5b0, 0x1c0b9caa,
	];

	// Cuckatoo 31 Solution for Header [0u8;80] - nonce 99
	static V1_31: [u64; 42] = [
		0x1128e07, 0xc181131, 0x110fad36, 0x1135ddee, 0x1669c7d3, 0x1931e6ea, 0x1c0005f3,
		0x1dd6ecca, 0x1e29ce7e, 0x209736fc, 0x2692bf1a, 0x27b85aa9, 0x29bb7693, 0x2dc2a047,
		0x2e28650a, 0x2f381195, 0x350eb3f9, 0x3beed728, 0x3e861cbc, 0x41448cc1, 0x41f08f6d,
		0x42fbc48a, 0x4383ab31, 0x4389c61f, 0x4540a5ce, 0x49a17405, 0x50372ded, 0x512f0db0,
		0x588b6288, 0x5a36aa46, 0x5c29e1fe, 0x6118ab16, 0x634705b5, 0x6633d190, 0x6683782f,
		0x6728b6e1, 0x67adfb45, 0x68ae2306, 0x6d60f5e1, 0x78af3c4f, 0x7dde51ab, 0x7faced21,
	];

	#[test]
	fn validate29_vectors() {
		let mut ctx = CuckooContext::new(29, 42, 30, 4).unwrap();
		ctx.set_header_nonce([0u8; 80].to_vec(), Some(20)).unwrap();
		assert!(ctx.verify(&Proof::new(V1_29.to_vec())).is_ok());
	}

	#[test]
	fn validate31_vectors() {
		let mut ctx = CuckooContext::new(31, 42, 30, 4).unwrap();
		ctx.set_header_nonce([0u8; 80].to_vec(), Some(99)).unwrap();
		assert!(ctx.verify(&Proof::new(V1_31.to_vec())).is_ok());
	}

	#[test]
	fn validate_fail() {
		let mut ctx = CuckooContext::new(29, 42, 30, 4).unwrap();
		let mut header = [0u8; 80];
		header[0] = 1u8;
		ctx.set_header_nonce(header.to_vec(), Some(20)).unwrap();
		assert!(ctx.verify(&Proof::new(V1_29.to_vec())).is_err());
		header[0] = 0u8;
		ctx.set_header_nonce(header.to_vec(), Some(20)).unwrap();
		assert!(ctx.verify(&Proof::new(V1_29.to_vec())).is_ok());

		// flipping a single nonce breaks the matching
		let mut bad_proof = V1_29;
		bad_proof[0] = 0x48a9e1;
		assert!(ctx.verify(&Proof::new(bad_proof.to_vec())).is_err());

		// wrong length
		let mut short = V1_29.to_vec();
		short.truncate(40);
		match ctx.verify(&Proof::new(short)).unwrap_err().kind() {
			ErrorKind::Verification(s) => assert_eq!(s, "wrong cycle length"),
			k => panic!("unexpected error {:?}", k),
		}

		// unsorted nonces are rejected before any hashing
		let mut unsorted = Proof::new(V1_29.to_vec());
		unsorted.nonces.swap(3, 4);
		match ctx.verify(&unsorted).unwrap_err().kind() {
			ErrorKind::Verification(s) => assert_eq!(s, "edges not ascending"),
			k => panic!("unexpected error {:?}", k),
		}
	}

	#[test]
	fn cyclehash_changes_with_proof() {
		let good = Proof::new(V1_29.to_vec());
		let mut bad = good.clone();
		bad.nonces[0] += 1;
		assert_eq!(
			good.cyclehash().unwrap(),
			Proof::new(V1_29.to_vec()).cyclehash().unwrap()
		);
		assert_ne!(good.cyclehash().unwrap(), bad.cyclehash().unwrap());
	}

	#[test]
	fn basic_solve_15() {
		util::init_test_logger();
		// this header/nonce pair is known to hide cycles at this size
		let nonce = 1546569;
		let mut ctx = CuckooContext::new(15, 42, 20, 4).unwrap();
		ctx.set_header_nonce([0u8; 80].to_vec(), Some(nonce)).unwrap();
		let sols = ctx.find_cycles().unwrap();
		assert!(!sols.is_empty());
		for s in sols {
			assert_eq!(s.proof_size(), 42);
			assert_eq!(s.edge_bits, 15);
			for w in s.nonces.windows(2) {
				assert!(w[0] < w[1]);
			}
			ctx.verify(&s).unwrap();
		}
	}

	#[test]
	fn basic_solve_19() {
		util::init_test_logger();
		let nonce = 15465723;
		let mut ctx = CuckooContext::new(19, 42, 26, 4).unwrap();
		ctx.set_header_nonce([0u8; 84].to_vec(), Some(nonce)).unwrap();
		let sols = ctx.find_cycles().unwrap();
		assert!(!sols.is_empty());
		for s in sols {
			ctx.verify(&s).unwrap();
		}
	}

	#[test]
	fn solve_unlikely_header_is_clean() {
		util::init_test_logger();
		// 32-byte header; at this toy size most headers hide no 42-cycle,
		// the solve must still come back clean either way
		let header =
			hex::decode("a6c16443fc82250b49c7faa3876e7ab89ba687918cb00c4c10d6625e3a2e7bcc")
				.unwrap();
		let mut ctx = CuckooContext::new(11, 42, 20, 4).unwrap();
		ctx.set_header_nonce(header, None).unwrap();
		match ctx.find_cycles() {
			Ok(sols) => {
				for s in sols {
					ctx.verify(&s).unwrap();
				}
			}
			Err(e) => assert_eq!(e.kind(), ErrorKind::NoSolution),
		}
	}

	#[test]
	fn sipkeys_from_header() {
		let mut ctx = CuckooContext::new(15, 42, 20, 1).unwrap();
		ctx.set_header_nonce([0u8; 80].to_vec(), Some(20)).unwrap();
		let k0 = ctx.sipkey_hex(0).unwrap();
		let k1 = ctx.sipkey_hex(1).unwrap();
		assert_eq!(k0.len(), 16);
		assert_ne!(k0, k1);
		// keys only depend on the header
		let mut ctx2 = CuckooContext::new(15, 42, 20, 1).unwrap();
		ctx2.set_header_nonce([0u8; 80].to_vec(), Some(20)).unwrap();
		assert_eq!(k0, ctx2.sipkey_hex(0).unwrap());
	}
}
