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

//! Build-time solver constants and the runtime parameter set derived from
//! them: graph size, bucket bit layout, rename widths and siphash keys.

use blake2::blake2b::blake2b;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::error::{Error, ErrorKind};
use crate::siphash::siphash24;

/// Graph size this plugin build solves for. Production sizes are selected
/// per-build, the default is the small compat size used for testing.
#[cfg(feature = "edgebits-31")]
pub const EDGEBITS: u32 = 31;
/// Graph size this plugin build solves for.
#[cfg(all(feature = "edgebits-29", not(feature = "edgebits-31")))]
pub const EDGEBITS: u32 = 29;
/// Graph size this plugin build solves for.
#[cfg(not(any(feature = "edgebits-29", feature = "edgebits-31")))]
pub const EDGEBITS: u32 = 15;

/// Cycle length the proof of work asks for
pub const PROOFSIZE: usize = 42;

/// Upper bound on the bucket axis width. Both bucket axes use the same
/// number of bits.
pub const XBITS: u32 = 7;

/// Round at which bucket slots widen from their initial width, once buckets
/// have thinned out enough that the truncated prefix coding stops paying
pub const EXPANDROUND: u32 = 5;

/// Round at which surviving node ids are renamed to their first compressed
/// form (the following round renames the other side)
pub const COMPRESSROUND: u32 = 16;

/// Default number of worker blocks inside a solve
pub const NUM_THREADS_PARAM: u32 = 4;

/// Default number of trim rounds
pub const NUM_TRIMS_PARAM: u32 = 30;

/// Most solutions kept from a single solve
pub const MAX_SOLS: usize = 4;

/// Width of the first rename, in bits
const Z1BITS: u32 = 15;
/// Width of the second rename, in bits
const Z2BITS: u32 = 9;

/// Derive the four siphash keys from a header blob, little endian over its
/// blake2b-256 digest
pub fn create_siphash_keys(header: &[u8]) -> Result<[u64; 4], Error> {
	let h = blake2b(32, &[], header);
	let hb = h.as_bytes();
	let mut rdr = Cursor::new(hb);
	Ok([
		rdr.read_u64::<LittleEndian>()?,
		rdr.read_u64::<LittleEndian>()?,
		rdr.read_u64::<LittleEndian>()?,
		rdr.read_u64::<LittleEndian>()?,
	])
}

/// Replace the last 4 header bytes with the given nonce (if any) before
/// deriving keys, the same splice miners apply while grinding headers
pub fn set_header_nonce(header: &[u8], nonce: Option<u32>) -> Result<[u64; 4], Error> {
	if let Some(n) = nonce {
		let len = header.len();
		let mut header = header.to_owned();
		header.truncate(len.saturating_sub(4));
		header.write_u32::<LittleEndian>(n)?;
		create_siphash_keys(&header)
	} else {
		create_siphash_keys(header)
	}
}

/// Utility struct holding the commonly used solver parameters calculated
/// from header, nonce, edge_bits, etc.
#[derive(Clone)]
pub struct Params {
	/// 2-log of the number of edges
	pub edge_bits: u32,
	/// Length of cycle asked for
	pub proof_size: usize,
	/// Total number of edges, 1 << edge_bits
	pub num_edges: u64,
	/// Mask restricting a hash to an edge index
	pub edge_mask: u64,
	/// Siphash keys, derived from the header
	pub siphash_keys: [u64; 4],
	/// Bits of the leading bucket axis (second axis is as wide)
	pub x_bits: u32,
	/// Bits of the fine residue of a node id
	pub z_bits: u32,
	/// Bits of the non-leading (y, z) part of a node id
	pub yz_bits: u32,
	/// Buckets per axis
	pub num_x: usize,
	/// Fine residues per (x, y) tile
	pub num_z: u64,
	/// Bits of a first-rename id
	pub z1_bits: u32,
	/// Bits of a second-rename id
	pub z2_bits: u32,
	/// First-rename ids per row
	pub num_z1: usize,
	/// Second-rename ids per row
	pub num_z2: usize,
	/// Trim rounds to run (even)
	pub num_trims: u32,
	/// Worker blocks inside a solve
	pub num_blocks: usize,
}

impl Params {
	/// Instantiates new params, deriving the bucket layout from edge_bits
	pub fn new(
		edge_bits: u32,
		proof_size: usize,
		num_trims: u32,
		num_threads: u32,
	) -> Result<Params, Error> {
		if edge_bits < 9 || edge_bits > 31 {
			return Err(ErrorKind::Params(format!("unsupported edge_bits {}", edge_bits)).into());
		}
		if proof_size < 4 || proof_size & 1 == 1 {
			return Err(ErrorKind::Params(format!("unsupported proof size {}", proof_size)).into());
		}
		if num_trims & 1 == 1 || num_trims < COMPRESSROUND + 4 {
			return Err(ErrorKind::Params(format!("unsupported trim rounds {}", num_trims)).into());
		}
		let num_edges = 1u64 << edge_bits;
		let x_bits = ((edge_bits.saturating_sub(Z1BITS) + 1) / 2).max(1).min(XBITS);
		let z_bits = edge_bits - 2 * x_bits;
		let yz_bits = x_bits + z_bits;
		let z1_bits = yz_bits.min(Z1BITS);
		let z2_bits = z1_bits.min(Z2BITS);
		let num_x = 1usize << x_bits;
		// one block per bucket column at most, and a power of two of them so
		// the column strides divide evenly
		let mut num_blocks = 1usize;
		while 2 * num_blocks <= num_x && 2 * num_blocks <= num_threads.max(1) as usize {
			num_blocks *= 2;
		}
		Ok(Params {
			edge_bits,
			proof_size,
			num_edges,
			edge_mask: num_edges - 1,
			siphash_keys: [0; 4],
			x_bits,
			z_bits,
			yz_bits,
			num_x,
			num_z: 1u64 << z_bits,
			z1_bits,
			z2_bits,
			num_z1: 1usize << z1_bits,
			num_z2: 1usize << z2_bits,
			num_trims,
			num_blocks,
		})
	}

	/// Reset the main keys used for siphash from the header and nonce
	pub fn reset_header_nonce(&mut self, header: Vec<u8>, nonce: Option<u32>) -> Result<(), Error> {
		self.siphash_keys = set_header_nonce(&header, nonce)?;
		Ok(())
	}

	/// Endpoint of the given edge on the given side, as a full node id with
	/// the partition in the low bit
	pub fn sipnode(&self, edge: u64, uorv: u64) -> u64 {
		(self.sipnode_raw(edge, uorv) << 1) | uorv
	}

	/// Endpoint of the given edge on the given side, masked to edge_bits
	/// without the partition bit
	pub fn sipnode_raw(&self, edge: u64, uorv: u64) -> u64 {
		siphash24(&self.siphash_keys, 2 * edge + uorv) & self.edge_mask
	}

	/// Leading bucket axis of a raw node id
	#[inline]
	pub fn node_x(&self, node: u64) -> usize {
		(node >> self.yz_bits) as usize
	}

	/// Second bucket axis of a raw node id
	#[inline]
	pub fn node_y(&self, node: u64) -> usize {
		((node >> self.z_bits) as usize) & (self.num_x - 1)
	}

	/// Fine residue of a raw node id
	#[inline]
	pub fn node_z(&self, node: u64) -> u64 {
		node & (self.num_z - 1)
	}

	/// Non-leading (y, z) part of a raw node id
	#[inline]
	pub fn node_yz(&self, node: u64) -> u64 {
		node & ((1u64 << self.yz_bits) - 1)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn bit_layout() {
		let p = Params::new(29, 42, 30, 8).unwrap();
		assert_eq!(p.x_bits, 7);
		assert_eq!(p.z_bits, 15);
		assert_eq!(p.yz_bits, 22);
		assert_eq!(p.z1_bits, 15);
		assert_eq!(p.z2_bits, 9);
		assert_eq!(p.num_x, 128);

		let p = Params::new(15, 42, 30, 4).unwrap();
		assert_eq!(p.x_bits, 1);
		assert_eq!(p.z_bits, 13);
		assert_eq!(p.num_blocks, 2);

		let p = Params::new(19, 42, 30, 4).unwrap();
		assert_eq!(p.x_bits, 2);
		assert_eq!(p.z_bits, 15);
		assert_eq!(p.num_blocks, 4);
	}

	#[test]
	fn rejects_bad_params() {
		assert!(Params::new(8, 42, 30, 4).is_err());
		assert!(Params::new(32, 42, 30, 4).is_err());
		assert!(Params::new(15, 42, 31, 4).is_err());
		assert!(Params::new(15, 42, 18, 4).is_err());
		assert!(Params::new(15, 7, 30, 4).is_err());
	}

	#[test]
	fn node_fields_recompose() {
		let mut p = Params::new(19, 42, 30, 4).unwrap();
		p.reset_header_nonce(vec![0u8; 80], Some(20)).unwrap();
		for edge in 0..64u64 {
			for uorv in 0..2 {
				let raw = p.sipnode_raw(edge, uorv);
				let x = p.node_x(raw) as u64;
				let y = p.node_y(raw) as u64;
				let z = p.node_z(raw);
				assert_eq!((x << p.yz_bits) | (y << p.z_bits) | z, raw);
				assert_eq!(p.sipnode(edge, uorv), (raw << 1) | uorv);
			}
		}
	}

	#[test]
	fn header_keys_are_stable() {
		let k1 = create_siphash_keys(&[0u8; 80]).unwrap();
		let k2 = create_siphash_keys(&[0u8; 80]).unwrap();
		assert_eq!(k1, k2);
		let k3 = create_siphash_keys(&[1u8; 80]).unwrap();
		assert_ne!(k1, k3);

		// splicing the nonce into the last 4 bytes equals hashing the
		// pre-spliced header
		let mut spliced = [0u8; 80];
		spliced[76] = 0x2a;
		assert_eq!(
			set_header_nonce(&[0u8; 80], Some(0x2a)).unwrap(),
			create_siphash_keys(&spliced).unwrap()
		);
	}
}
