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

//! Rename bookkeeping for the two compression phases. Fresh dense ids are
//! handed out per (side, x-row); the reverse maps survive the trim and form
//! the decompression ladder used during solution recovery.

use util::Mutex;

/// Epoch-stamped scratch map from a node residue to its assigned name,
/// avoiding a clear per tile
pub struct NameMap {
	stamps: Vec<u32>,
	names: Vec<u32>,
	epoch: u32,
}

impl NameMap {
	/// Map over residues below `cap`
	pub fn new(cap: usize) -> NameMap {
		NameMap {
			stamps: vec![0; cap],
			names: vec![0; cap],
			epoch: 0,
		}
	}

	/// Invalidate all entries, entering a fresh tile
	pub fn begin_tile(&mut self) {
		self.epoch += 1;
	}

	/// Name previously assigned to this residue within the current tile
	#[inline]
	pub fn get(&self, key: u64) -> Option<u32> {
		if self.stamps[key as usize] == self.epoch {
			Some(self.names[key as usize])
		} else {
			None
		}
	}

	/// Record the name assigned to this residue
	#[inline]
	pub fn insert(&mut self, key: u64, name: u32) {
		self.stamps[key as usize] = self.epoch;
		self.names[key as usize] = name;
	}
}

/// The finished two-level decompression ladder, one row per (side, x)
pub struct RenameTables {
	/// Buckets per axis
	pub num_x: usize,
	/// Bits of the non-leading part of an original node id
	pub yz_bits: u32,
	/// First rename: [side * num_x + x][name1] = original (y, z)
	pub first: Vec<Vec<u32>>,
	/// Second rename: [side * num_x + x][name2] = name1
	pub second: Vec<Vec<u32>>,
}

impl RenameTables {
	/// Walk the ladder back from a second-level name to the full raw node id
	pub fn decompress(&self, side: usize, x: usize, name2: u32) -> Option<u64> {
		let row = side * self.num_x + x;
		let name1 = *self.second.get(row)?.get(name2 as usize)?;
		let yz = *self.first.get(row)?.get(name1 as usize)?;
		Some(((x as u64) << self.yz_bits) | yz as u64)
	}
}

/// Shared collector the trim blocks publish finished rows into
pub struct RenameBuild {
	num_x: usize,
	first: Vec<Mutex<Vec<u32>>>,
	second: Vec<Mutex<Vec<u32>>>,
}

impl RenameBuild {
	/// Empty collector for both sides
	pub fn new(num_x: usize) -> RenameBuild {
		RenameBuild {
			num_x,
			first: (0..2 * num_x).map(|_| Mutex::new(Vec::new())).collect(),
			second: (0..2 * num_x).map(|_| Mutex::new(Vec::new())).collect(),
		}
	}

	/// Publish the first-rename row for (side, x)
	pub fn publish_first(&self, side: usize, x: usize, table: Vec<u32>) {
		*self.first[side * self.num_x + x].lock() = table;
	}

	/// Publish the second-rename row for (side, x)
	pub fn publish_second(&self, side: usize, x: usize, table: Vec<u32>) {
		*self.second[side * self.num_x + x].lock() = table;
	}

	/// Freeze into the read-only ladder
	pub fn finish(self, yz_bits: u32) -> RenameTables {
		RenameTables {
			num_x: self.num_x,
			yz_bits,
			first: self.first.into_iter().map(|m| m.into_inner()).collect(),
			second: self.second.into_iter().map(|m| m.into_inner()).collect(),
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn name_map_tiles_do_not_leak() {
		let mut map = NameMap::new(64);
		map.begin_tile();
		map.insert(7, 0);
		map.insert(12, 1);
		assert_eq!(map.get(7), Some(0));
		assert_eq!(map.get(12), Some(1));
		assert_eq!(map.get(13), None);
		map.begin_tile();
		assert_eq!(map.get(7), None);
	}

	#[test]
	fn ladder_decompresses() {
		let build = RenameBuild::new(4);
		build.publish_first(1, 2, vec![0x155, 0x2aa]);
		build.publish_second(1, 2, vec![1, 0]);
		let tables = build.finish(10);
		assert_eq!(tables.decompress(1, 2, 0), Some((2 << 10) | 0x2aa));
		assert_eq!(tables.decompress(1, 2, 1), Some((2 << 10) | 0x155));
		assert_eq!(tables.decompress(1, 2, 2), None);
		assert_eq!(tables.decompress(0, 2, 0), None);
	}
}
