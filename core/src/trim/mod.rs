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

//! The bucketed edge trimming pipeline. Round 0 enumerates all edges and
//! buckets their U endpoints, round 1 generates the V side while dropping
//! U-side leaves, and the following rounds alternate sides, each one removing
//! the edges whose endpoint on that side has degree 1. Two compression phases
//! rename surviving node ids to dense short forms, so that late rounds run on
//! 32-bit records and the final survivors fit a small edge list.
//!
//! Each round runs in two stages over every bucket column: stage 1 re-buckets
//! the column into block-local scratch on the Y axis, stage 2 builds the
//! degree bitmap per (x, y) tile and re-emits the survivors keyed on the
//! other side. A global barrier separates the stages.

pub mod arena;
pub mod codec;
pub mod rename;

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use util::Mutex;

use crate::error::{Error, ErrorKind};
use crate::params::{Params, COMPRESSROUND, EXPANDROUND};
use crate::trim::arena::BucketArena;
use crate::trim::codec::LagCodec;
use crate::trim::rename::{NameMap, RenameBuild, RenameTables};

/// Initial bucket slot width, in bytes
const SLOT0_BYTES: usize = 5;

/// Stored bits of the emitting side's Y while buckets are dense enough for
/// the lag window to recover it
const Y_TRUNC_BITS: u32 = 3;

fn bytes_for(bits: u32) -> usize {
	((bits + 7) / 8) as usize
}

/// Slot widths and bucket capacities derived from the bit layout
#[derive(Clone, Copy)]
struct Layout {
	slot0_bytes: usize,
	nonce_bits: u32,
	pre_bytes: usize,
	full_bytes: usize,
	mid_bytes: usize,
	y_trunc: bool,
	gen_seg_bytes: usize,
	trim_seg_bytes: usize,
}

impl Layout {
	fn new(p: &Params) -> Layout {
		let x = p.x_bits;
		let z = p.z_bits;
		let nonce_bits = (8 * SLOT0_BYTES) as u32 - p.yz_bits;
		let full_bytes = bytes_for(2 * (x + z));
		let trunc_total = Y_TRUNC_BITS + x + 2 * z;
		let (y_trunc, pre_bytes) = if x > Y_TRUNC_BITS && bytes_for(trunc_total) < full_bytes {
			(true, bytes_for(trunc_total))
		} else {
			(false, full_bytes)
		};
		let mid_bytes = bytes_for(p.z1_bits + x + z);
		// mean bucket loads; capacities carry a statistical margin so that
		// overflow stays astronomically rare at the tuned sizes. Generation
		// buckets span a whole x row, which also keeps consecutive nonces in
		// a bucket close enough for the lag window.
		let mean_row = (p.num_edges >> p.x_bits) as usize;
		let per_seg = mean_row / p.num_blocks;
		let gen_seg_bytes = (per_seg + per_seg / 8 + 64) * SLOT0_BYTES;
		let mean = (p.num_edges >> (2 * p.x_bits)) as usize;
		let trim_seg_bytes = mean * 9 / 2 + 4096;
		Layout {
			slot0_bytes: SLOT0_BYTES,
			nonce_bits,
			pre_bytes,
			full_bytes,
			mid_bytes,
			y_trunc,
			gen_seg_bytes,
			trim_seg_bytes,
		}
	}

	/// Record width written by the given round
	fn out_bytes(&self, round: u32) -> usize {
		if round == 0 {
			self.slot0_bytes
		} else if round < EXPANDROUND {
			self.pre_bytes
		} else if round < COMPRESSROUND {
			self.full_bytes
		} else if round == COMPRESSROUND {
			self.mid_bytes
		} else {
			4
		}
	}

	/// Record width read by the given round
	fn in_bytes(&self, round: u32) -> usize {
		self.out_bytes(round - 1)
	}

	/// Whether records written by the given round carry a truncated Y
	fn out_trunc(&self, round: u32) -> bool {
		self.y_trunc && round < EXPANDROUND
	}

	/// Whether records read by the given round carry a truncated Y
	fn in_trunc(&self, round: u32) -> bool {
		self.y_trunc && round <= EXPANDROUND
	}
}

/// Two bits of degree state per residue, `seen` going 0 -> 1 -> saturated,
/// driven by two overlapping atomic ORs
struct DegreeMap {
	words: Vec<AtomicU32>,
}

impl DegreeMap {
	fn new(entries: usize) -> DegreeMap {
		DegreeMap {
			words: (0..(2 * entries + 31) / 32)
				.map(|_| AtomicU32::new(0))
				.collect(),
		}
	}

	fn zero(&self, entries: usize) {
		for w in &self.words[..(2 * entries + 31) / 32] {
			w.store(0, Ordering::Relaxed);
		}
	}

	#[inline]
	fn mark(&self, idx: u64) {
		let word = idx as usize / 16;
		let lo = 1u32 << (2 * (idx as usize % 16));
		let prev = self.words[word].fetch_or(lo, Ordering::Relaxed);
		if prev & lo != 0 {
			self.words[word].fetch_or(lo << 1, Ordering::Relaxed);
		}
	}

	#[inline]
	fn is_multi(&self, idx: u64) -> bool {
		let word = idx as usize / 16;
		let hi = 2u32 << (2 * (idx as usize % 16));
		self.words[word].load(Ordering::Relaxed) & hi != 0
	}
}

/// Per-round surviving edge counts
pub struct TrimStats {
	/// Edges alive after each round, indexed by round
	pub round_edges: Vec<u64>,
}

/// Everything that survives the trim: the compact edge list on renamed ids,
/// the decompression ladder and the per-round stats
pub struct TrimmedGraph {
	/// Buckets per axis
	pub num_x: usize,
	/// Bits of a second-rename id
	pub z2_bits: u32,
	/// Surviving edges per (ux, vx) bucket, packed (u << 16 | v) where each
	/// half is (x << z2_bits | name2)
	pub buckets: Vec<Vec<u32>>,
	/// Two-level rename ladder
	pub rename: RenameTables,
	/// Per-round stats
	pub stats: TrimStats,
}

impl TrimmedGraph {
	/// Total surviving edges
	pub fn edge_count(&self) -> usize {
		self.buckets.iter().map(|b| b.len()).sum()
	}
}

struct Shared {
	params: Params,
	layout: Layout,
	nonce_codec: LagCodec,
	y_codec: LagCodec,
	gen: BucketArena,
	ping: BucketArena,
	pong: BucketArena,
	barrier: Barrier,
	counts: Vec<AtomicU64>,
	fail: Mutex<Option<ErrorKind>>,
	aborted: AtomicBool,
	rename: RenameBuild,
	final_edges: Mutex<Vec<(u32, u32)>>,
}

impl Shared {
	fn new(params: Params, layout: Layout) -> Shared {
		let nx = params.num_x;
		let nb = params.num_blocks;
		Shared {
			nonce_codec: LagCodec::new(layout.nonce_bits),
			y_codec: LagCodec::new(Y_TRUNC_BITS),
			gen: BucketArena::new(nx, 1, nb, layout.gen_seg_bytes),
			ping: BucketArena::new(nx, nx, 1, layout.trim_seg_bytes),
			pong: BucketArena::new(nx, nx, 1, layout.trim_seg_bytes),
			barrier: Barrier::new(nb),
			counts: (0..params.num_trims).map(|_| AtomicU64::new(0)).collect(),
			fail: Mutex::new(None),
			aborted: AtomicBool::new(false),
			rename: RenameBuild::new(nx),
			final_edges: Mutex::new(Vec::new()),
			params,
			layout,
		}
	}

	fn set_fail(&self, kind: ErrorKind) {
		let mut fail = self.fail.lock();
		if fail.is_none() {
			*fail = Some(kind);
		}
		self.aborted.store(true, Ordering::Release);
	}

	fn is_aborted(&self) -> bool {
		self.aborted.load(Ordering::Relaxed)
	}

	fn check_arena(&self, arena: &BucketArena) {
		if let Some((x, y)) = arena.overflow_at() {
			self.set_fail(ErrorKind::BucketOverflow(x, y));
		}
	}

	/// Barrier, leader-only work, barrier
	fn leader_sync<F: FnOnce(&Shared)>(&self, work: F) {
		if self.barrier.wait().is_leader() {
			work(self);
		}
		self.barrier.wait();
	}
}

// this side's fields in the high bits, the other side's in the low
#[inline]
fn pack_record(x_bits: u32, z_bits: u32, ys: u64, tz: u64, oy: u64, oz: u64) -> u64 {
	((((ys << z_bits) | tz) << x_bits | oy) << z_bits) | oz
}

struct BlockCtx<'a> {
	s: &'a Shared,
	scratch: Vec<Vec<u64>>,
	degrees: DegreeMap,
	names: NameMap,
	finals: Vec<(u32, u32)>,
}

impl<'a> BlockCtx<'a> {
	fn new(s: &'a Shared) -> BlockCtx<'a> {
		let entries = (s.params.num_z as usize).max(s.params.num_z1);
		BlockCtx {
			s,
			scratch: (0..s.params.num_x).map(|_| Vec::new()).collect(),
			degrees: DegreeMap::new(entries),
			names: NameMap::new(entries),
			finals: Vec::new(),
		}
	}

	fn clear_scratch(&mut self) {
		for v in self.scratch.iter_mut() {
			v.clear();
		}
	}

	/// Round 1 stage 1: decode the nonces of one U row bucket and re-bucket
	/// its records on the U-side Y axis
	fn stage1_gen(&mut self, ux: usize) {
		let p = &self.s.params;
		let zmask = p.num_z - 1;
		let xmask = (p.num_x - 1) as u64;
		let per_seg = p.num_edges / p.num_blocks as u64;
		self.clear_scratch();
		for seg in 0..self.s.gen.segments() {
			let seg_start = seg as u64 * per_seg;
			let mut prev = seg_start + self.s.nonce_codec.lag();
			for rec in self.s.gen.records(ux, 0, seg, self.s.layout.slot0_bytes) {
				let uy = ((rec >> p.z_bits) & xmask) as usize;
				let uz = rec & zmask;
				let nonce = self.s.nonce_codec.decode(prev, rec >> p.yz_bits);
				prev = nonce;
				if nonce >= seg_start + per_seg {
					self.s.set_fail(ErrorKind::DeltaDecode(ux, uy));
					return;
				}
				self.scratch[uy].push((nonce << p.z_bits) | uz);
			}
		}
	}

	/// Round 1 stage 2: per (ux, uy) tile, keep edges whose U endpoint has
	/// degree 2 or more, hash their V endpoint and bucket on (ux, vx)
	fn stage2_gen(&mut self, ux: usize) -> u64 {
		let p = &self.s.params;
		let zmask = p.num_z - 1;
		let out_bytes = self.s.layout.out_bytes(1);
		let out_trunc = self.s.layout.out_trunc(1);
		let mut emitted = 0u64;
		for uy in 0..p.num_x {
			self.degrees.zero(p.num_z as usize);
			for &e in &self.scratch[uy] {
				self.degrees.mark(e & zmask);
			}
			for &e in &self.scratch[uy] {
				let uz = e & zmask;
				if !self.degrees.is_multi(uz) {
					continue;
				}
				let nonce = e >> p.z_bits;
				let v = p.sipnode_raw(nonce, 1);
				let ys = if out_trunc {
					self.s.y_codec.encode(uy as u64)
				} else {
					uy as u64
				};
				let rec = pack_record(p.x_bits, p.z_bits, ys, uz, p.node_y(v) as u64, p.node_z(v));
				self.s.ping.push(ux, p.node_x(v), 0, out_bytes, rec);
				emitted += 1;
			}
		}
		emitted
	}

	/// Trim round stage 1: re-bucket one column into scratch on the trimmed
	/// side's Y axis, reconstructing the previously truncated Y on the way
	fn stage1_rebucket(&mut self, round: u32, src: &BucketArena, c: usize) {
		let p = &self.s.params;
		let (x, z) = (p.x_bits, p.z_bits);
		let zmask = p.num_z - 1;
		let xmask = (p.num_x - 1) as u64;
		let in_bytes = self.s.layout.in_bytes(round);
		let in_trunc = self.s.layout.in_trunc(round);
		self.clear_scratch();
		for row in 0..p.num_x {
			let mut prev_y = 0u64;
			for rec in src.records(row, c, 0, in_bytes) {
				let s_y = (rec >> z) & xmask;
				let s_z = rec & zmask;
				let sp_z = (rec >> (x + z)) & zmask;
				let raw_y = rec >> (x + 2 * z);
				let sp_y = if in_trunc {
					let y = self.s.y_codec.decode(prev_y, raw_y);
					prev_y = y;
					y
				} else {
					raw_y
				};
				if sp_y >= p.num_x as u64 {
					self.s.set_fail(ErrorKind::DeltaDecode(row, c));
					return;
				}
				self.scratch[s_y as usize]
					.push(((((row as u64) << x | sp_y) << z | sp_z) << z) | s_z);
			}
		}
	}

	/// Trim round stage 2: degree-filter each tile and re-emit survivors
	/// with the trimmed side as the new addressing key
	fn stage2_trim(&mut self, round: u32, dst: &BucketArena, c: usize) -> u64 {
		let p = &self.s.params;
		let (x, z) = (p.x_bits, p.z_bits);
		let zmask = p.num_z - 1;
		let xmask = (p.num_x - 1) as u64;
		let out_bytes = self.s.layout.out_bytes(round);
		let out_trunc = self.s.layout.out_trunc(round);
		let mut emitted = 0u64;
		for sy in 0..p.num_x {
			self.degrees.zero(p.num_z as usize);
			for &e in &self.scratch[sy] {
				self.degrees.mark(e & zmask);
			}
			for &e in &self.scratch[sy] {
				let s_z = e & zmask;
				if !self.degrees.is_multi(s_z) {
					continue;
				}
				let sp_z = (e >> z) & zmask;
				let sp_y = (e >> (2 * z)) & xmask;
				let row = (e >> (2 * z + x)) as usize;
				let ys = if out_trunc {
					self.s.y_codec.encode(sy as u64)
				} else {
					sy as u64
				};
				let rec = pack_record(x, z, ys, s_z, sp_y, sp_z);
				dst.push(c, row, 0, out_bytes, rec);
				emitted += 1;
			}
		}
		emitted
	}

	/// First compression, renaming side: like a trim round, but surviving
	/// (y, z) pairs get a fresh dense name local to this row and the reverse
	/// map is kept for recovery
	fn stage2_rename1(&mut self, dst: &BucketArena, c: usize, side: usize) -> u64 {
		let p = &self.s.params;
		let (x, z) = (p.x_bits, p.z_bits);
		let zmask = p.num_z - 1;
		let xmask = (p.num_x - 1) as u64;
		let mut table: Vec<u32> = Vec::new();
		let mut emitted = 0u64;
		for sy in 0..p.num_x {
			self.degrees.zero(p.num_z as usize);
			for &e in &self.scratch[sy] {
				self.degrees.mark(e & zmask);
			}
			self.names.begin_tile();
			for &e in &self.scratch[sy] {
				let s_z = e & zmask;
				if !self.degrees.is_multi(s_z) {
					continue;
				}
				let name = match self.names.get(s_z) {
					Some(n) => n,
					None => {
						if table.len() >= p.num_z1 {
							self.s.set_fail(ErrorKind::RenameExhausted(c));
							return emitted;
						}
						let n = table.len() as u32;
						table.push(((sy as u32) << z) | s_z as u32);
						self.names.insert(s_z, n);
						n
					}
				};
				let sp_z = (e >> z) & zmask;
				let sp_y = (e >> (2 * z)) & xmask;
				let row = (e >> (2 * z + x)) as usize;
				let rec = ((name as u64) << (x + z)) | (sp_y << z) | sp_z;
				dst.push(c, row, 0, self.s.layout.mid_bytes, rec);
				emitted += 1;
			}
		}
		self.s.rename.publish_first(side, c, table);
		emitted
	}

	/// First compression, other side, stage 1: records now carry the renamed
	/// opposite endpoint, re-bucket on this side's Y
	fn stage1_mid(&mut self, src: &BucketArena, c: usize) {
		let p = &self.s.params;
		let (x, z, z1) = (p.x_bits, p.z_bits, p.z1_bits);
		let zmask = p.num_z - 1;
		let xmask = (p.num_x - 1) as u64;
		self.clear_scratch();
		for row in 0..p.num_x {
			for rec in src.records(row, c, 0, self.s.layout.mid_bytes) {
				let s_z = rec & zmask;
				let s_y = (rec >> z) & xmask;
				let opp_n1 = rec >> (x + z);
				self.scratch[s_y as usize]
					.push((((row as u64) << z1 | opp_n1) << z) | s_z);
			}
		}
	}

	/// First compression, other side, stage 2: rename this side too; from
	/// here on records are a pair of dense names in 32 bits
	fn stage2_rename1b(&mut self, dst: &BucketArena, c: usize) -> u64 {
		let p = &self.s.params;
		let (z, z1) = (p.z_bits, p.z1_bits);
		let zmask = p.num_z - 1;
		let z1mask = (p.num_z1 - 1) as u64;
		let mut table: Vec<u32> = Vec::new();
		let mut emitted = 0u64;
		for sy in 0..p.num_x {
			self.degrees.zero(p.num_z as usize);
			for &e in &self.scratch[sy] {
				self.degrees.mark(e & zmask);
			}
			self.names.begin_tile();
			for &e in &self.scratch[sy] {
				let s_z = e & zmask;
				if !self.degrees.is_multi(s_z) {
					continue;
				}
				let name = match self.names.get(s_z) {
					Some(n) => n,
					None => {
						if table.len() >= p.num_z1 {
							self.s.set_fail(ErrorKind::RenameExhausted(c));
							return emitted;
						}
						let n = table.len() as u32;
						table.push(((sy as u32) << z) | s_z as u32);
						self.names.insert(s_z, n);
						n
					}
				};
				let opp_n1 = (e >> z) & z1mask;
				let row = (e >> (z + z1)) as usize;
				let rec = ((name as u64) << z1) | opp_n1;
				dst.push(c, row, 0, 4, rec);
				emitted += 1;
			}
		}
		self.s.rename.publish_first(0, c, table);
		emitted
	}

	/// 32-bit round stage 1: the whole column shares one name space, build
	/// the degree bitmap over it directly
	fn stage1_degree32(&mut self, src: &BucketArena, c: usize) {
		let p = &self.s.params;
		let z1mask = (p.num_z1 - 1) as u64;
		self.degrees.zero(p.num_z1);
		for row in 0..p.num_x {
			for rec in src.records(row, c, 0, 4) {
				self.degrees.mark(rec & z1mask);
			}
		}
	}

	/// 32-bit round stage 2: re-emit survivors with the sides swapped
	fn stage2_emit32(&mut self, src: &BucketArena, dst: &BucketArena, c: usize) -> u64 {
		let p = &self.s.params;
		let z1 = p.z1_bits;
		let z1mask = (p.num_z1 - 1) as u64;
		let mut emitted = 0u64;
		for row in 0..p.num_x {
			for rec in src.records(row, c, 0, 4) {
				let n = rec & z1mask;
				if !self.degrees.is_multi(n) {
					continue;
				}
				dst.push(c, row, 0, 4, (n << z1) | (rec >> z1));
				emitted += 1;
			}
		}
		emitted
	}

	/// Second compression, renaming side: move surviving first names down to
	/// the short second names
	fn stage2_rename2(&mut self, src: &BucketArena, dst: &BucketArena, c: usize, side: usize) -> u64 {
		let p = &self.s.params;
		let z1 = p.z1_bits;
		let z1mask = (p.num_z1 - 1) as u64;
		let mut table: Vec<u32> = Vec::new();
		let mut emitted = 0u64;
		self.names.begin_tile();
		for row in 0..p.num_x {
			for rec in src.records(row, c, 0, 4) {
				let n1 = rec & z1mask;
				if !self.degrees.is_multi(n1) {
					continue;
				}
				let name = match self.names.get(n1) {
					Some(n) => n,
					None => {
						if table.len() >= p.num_z2 {
							self.s.set_fail(ErrorKind::RenameExhausted(c));
							return emitted;
						}
						let n = table.len() as u32;
						table.push(n1 as u32);
						self.names.insert(n1, n);
						n
					}
				};
				dst.push(c, row, 0, 4, ((name as u64) << z1) | (rec >> z1));
				emitted += 1;
			}
		}
		self.s.rename.publish_second(side, c, table);
		emitted
	}

	/// Last round: rename the remaining side and write out the final edge
	/// list on fully compressed ids
	fn stage2_final(&mut self, src: &BucketArena, c: usize) -> u64 {
		let p = &self.s.params;
		let (z1, z2) = (p.z1_bits, p.z2_bits);
		let z1mask = (p.num_z1 - 1) as u64;
		let mut table: Vec<u32> = Vec::new();
		let mut emitted = 0u64;
		self.names.begin_tile();
		for row in 0..p.num_x {
			for rec in src.records(row, c, 0, 4) {
				let n1 = rec & z1mask;
				if !self.degrees.is_multi(n1) {
					continue;
				}
				let name = match self.names.get(n1) {
					Some(n) => n,
					None => {
						if table.len() >= p.num_z2 {
							self.s.set_fail(ErrorKind::RenameExhausted(c));
							return emitted;
						}
						let n = table.len() as u32;
						table.push(n1 as u32);
						self.names.insert(n1, n);
						n
					}
				};
				let u_pack = ((c as u32) << z2) | name;
				let v_pack = ((row as u32) << z2) | (rec >> z1) as u32;
				self.finals
					.push(((c * p.num_x + row) as u32, (u_pack << 16) | v_pack));
				emitted += 1;
			}
		}
		self.s.rename.publish_second(0, c, table);
		emitted
	}
}

fn run_block(s: &Shared, blk: usize) {
	let p = s.params.clone();
	let nx = p.num_x;
	let nb = p.num_blocks;
	let chunk = nx / nb;
	let mut ctx = BlockCtx::new(s);

	// round 0: enumerate all edge nonces, bucket the U endpoints
	if !s.is_aborted() {
		let per_block = p.num_edges / nb as u64;
		let start = blk as u64 * per_block;
		for nonce in start..start + per_block {
			let u = p.sipnode_raw(nonce, 0);
			let rec = (s.nonce_codec.encode(nonce) << p.yz_bits) | p.node_yz(u);
			s.gen.push(p.node_x(u), 0, blk, s.layout.slot0_bytes, rec);
		}
		s.counts[0].fetch_add(per_block, Ordering::Relaxed);
	}
	s.leader_sync(|s| {
		s.check_arena(&s.gen);
		debug!(
			"trim round 0: {} edges generated",
			s.counts[0].load(Ordering::Relaxed)
		);
	});

	// round 1: generate the V side, pruning U-side leaves as we go
	for i in 0..chunk {
		let ux = i * nb + blk;
		if !s.is_aborted() {
			ctx.stage1_gen(ux);
		}
		s.barrier.wait();
		if !s.is_aborted() {
			let n = ctx.stage2_gen(ux);
			s.counts[1].fetch_add(n, Ordering::Relaxed);
		}
		s.barrier.wait();
	}
	s.leader_sync(|s| {
		s.check_arena(&s.ping);
		debug!(
			"trim round 1: {} edges remain",
			s.counts[1].load(Ordering::Relaxed)
		);
	});

	// remaining rounds alternate the trimmed side, V on even rounds
	for round in 2..p.num_trims {
		let (src, dst) = if round % 2 == 0 {
			(&s.ping, &s.pong)
		} else {
			(&s.pong, &s.ping)
		};
		let side = if round % 2 == 0 { 1 } else { 0 };
		for i in 0..chunk {
			let c = i * nb + blk;
			if !s.is_aborted() {
				if round <= COMPRESSROUND {
					ctx.stage1_rebucket(round, src, c);
				} else if round == COMPRESSROUND + 1 {
					ctx.stage1_mid(src, c);
				} else {
					ctx.stage1_degree32(src, c);
				}
			}
			s.barrier.wait();
			if !s.is_aborted() {
				let n = if round < COMPRESSROUND {
					ctx.stage2_trim(round, dst, c)
				} else if round == COMPRESSROUND {
					ctx.stage2_rename1(dst, c, side)
				} else if round == COMPRESSROUND + 1 {
					ctx.stage2_rename1b(dst, c)
				} else if round < p.num_trims - 2 {
					ctx.stage2_emit32(src, dst, c)
				} else if round == p.num_trims - 2 {
					ctx.stage2_rename2(src, dst, c, side)
				} else {
					ctx.stage2_final(src, c)
				};
				s.counts[round as usize].fetch_add(n, Ordering::Relaxed);
			}
			s.barrier.wait();
		}
		s.leader_sync(|s| {
			s.check_arena(dst);
			src.reset();
			debug!(
				"trim round {}: {} edges remain",
				round,
				s.counts[round as usize].load(Ordering::Relaxed)
			);
		});
	}

	if !ctx.finals.is_empty() {
		s.final_edges.lock().extend(ctx.finals.drain(..));
	}
}

/// The trimming engine for one solve. Owns the bucket matrices and scratch
/// for the duration of the run; only the trimmed edge list and the rename
/// ladder outlive it.
pub struct Trimmer {
	params: Params,
	layout: Layout,
}

impl Trimmer {
	/// Set up a trimmer for the given (header-keyed) parameters
	pub fn new(params: &Params) -> Trimmer {
		Trimmer {
			params: params.clone(),
			layout: Layout::new(params),
		}
	}

	/// Run the full pipeline, returning the trimmed graph
	pub fn trim(&self) -> Result<TrimmedGraph, Error> {
		let shared = Arc::new(Shared::new(self.params.clone(), self.layout));
		let mut handles = Vec::with_capacity(self.params.num_blocks);
		for blk in 0..self.params.num_blocks {
			let s = shared.clone();
			let handle = thread::Builder::new()
				.name(format!("trim{}", blk))
				.spawn(move || run_block(&s, blk))?;
			handles.push(handle);
		}
		let mut panicked = false;
		for handle in handles {
			if handle.join().is_err() {
				panicked = true;
			}
		}
		let shared = Arc::try_unwrap(shared)
			.map_err(|_| Error::from(ErrorKind::Solver("trim blocks still running".to_owned())))?;
		if panicked {
			return Err(ErrorKind::Solver("trim block panicked".to_owned()).into());
		}
		if let Some(kind) = shared.fail.lock().take() {
			return Err(kind.into());
		}

		let nx = self.params.num_x;
		let mut buckets = vec![Vec::new(); nx * nx];
		for (bucket, rec) in shared.final_edges.into_inner() {
			buckets[bucket as usize].push(rec);
		}
		let stats = TrimStats {
			round_edges: shared
				.counts
				.iter()
				.map(|c| c.load(Ordering::Relaxed))
				.collect(),
		};
		info!(
			"trimmed {} edges down to {} in {} rounds",
			self.params.num_edges,
			buckets.iter().map(|b| b.len()).sum::<usize>(),
			self.params.num_trims
		);
		Ok(TrimmedGraph {
			num_x: nx,
			z2_bits: self.params.z2_bits,
			buckets,
			rename: shared.rename.finish(self.params.yz_bits),
			stats,
		})
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use std::collections::{HashMap, HashSet};

	fn trimmed_toy(edge_bits: u32, header: &[u8]) -> TrimmedGraph {
		let mut params = Params::new(edge_bits, 42, 20, 4).unwrap();
		params.reset_header_nonce(header.to_vec(), Some(20)).unwrap();
		Trimmer::new(&params).trim().unwrap()
	}

	#[test]
	fn survivor_counts_never_grow() {
		let graph = trimmed_toy(12, &[0u8; 80]);
		let counts = &graph.stats.round_edges;
		assert_eq!(counts[0], 1 << 12);
		for round in 1..counts.len() {
			assert!(
				counts[round] <= counts[round - 1],
				"round {} grew: {:?}",
				round,
				counts
			);
		}
		assert_eq!(graph.edge_count() as u64, counts[counts.len() - 1]);
	}

	#[test]
	fn last_trimmed_side_has_no_leaves() {
		let graph = trimmed_toy(12, &[7u8; 80]);
		let mut degrees: HashMap<u32, usize> = HashMap::new();
		for bucket in &graph.buckets {
			for rec in bucket {
				*degrees.entry(rec >> 16).or_insert(0) += 1;
			}
		}
		for (u, count) in degrees {
			assert!(count >= 2, "leaf survived on u node {:x}", u);
		}
	}

	#[test]
	fn rename_rows_are_bijective() {
		let graph = trimmed_toy(12, &[3u8; 80]);
		for row in graph.rename.first.iter().chain(graph.rename.second.iter()) {
			let distinct: HashSet<_> = row.iter().collect();
			assert_eq!(distinct.len(), row.len());
		}
	}

	#[test]
	fn compressed_ids_decompress_in_range() {
		let graph = trimmed_toy(12, &[1u8; 80]);
		let nx = graph.num_x as u32;
		for (b, bucket) in graph.buckets.iter().enumerate() {
			let (ux, vx) = (b as u32 / nx, b as u32 % nx);
			for rec in bucket {
				let u = rec >> 16;
				let v = rec & 0xffff;
				assert_eq!(u >> graph.z2_bits, ux);
				assert_eq!(v >> graph.z2_bits, vx);
				for &(side, pack) in [(0usize, u), (1usize, v)].iter() {
					let x = (pack >> graph.z2_bits) as usize;
					let n2 = pack & ((1u32 << graph.z2_bits) - 1);
					assert!(graph.rename.decompress(side, x, n2).is_some());
				}
			}
		}
	}
}
