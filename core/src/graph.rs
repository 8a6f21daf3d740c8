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

//! Cycle finding over the trimmed edge list. The cuckoo table encodes a
//! forest as an index-to-index map over compressed node ids; every trimmed
//! edge either extends a tree or closes a cycle, and cycles of the proof
//! length are reported with their edges.

use std::cmp;

use crate::error::{Error, ErrorKind};
use crate::params::{Params, MAX_SOLS};
use crate::trim::TrimmedGraph;

const NIL: u32 = u32::max_value();

/// A cycle of proof length, expressed as the compressed (u, v) id pairs of
/// its edges
pub struct CycleSol {
	/// The cycle edges, compressed ids without the partition bit
	pub edges: Vec<(u32, u32)>,
}

/// Path-growing cycle finder over the surviving bipartite graph
pub struct CycleFinder<'a> {
	params: &'a Params,
	graph: &'a TrimmedGraph,
	cuckoo: Vec<u32>,
	max_path: usize,
}

impl<'a> CycleFinder<'a> {
	/// Set up the forest table for the compressed id space
	pub fn new(params: &'a Params, graph: &'a TrimmedGraph) -> CycleFinder<'a> {
		CycleFinder {
			params,
			graph,
			cuckoo: vec![NIL; 2 * params.num_x * params.num_z2],
			// grows with the cube root of the node count
			max_path: 8 << ((params.edge_bits + 3) / 3),
		}
	}

	/// Consume the trimmed buckets and report every cycle of proof length,
	/// first come first served
	pub fn find_cycles(&mut self) -> Result<Vec<CycleSol>, Error> {
		let mut us = vec![0u32; self.max_path];
		let mut vs = vec![0u32; self.max_path];
		let mut sols = vec![];
		let nx = self.graph.num_x;
		for vx in 0..nx {
			for ux in 0..nx {
				for &rec in &self.graph.buckets[ux * nx + vx] {
					// low bit of a node id encodes the partition
					let u0 = (rec >> 16) << 1;
					let v0 = ((rec & 0xffff) << 1) | 1;
					us[0] = u0;
					vs[0] = v0;
					let nu = self.path(u0, &mut us)?;
					let nv = self.path(v0, &mut vs)?;
					if us[nu] == vs[nv] {
						// both paths end at the same root, this edge closes
						// a cycle; drop the common tail and walk to the
						// meeting point
						let min = cmp::min(nu, nv);
						let (mut nu, mut nv) = (nu - min, nv - min);
						while us[nu] != vs[nv] {
							nu += 1;
							nv += 1;
						}
						let len = nu + nv + 1;
						if len == self.params.proof_size {
							sols.push(self.solution(&us, nu, &vs, nv));
							if sols.len() >= MAX_SOLS {
								return Ok(sols);
							}
						} else {
							debug!("{}-cycle found", len);
						}
					} else if nu < nv {
						// extend the shorter path: reverse it and hang its
						// root off the other endpoint
						let mut nu = nu;
						while nu != 0 {
							nu -= 1;
							self.cuckoo[us[nu + 1] as usize] = us[nu];
						}
						self.cuckoo[u0 as usize] = v0;
					} else {
						let mut nv = nv;
						while nv != 0 {
							nv -= 1;
							self.cuckoo[vs[nv + 1] as usize] = vs[nv];
						}
						self.cuckoo[v0 as usize] = u0;
					}
				}
			}
		}
		Ok(sols)
	}

	fn path(&self, start: u32, out: &mut [u32]) -> Result<usize, Error> {
		let mut node = start;
		let mut n = 0usize;
		out[0] = start;
		while self.cuckoo[node as usize] != NIL {
			node = self.cuckoo[node as usize];
			n += 1;
			if n >= self.max_path {
				// a path this long means the table is corrupt
				return Err(ErrorKind::Path.into());
			}
			out[n] = node;
		}
		Ok(n)
	}

	fn solution(&self, us: &[u32], mut nu: usize, vs: &[u32], mut nv: usize) -> CycleSol {
		let mut edges = Vec::with_capacity(self.params.proof_size);
		edges.push((us[0] >> 1, vs[0] >> 1));
		while nu != 0 {
			// u's in even position; v's in odd
			nu -= 1;
			edges.push((us[(nu + 1) & !1] >> 1, us[nu | 1] >> 1));
		}
		while nv != 0 {
			// u's in odd position; v's in even
			nv -= 1;
			edges.push((vs[nv | 1] >> 1, vs[(nv + 1) & !1] >> 1));
		}
		CycleSol { edges }
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::trim::rename::RenameBuild;
	use crate::trim::{TrimStats, TrimmedGraph};

	// hand-built trimmed graph on 16-bit packed ids; num_x = 1 so the pack
	// is just the second-rename name
	fn graph_of(edges: &[(u32, u32)]) -> TrimmedGraph {
		TrimmedGraph {
			num_x: 1,
			z2_bits: 9,
			buckets: vec![edges.iter().map(|&(u, v)| (u << 16) | v).collect()],
			rename: RenameBuild::new(1).finish(10),
			stats: TrimStats {
				round_edges: vec![],
			},
		}
	}

	fn params_for(proof_size: usize) -> Params {
		Params::new(12, proof_size, 20, 1).unwrap()
	}

	#[test]
	fn finds_a_short_cycle() {
		// u0-v0, u1-v0, u1-v1, u0-v1 is a 4-cycle
		let graph = graph_of(&[(0, 0), (1, 0), (1, 1), (0, 1)]);
		let params = params_for(4);
		let sols = CycleFinder::new(&params, &graph).find_cycles().unwrap();
		assert_eq!(sols.len(), 1);
		let mut edges = sols[0].edges.clone();
		edges.sort_unstable();
		assert_eq!(edges, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
	}

	#[test]
	fn ignores_wrong_length_cycles() {
		// a 4-cycle and a separate 6-cycle, only the 6-cycle matches
		let graph = graph_of(&[
			(0, 0),
			(1, 0),
			(1, 1),
			(0, 1),
			(2, 2),
			(3, 2),
			(3, 3),
			(4, 3),
			(4, 4),
			(2, 4),
		]);
		let params = params_for(6);
		let sols = CycleFinder::new(&params, &graph).find_cycles().unwrap();
		assert_eq!(sols.len(), 1);
		let mut edges = sols[0].edges.clone();
		edges.sort_unstable();
		assert_eq!(
			edges,
			vec![(2, 2), (2, 4), (3, 2), (3, 3), (4, 3), (4, 4)]
		);
	}

	#[test]
	fn empty_graph_has_no_cycles() {
		let graph = graph_of(&[]);
		let params = params_for(42);
		let sols = CycleFinder::new(&params, &graph).find_cycles().unwrap();
		assert!(sols.is_empty());
	}
}
