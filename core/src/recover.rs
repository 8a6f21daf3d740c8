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

//! Recovery of the original edge nonces witnessing a cycle found on
//! compressed ids: walk the rename ladder back to full node ids, then
//! re-enumerate the edge space and match endpoint pairs. Only nonces whose
//! U endpoint lands in one of the cycle's (x, y) tiles get hashed twice.

use std::collections::HashMap;

use croaring::Bitmap;

use crate::error::{Error, ErrorKind};
use crate::graph::CycleSol;
use crate::params::Params;
use crate::proof::Proof;
use crate::trim::TrimmedGraph;

/// Map a cycle on compressed ids back to its sorted edge nonces
pub fn recover(params: &Params, graph: &TrimmedGraph, sol: &CycleSol) -> Result<Proof, Error> {
	let z2_mask = (1u32 << graph.z2_bits) - 1;
	let mut pairs: HashMap<(u64, u64), usize> = HashMap::with_capacity(sol.edges.len());
	let mut prefixes = Bitmap::new();
	for (slot, &(u_pack, v_pack)) in sol.edges.iter().enumerate() {
		let u = graph
			.rename
			.decompress(0, (u_pack >> graph.z2_bits) as usize, u_pack & z2_mask)
			.ok_or_else(|| ErrorKind::Verification("rename ladder broken on u".to_owned()))?;
		let v = graph
			.rename
			.decompress(1, (v_pack >> graph.z2_bits) as usize, v_pack & z2_mask)
			.ok_or_else(|| ErrorKind::Verification("rename ladder broken on v".to_owned()))?;
		prefixes.add((u >> params.z_bits) as u32);
		pairs.insert((u, v), slot);
	}

	let mut nonces: Vec<Option<u64>> = vec![None; sol.edges.len()];
	for nonce in 0..params.num_edges {
		let u = params.sipnode_raw(nonce, 0);
		if !prefixes.contains((u >> params.z_bits) as u32) {
			continue;
		}
		let v = params.sipnode_raw(nonce, 1);
		if let Some(&slot) = pairs.get(&(u, v)) {
			if nonces[slot].is_none() {
				nonces[slot] = Some(nonce);
			}
		}
	}

	let mut out = Vec::with_capacity(sol.edges.len());
	for n in nonces {
		match n {
			Some(n) => out.push(n),
			None => {
				return Err(
					ErrorKind::Verification("cycle edge has no witnessing nonce".to_owned()).into(),
				);
			}
		}
	}
	let mut proof = Proof::new(out);
	proof.edge_bits = params.edge_bits;
	Ok(proof)
}
