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

//! Drives the plugin the way a miner host does: through the C ABI and the
//! process-wide engine. Everything lives in one test so the shared engine
//! goes through its lifecycle in a defined order.

extern crate cuckoo_mean;
extern crate cuckoo_mean_core as pow;
extern crate cuckoo_mean_util as util;
extern crate serde_json;

use std::thread;
use std::time::{Duration, Instant};

use cuckoo_mean::ffi::*;
use cuckoo_mean::props::{PluginProperty, MAX_PROPERTIES};

// a header known to hide cycles at the compat graph size
fn known_header() -> Vec<u8> {
	let mut header = vec![0u8; 80];
	header[76..].copy_from_slice(&1546569u32.to_le_bytes());
	header
}

#[test]
fn plugin_lifecycle() {
	util::init_test_logger();

	// capability query
	let mut buf = vec![0u8; 4096];
	let mut len = buf.len() as u32;
	assert_eq!(cuckoo_parameter_list(buf.as_mut_ptr(), &mut len), 0);
	let props: Vec<PluginProperty> = serde_json::from_slice(&buf[..len as usize]).unwrap();
	assert!(!props.is_empty() && props.len() <= MAX_PROPERTIES);
	// an undersized buffer reports the needed length instead
	let mut small = 2u32;
	assert_eq!(cuckoo_parameter_list(buf.as_mut_ptr(), &mut small), 3);
	assert_eq!(small, len);

	// tunable reads and writes
	let name = b"NUM_THREADS";
	let mut value = 0u32;
	assert_eq!(
		cuckoo_get_parameter(name.as_ptr(), name.len() as u32, &mut value),
		0
	);
	assert_eq!(value, pow::NUM_THREADS_PARAM);
	assert_eq!(cuckoo_set_parameter(name.as_ptr(), name.len() as u32, 2), 0);
	assert_eq!(
		cuckoo_get_parameter(name.as_ptr(), name.len() as u32, &mut value),
		0
	);
	assert_eq!(value, 2);
	assert_eq!(cuckoo_set_parameter(name.as_ptr(), name.len() as u32, 0), 2);
	let bogus = b"NUM_POTATOES";
	assert_eq!(cuckoo_set_parameter(bogus.as_ptr(), bogus.len() as u32, 1), 1);

	// back-pressure with no worker running
	let header = known_header();
	let nonce = [0u8; 8];
	for id in 0..20 {
		assert_eq!(
			cuckoo_push_to_input_queue(id, header.as_ptr(), header.len() as u32, nonce.as_ptr()),
			0
		);
	}
	assert_eq!(cuckoo_is_queue_under_limit(), 0);
	assert_eq!(
		cuckoo_push_to_input_queue(20, header.as_ptr(), header.len() as u32, nonce.as_ptr()),
		1
	);
	let fat = vec![0u8; 4096];
	assert_eq!(
		cuckoo_push_to_input_queue(21, fat.as_ptr(), fat.len() as u32, nonce.as_ptr()),
		2
	);
	cuckoo_clear_queues();
	assert_eq!(cuckoo_is_queue_under_limit(), 1);

	// synchronous solve; the known solution only exists on the compat build
	if pow::EDGEBITS == 15 {
		let mut nonces = [0u32; 42];
		assert_eq!(
			cuckoo_call(header.as_ptr(), header.len() as u32, nonces.as_mut_ptr()),
			1
		);
		for w in nonces.windows(2) {
			assert!(w[0] < w[1]);
		}
		// and the ABI output verifies against an independently keyed graph
		let mut ctx =
			pow::CuckooContext::new(pow::EDGEBITS, pow::PROOFSIZE, pow::NUM_TRIMS_PARAM, 2)
				.unwrap();
		ctx.set_header_nonce(header.clone(), None).unwrap();
		ctx.verify(&pow::Proof::new(
			nonces.iter().map(|&n| n as u64).collect(),
		))
		.unwrap();
	}

	// worker lifecycle
	assert_eq!(cuckoo_start_processing(), 1);
	if pow::EDGEBITS == 15 {
		let mut sent = [0xabu8; 8];
		sent[0] = 0xcd;
		assert_eq!(
			cuckoo_push_to_input_queue(7, header.as_ptr(), header.len() as u32, sent.as_ptr()),
			0
		);
		let mut id = 0u32;
		let mut out = [0u32; 42];
		let mut size = 0u32;
		let mut echoed = [0u8; 8];
		let deadline = Instant::now() + Duration::from_secs(30);
		loop {
			if cuckoo_read_from_output_queue(
				&mut id,
				out.as_mut_ptr(),
				&mut size,
				echoed.as_mut_ptr(),
			) == 1
			{
				break;
			}
			assert!(Instant::now() < deadline, "no solution published in time");
			thread::sleep(Duration::from_millis(20));
		}
		assert_eq!(id, 7);
		assert_eq!(size, pow::EDGEBITS);
		assert_eq!(echoed, sent);
	}

	// graceful shutdown drains and refuses further work
	assert_eq!(cuckoo_stop_processing(), 1);
	let deadline = Instant::now() + Duration::from_secs(30);
	while cuckoo_has_processing_stopped() == 0 {
		assert!(Instant::now() < deadline, "worker did not stop");
		thread::sleep(Duration::from_millis(20));
	}
	assert_eq!(
		cuckoo_push_to_input_queue(8, header.as_ptr(), header.len() as u32, nonce.as_ptr()),
		4
	);
	cuckoo_reset_processing();
	assert_eq!(
		cuckoo_push_to_input_queue(9, header.as_ptr(), header.len() as u32, nonce.as_ptr()),
		0
	);
	cuckoo_clear_queues();
}
