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

//! The C entry points miners load this plugin through. Raw pointers are
//! handled at this boundary only; everything resolves onto the process-wide
//! engine.

use std::os::raw::{c_int, c_uchar, c_uint};
use std::ptr;
use std::slice;

use pow::PROOFSIZE;

use crate::props;
use crate::queue::{JobInput, MAX_DATA_LEN};
use crate::worker::ENGINE;

/// Synchronous single solve: hash the header, trim, look for cycles. Writes
/// 42 nonces and returns 1 when a proof is found, 0 otherwise.
#[no_mangle]
pub extern "C" fn cuckoo_call(
	header_data: *const c_uchar,
	header_len: c_uint,
	out_nonces: *mut c_uint,
) -> c_int {
	if header_data.is_null() || out_nonces.is_null() || header_len as usize > MAX_DATA_LEN {
		return 0;
	}
	let header = unsafe { slice::from_raw_parts(header_data, header_len as usize) };
	match ENGINE.solve(header) {
		Ok(sols) => {
			for (i, n) in sols[0].nonces.iter().take(PROOFSIZE).enumerate() {
				unsafe {
					*out_nonces.add(i) = *n as c_uint;
				}
			}
			1
		}
		Err(_) => 0,
	}
}

/// Launch the background worker, 1 on success
#[no_mangle]
pub extern "C" fn cuckoo_start_processing() -> c_int {
	ENGINE.start() as c_int
}

/// Request a graceful worker shutdown
#[no_mangle]
pub extern "C" fn cuckoo_stop_processing() -> c_int {
	ENGINE.stop();
	1
}

/// 1 once the worker and its in-flight solve have both finished
#[no_mangle]
pub extern "C" fn cuckoo_has_processing_stopped() -> c_int {
	ENGINE.has_stopped() as c_int
}

/// Clear the stop flag so the worker can be started again
#[no_mangle]
pub extern "C" fn cuckoo_reset_processing() -> c_int {
	ENGINE.reset();
	1
}

/// Queue a header to solve. 0 ok, 1 queue full, 2 data too long, 4 shutting
/// down.
#[no_mangle]
pub extern "C" fn cuckoo_push_to_input_queue(
	id: c_uint,
	data: *const c_uchar,
	data_len: c_uint,
	nonce: *const c_uchar,
) -> c_int {
	if data.is_null() || nonce.is_null() || data_len as usize > MAX_DATA_LEN {
		return 2;
	}
	let data = unsafe { slice::from_raw_parts(data, data_len as usize) };
	let mut nonce_bytes = [0u8; 8];
	nonce_bytes.copy_from_slice(unsafe { slice::from_raw_parts(nonce, 8) });
	ENGINE
		.push_input(JobInput {
			id,
			data: data.to_vec(),
			nonce: nonce_bytes,
		})
		.code()
}

/// Dequeue one found proof: writes the id, the 42 nonces, the graph size and
/// the echoed nonce bytes. 1 on success, 0 when the queue is empty.
#[no_mangle]
pub extern "C" fn cuckoo_read_from_output_queue(
	id: *mut c_uint,
	out_nonces: *mut c_uint,
	cuckoo_size: *mut c_uint,
	nonce: *mut c_uchar,
) -> c_int {
	if id.is_null() || out_nonces.is_null() || cuckoo_size.is_null() || nonce.is_null() {
		return 0;
	}
	match ENGINE.read_output() {
		Some(out) => {
			unsafe {
				*id = out.id;
				for (i, n) in out.nonces.iter().take(PROOFSIZE).enumerate() {
					*out_nonces.add(i) = *n;
				}
				*cuckoo_size = out.cuckoo_size;
				ptr::copy_nonoverlapping(out.nonce.as_ptr(), nonce, out.nonce.len());
			}
			1
		}
		None => 0,
	}
}

/// 1 while the input queue can take more work
#[no_mangle]
pub extern "C" fn cuckoo_is_queue_under_limit() -> c_int {
	ENGINE.is_queue_under_limit() as c_int
}

/// Best-effort drain of both queues
#[no_mangle]
pub extern "C" fn cuckoo_clear_queues() {
	ENGINE.clear_queues();
}

/// Write the property registry as JSON into the caller's buffer. On entry
/// `len` holds the buffer size; on exit the JSON length. 0 ok, 3 buffer too
/// small.
#[no_mangle]
pub extern "C" fn cuckoo_parameter_list(out_buf: *mut c_uchar, len: *mut c_uint) -> c_int {
	if out_buf.is_null() || len.is_null() {
		return 3;
	}
	let json = match props::properties_json() {
		Ok(json) => json,
		Err(_) => return 3,
	};
	unsafe {
		if (*len as usize) < json.len() {
			*len = json.len() as c_uint;
			return 3;
		}
		ptr::copy_nonoverlapping(json.as_ptr(), out_buf, json.len());
		*len = json.len() as c_uint;
	}
	0
}

fn name_from_raw(name: *const c_uchar, name_len: c_uint) -> Option<String> {
	if name.is_null() || name_len as usize > props::MAX_NAME_LEN {
		return None;
	}
	let bytes = unsafe { slice::from_raw_parts(name, name_len as usize) };
	String::from_utf8(bytes.to_vec()).ok()
}

/// Read a tunable by name. 0 ok, 1 unknown property, 4 name too long.
#[no_mangle]
pub extern "C" fn cuckoo_get_parameter(
	name: *const c_uchar,
	name_len: c_uint,
	value: *mut c_uint,
) -> c_int {
	if value.is_null() {
		return 1;
	}
	let name = match name_from_raw(name, name_len) {
		Some(name) => name,
		None => return 4,
	};
	match ENGINE.get_parameter(&name) {
		Some(v) => {
			unsafe {
				*value = v;
			}
			0
		}
		None => 1,
	}
}

/// Write a tunable by name. 0 ok, 1 unknown property, 2 value out of range,
/// 4 name too long.
#[no_mangle]
pub extern "C" fn cuckoo_set_parameter(
	name: *const c_uchar,
	name_len: c_uint,
	value: c_uint,
) -> c_int {
	let name = match name_from_raw(name, name_len) {
		Some(name) => name,
		None => return 4,
	};
	match ENGINE.set_parameter(&name, value) {
		Ok(()) => 0,
		Err(props::ParamError::Unknown) => 1,
		Err(props::ParamError::OutOfRange) => 2,
	}
}
