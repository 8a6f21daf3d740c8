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

//! The job queues bridging external callers and the solver worker: a bounded
//! input queue of headers to solve and an output queue of found proofs.

use std::collections::VecDeque;

use util::Mutex;

/// Most jobs the input queue will hold before push reports back-pressure
pub const MAX_QUEUE_LEN: usize = 20;

/// Most header bytes a job may carry
pub const MAX_DATA_LEN: usize = 2048;

/// One queued solve request
#[derive(Clone, Debug)]
pub struct JobInput {
	/// Caller-chosen id correlating outputs to inputs
	pub id: u32,
	/// The header blob keying the graph
	pub data: Vec<u8>,
	/// Opaque 8 nonce bytes, echoed back with any solution
	pub nonce: [u8; 8],
}

/// One found proof, keyed back to its request
#[derive(Clone, Debug)]
pub struct JobOutput {
	/// Id of the input this solves
	pub id: u32,
	/// The cycle nonces, ascending
	pub nonces: Vec<u32>,
	/// Graph size the solver ran at
	pub cuckoo_size: u32,
	/// Nonce bytes of the input, echoed back
	pub nonce: [u8; 8],
}

/// Outcome of a push onto the input queue
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushResult {
	/// Accepted
	Ok,
	/// Queue is at capacity
	Full,
	/// Header data exceeds the size cap
	TooLong,
	/// Shutdown in progress
	Stopped,
}

impl PushResult {
	/// The C ABI status code for this outcome
	pub fn code(self) -> i32 {
		match self {
			PushResult::Ok => 0,
			PushResult::Full => 1,
			PushResult::TooLong => 2,
			PushResult::Stopped => 4,
		}
	}
}

/// Input and output queues of the solver worker
pub struct JobQueues {
	input: Mutex<VecDeque<JobInput>>,
	output: Mutex<VecDeque<JobOutput>>,
}

impl JobQueues {
	/// Empty queues
	pub fn new() -> JobQueues {
		JobQueues {
			input: Mutex::new(VecDeque::new()),
			output: Mutex::new(VecDeque::new()),
		}
	}

	/// Queue a job, respecting the data and queue length caps
	pub fn push_input(&self, job: JobInput) -> PushResult {
		if job.data.len() > MAX_DATA_LEN {
			return PushResult::TooLong;
		}
		let mut input = self.input.lock();
		if input.len() >= MAX_QUEUE_LEN {
			return PushResult::Full;
		}
		input.push_back(job);
		PushResult::Ok
	}

	/// Take the oldest queued job, if any
	pub fn pop_input(&self) -> Option<JobInput> {
		self.input.lock().pop_front()
	}

	/// Publish a found proof
	pub fn push_output(&self, out: JobOutput) {
		self.output.lock().push_back(out);
	}

	/// Take the oldest published proof, if any
	pub fn pop_output(&self) -> Option<JobOutput> {
		self.output.lock().pop_front()
	}

	/// Number of jobs waiting to be solved
	pub fn input_len(&self) -> usize {
		self.input.lock().len()
	}

	/// Whether the input queue can take more work
	pub fn is_under_limit(&self) -> bool {
		self.input_len() < MAX_QUEUE_LEN
	}

	/// Drop everything queued in both directions
	pub fn clear(&self) {
		self.input.lock().clear();
		self.output.lock().clear();
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn job(id: u32) -> JobInput {
		JobInput {
			id,
			data: vec![0u8; 80],
			nonce: [0u8; 8],
		}
	}

	#[test]
	fn input_queue_back_pressure() {
		let queues = JobQueues::new();
		for id in 0..MAX_QUEUE_LEN as u32 {
			assert_eq!(queues.push_input(job(id)), PushResult::Ok);
		}
		assert!(!queues.is_under_limit());
		assert_eq!(queues.push_input(job(99)), PushResult::Full);

		// popping one makes room again
		assert_eq!(queues.pop_input().unwrap().id, 0);
		assert!(queues.is_under_limit());
		assert_eq!(queues.push_input(job(100)), PushResult::Ok);
	}

	#[test]
	fn oversized_data_is_rejected() {
		let queues = JobQueues::new();
		let fat = JobInput {
			id: 1,
			data: vec![0u8; MAX_DATA_LEN + 1],
			nonce: [0u8; 8],
		};
		assert_eq!(queues.push_input(fat), PushResult::TooLong);
		assert_eq!(queues.input_len(), 0);
	}

	#[test]
	fn clear_drains_both_sides() {
		let queues = JobQueues::new();
		queues.push_input(job(1));
		queues.push_output(JobOutput {
			id: 1,
			nonces: vec![0; 42],
			cuckoo_size: 15,
			nonce: [0u8; 8],
		});
		queues.clear();
		assert!(queues.pop_input().is_none());
		assert!(queues.pop_output().is_none());
	}
}
