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

//! The engine: a process-wide value owning the job queues, the stop
//! protocol atomics and the background worker thread that pulls headers and
//! runs the solve pipeline. The C ABI resolves everything through the one
//! engine instance.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use util::Mutex;

use pow::{CuckooContext, Error, ErrorKind, Proof, EDGEBITS, PROOFSIZE};

use crate::props::{self, ParamError};
use crate::queue::{JobInput, JobOutput, JobQueues, PushResult};

lazy_static! {
	/// The one engine instance of this process
	pub static ref ENGINE: Engine = Engine::new();
}

/// Queues, worker lifecycle and tunable values behind the plugin ABI
pub struct Engine {
	queues: JobQueues,
	should_quit: AtomicBool,
	processing_finished: AtomicBool,
	worker: Mutex<Option<JoinHandle<()>>>,
	values: Mutex<HashMap<String, u32>>,
}

impl Engine {
	fn new() -> Engine {
		let values: HashMap<String, u32> = props::properties()
			.into_iter()
			.map(|p| (p.name, p.default_value))
			.collect();
		Engine {
			queues: JobQueues::new(),
			should_quit: AtomicBool::new(false),
			processing_finished: AtomicBool::new(true),
			worker: Mutex::new(None),
			values: Mutex::new(values),
		}
	}

	/// Queue a solve request unless shutdown is in progress
	pub fn push_input(&self, job: JobInput) -> PushResult {
		if self.should_quit.load(Ordering::Relaxed) {
			return PushResult::Stopped;
		}
		self.queues.push_input(job)
	}

	/// Take the oldest found proof, if any
	pub fn read_output(&self) -> Option<JobOutput> {
		self.queues.pop_output()
	}

	/// Whether the input queue can take more work
	pub fn is_queue_under_limit(&self) -> bool {
		self.queues.is_under_limit()
	}

	/// Best-effort drain of both queues
	pub fn clear_queues(&self) {
		self.queues.clear();
	}

	/// Launch the background worker. Returns false if it is already running
	/// or the thread could not be spawned.
	pub fn start(&self) -> bool {
		let mut worker = self.worker.lock();
		if let Some(handle) = worker.take() {
			if !self.processing_finished.load(Ordering::Acquire) {
				*worker = Some(handle);
				return false;
			}
			let _ = handle.join();
		}
		self.processing_finished.store(false, Ordering::Release);
		match thread::Builder::new()
			.name("cuckoo-worker".to_owned())
			.spawn(|| ENGINE.worker_loop())
		{
			Ok(handle) => {
				*worker = Some(handle);
				true
			}
			Err(e) => {
				error!("failed to spawn solver worker: {}", e);
				self.processing_finished.store(true, Ordering::Release);
				false
			}
		}
	}

	/// Ask the worker to wind down after its in-flight solve
	pub fn stop(&self) {
		self.should_quit.store(true, Ordering::Release);
	}

	/// Whether the worker and any in-flight solve have both finished
	pub fn has_stopped(&self) -> bool {
		self.processing_finished.load(Ordering::Relaxed)
	}

	/// Clear the stop flag; does not restart the worker
	pub fn reset(&self) {
		self.should_quit.store(false, Ordering::Release);
	}

	/// Current value of a tunable
	pub fn get_parameter(&self, name: &str) -> Option<u32> {
		self.values.lock().get(name).cloned()
	}

	/// Write a tunable, enforcing its declared range
	pub fn set_parameter(&self, name: &str, value: u32) -> Result<(), ParamError> {
		let prop = props::properties()
			.into_iter()
			.find(|p| p.name == name)
			.ok_or(ParamError::Unknown)?;
		if value < prop.min_value || value > prop.max_value {
			return Err(ParamError::OutOfRange);
		}
		self.values.lock().insert(prop.name, value);
		Ok(())
	}

	/// One synchronous solve of the given header at this build's graph size
	pub fn solve(&self, header: &[u8]) -> Result<Vec<Proof>, Error> {
		let (num_trims, num_threads) = {
			let values = self.values.lock();
			(
				*values.get("NUM_TRIMS").unwrap_or(&pow::NUM_TRIMS_PARAM),
				*values.get("NUM_THREADS").unwrap_or(&pow::NUM_THREADS_PARAM),
			)
		};
		let mut ctx = CuckooContext::new(EDGEBITS, PROOFSIZE, num_trims, num_threads)?;
		ctx.set_header_nonce(header.to_vec(), None)?;
		ctx.find_cycles()
	}

	fn worker_loop(&self) {
		info!("solver worker started");
		loop {
			// polled at queue boundaries only, in-flight solves run to
			// completion
			if self.should_quit.load(Ordering::Relaxed) {
				break;
			}
			match self.queues.pop_input() {
				Some(job) => self.solve_job(job),
				None => thread::sleep(Duration::from_micros(1)),
			}
		}
		self.queues.clear();
		info!("solver worker stopped");
		self.processing_finished.store(true, Ordering::Release);
	}

	fn solve_job(&self, job: JobInput) {
		match self.solve(&job.data) {
			Ok(sols) => {
				for proof in sols {
					self.queues.push_output(JobOutput {
						id: job.id,
						nonces: proof.nonces.iter().map(|&n| n as u32).collect(),
						cuckoo_size: EDGEBITS,
						nonce: job.nonce,
					});
				}
			}
			Err(ref e) if e.kind() == ErrorKind::NoSolution => {
				debug!("job {}: no solution", job.id);
			}
			Err(e) => {
				// fatal solver failures collapse to "no solution for this
				// job", the worker moves on to the next input
				error!("job {}: solve failed: {}", job.id, e);
			}
		}
	}
}
