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

//! Shared-library plugin around the mean Cuckoo Cycle solver: a bounded job
//! queue fed by external callers, a background worker that runs the solve
//! pipeline and publishes any proofs found, and the C ABI miners load.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![warn(missing_docs)]

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;

extern crate cuckoo_mean_core as pow;
extern crate cuckoo_mean_util as util;

pub mod ffi;
pub mod props;
pub mod queue;
pub mod worker;

pub use crate::queue::{JobInput, JobOutput, PushResult};
pub use crate::worker::ENGINE;
