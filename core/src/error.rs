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

//! Solver specific errors
use failure::{Backtrace, Context, Fail};
use std::fmt::{self, Display};
use std::io;

/// Solver or validation error
#[derive(Debug)]
pub struct Error {
	inner: Context<ErrorKind>,
}

/// Solver error types
#[derive(Clone, Debug, Eq, Fail, PartialEq)]
pub enum ErrorKind {
	/// Verification error
	#[fail(display = "Verification Error: {}", _0)]
	Verification(String),
	/// Unworkable solver parameters
	#[fail(display = "Invalid Parameters: {}", _0)]
	Params(String),
	/// A bucket filled past its statistical margin
	#[fail(display = "Bucket Overflow at ({}, {})", _0, _1)]
	BucketOverflow(usize, usize),
	/// A rename table ran out of fresh ids
	#[fail(display = "Rename Table Exhausted in row {}", _0)]
	RenameExhausted(usize),
	/// Lag-window decoding produced an out-of-range value
	#[fail(display = "Delta Decode Failure in bucket ({}, {})", _0, _1)]
	DeltaDecode(usize, usize),
	/// Cuckoo path grew past the hard cap
	#[fail(display = "Path Error")]
	Path,
	/// Internal solver failure
	#[fail(display = "Solver Error: {}", _0)]
	Solver(String),
	/// No Solution
	#[fail(display = "No Solution")]
	NoSolution,
	/// IO Error
	#[fail(display = "IO Error")]
	IOError,
}

impl Fail for Error {
	fn cause(&self) -> Option<&dyn Fail> {
		self.inner.cause()
	}

	fn backtrace(&self) -> Option<&Backtrace> {
		self.inner.backtrace()
	}
}

impl Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		Display::fmt(&self.inner, f)
	}
}

impl Error {
	/// Return errorkind
	pub fn kind(&self) -> ErrorKind {
		self.inner.get_context().clone()
	}
}

impl From<ErrorKind> for Error {
	fn from(kind: ErrorKind) -> Error {
		Error {
			inner: Context::new(kind),
		}
	}
}

impl From<Context<ErrorKind>> for Error {
	fn from(inner: Context<ErrorKind>) -> Error {
		Error { inner }
	}
}

impl From<io::Error> for Error {
	fn from(_error: io::Error) -> Error {
		Error {
			inner: Context::new(ErrorKind::IOError),
		}
	}
}
