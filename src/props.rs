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

//! The plugin property registry: the named tunables this build exposes to
//! its host, serializable to a JSON array for capability queries.

/// Most properties a plugin may declare
pub const MAX_PROPERTIES: usize = 32;

/// Longest allowed property name
pub const MAX_NAME_LEN: usize = 64;

/// Longest allowed property description
pub const MAX_DESCRIPTION_LEN: usize = 256;

/// One named tunable
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PluginProperty {
	/// Property name callers address it by
	pub name: String,
	/// Human readable description
	pub description: String,
	/// Value used when the caller sets nothing
	pub default_value: u32,
	/// Smallest accepted value
	pub min_value: u32,
	/// Largest accepted value
	pub max_value: u32,
	/// Whether the property applies per device rather than globally
	pub is_per_device: bool,
}

/// Why a parameter write was refused
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamError {
	/// No property of that name
	Unknown,
	/// Value outside the declared min/max
	OutOfRange,
}

/// The tunables this build exposes
pub fn properties() -> Vec<PluginProperty> {
	vec![
		PluginProperty {
			name: "NUM_THREADS".to_owned(),
			description: "Number of worker blocks the trimming pipeline runs with".to_owned(),
			default_value: pow::NUM_THREADS_PARAM,
			min_value: 1,
			max_value: 64,
			is_per_device: false,
		},
		PluginProperty {
			name: "NUM_TRIMS".to_owned(),
			description: "Number of trim rounds, even, at least the compression round plus four"
				.to_owned(),
			default_value: pow::NUM_TRIMS_PARAM,
			min_value: 20,
			max_value: 128,
			is_per_device: false,
		},
	]
}

/// The registry as its JSON wire form
pub fn properties_json() -> Result<String, serde_json::Error> {
	serde_json::to_string(&properties())
}
