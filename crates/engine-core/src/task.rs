// SPDX-License-Identifier: MIT OR Apache-2.0
//! The unit of work handed to [`crate::run`].

/// A task for the engine to carry out. `input` is caller-defined and is
/// threaded through to the root of the supervised fan-out program.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Task {
    pub name: String,
    #[serde(default)]
    pub input: serde_json::Value,
}

impl Task {
    pub fn new(name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            input,
        }
    }
}
