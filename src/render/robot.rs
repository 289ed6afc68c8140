//! Robot-mode output (JSON).
//!
//! Every command emits the same envelope so scripts can parse output without
//! knowing which command produced it.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;

/// Schema identifier for robot output.
pub const SCHEMA_VERSION: &str = "cswap.v1";

/// Robot output envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotOutput<T> {
    pub schema_version: &'static str,
    pub generated_at: DateTime<Utc>,
    pub command: String,
    pub data: T,
}

impl<T> RobotOutput<T> {
    /// Create a new robot output envelope.
    pub fn new(command: impl Into<String>, data: T) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            generated_at: Utc::now(),
            command: command.into(),
            data,
        }
    }
}

/// Render `data` wrapped in the envelope for `command`.
pub fn render_json<T: Serialize>(command: &str, data: &T, pretty: bool) -> Result<String> {
    let output = RobotOutput::new(command, data);
    if pretty {
        Ok(serde_json::to_string_pretty(&output)?)
    } else {
        Ok(serde_json::to_string(&output)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_carries_schema_and_command() {
        let json = render_json("list", &vec![1, 2], false).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["schemaVersion"], SCHEMA_VERSION);
        assert_eq!(value["command"], "list");
        assert_eq!(value["data"], serde_json::json!([1, 2]));
    }

    #[test]
    fn pretty_output_is_multiline() {
        let json = render_json("status", &serde_json::json!({"total": 0}), true).unwrap();
        assert!(json.contains('\n'));
    }
}
