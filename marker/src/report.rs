//! # Grading Report Module
//!
//! A report is the JSON array written for one exercise: the `<COMPILE>` case
//! first, then every test case in fixture order.
//!
//! ## JSON Output Example
//!
//! ```json
//! [
//!     {
//!         "actual_output": null,
//!         "args": null,
//!         "diffs": null,
//!         "errors": "",
//!         "expected_output": null,
//!         "input": null,
//!         "name": "<COMPILE>"
//!     },
//!     {
//!         "actual_output": "Ciao, mondo!\n",
//!         "args": ["mondo"],
//!         "diffs": null,
//!         "errors": "",
//!         "expected_output": "Ciao, mondo!\n",
//!         "input": null,
//!         "name": "1"
//!     }
//! ]
//! ```
//!
//! ## Design Notes
//!
//! - Output is deterministic: object keys are sorted, indentation is four spaces and
//!   non-ASCII text is written literally rather than escaped, so reports diff cleanly.
//! - [`read_report`] parses the same text back into the [`TestCase`] list it came from.

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

use crate::error::MarkerError;
use crate::test_case::TestCase;

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k, sort_keys(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Renders a result list as report text.
pub fn render_report(cases: &[TestCase]) -> Result<String, MarkerError> {
    let value = sort_keys(serde_json::to_value(cases)?);

    let mut buf = Vec::new();
    let mut ser = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut ser)?;

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Writes the report for `cases` to `path`, replacing any previous report.
pub fn write_report(path: &Path, cases: &[TestCase]) -> Result<(), MarkerError> {
    let text = render_report(cases)?;
    fs::write(path, text).map_err(|source| MarkerError::ReportIo {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads a report written by [`write_report`].
pub fn read_report(path: &Path) -> Result<Vec<TestCase>, MarkerError> {
    let text = fs::read_to_string(path).map_err(|source| MarkerError::ReportIo {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&text)?)
}
