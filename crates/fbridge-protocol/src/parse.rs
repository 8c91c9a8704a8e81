//! Result file grammar.
//!
//! One record per line, `#` comments and blank lines ignored:
//!
//! ```text
//! KEY = VALUE [; key1=val1 [; key2=val2 ...]]
//! ```
//!
//! Recognized attribute keys (case-insensitive) are `status`, `msg` and
//! `ts`; anything else is ignored so the interpreter can add attributes
//! without breaking older bridges. Parsing is best-effort per line: a
//! malformed line is skipped and never fails the batch.

use fbridge_core::cache::{Interner, Passthrough};
use fbridge_core::{RecordStatus, ResponseBatch, ResponseRecord};
use tracing::trace;

/// Trims spaces and tabs only. Other whitespace is significant.
fn trim_blank(s: &str) -> &str {
    s.trim_matches(&[' ', '\t'][..])
}

/// Parses a result document into a batch of records.
///
/// Later lines overwrite earlier lines with the same key.
pub fn parse_results(text: &str) -> ResponseBatch {
    parse_results_with(text, &mut Passthrough)
}

/// Same as [`parse_results`], drawing record keys from `interner`.
pub fn parse_results_with<I: Interner + ?Sized>(text: &str, interner: &mut I) -> ResponseBatch {
    let mut batch = ResponseBatch::new();
    for (line_no, line) in text.split('\n').enumerate() {
        if let Some(record) = parse_line(line, interner) {
            if let Some(previous) = batch.insert(record) {
                trace!(
                    line = line_no + 1,
                    key = %previous.key,
                    "Duplicate key, keeping later record"
                );
            }
        }
    }
    batch
}

/// Parses a single result line.
///
/// Returns `None` for blank lines, comments and lines without `=`.
pub fn parse_line<I: Interner + ?Sized>(line: &str, interner: &mut I) -> Option<ResponseRecord> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let Some((raw_key, rest)) = line.split_once('=') else {
        trace!(line, "Skipping line without '='");
        return None;
    };

    let (raw_value, attributes) = match rest.split_once(';') {
        Some((value, tail)) => (value, Some(tail)),
        None => (rest, None),
    };

    let mut record = ResponseRecord::new(
        interner.intern(trim_blank(raw_key)),
        trim_blank(raw_value),
    );

    for token in attributes.into_iter().flat_map(|tail| tail.split(';')) {
        let token = trim_blank(token);
        if token.is_empty() {
            continue;
        }
        let Some((attr_key, attr_val)) = token.split_once('=') else {
            continue;
        };
        let attr_val = trim_blank(attr_val);

        match trim_blank(attr_key).to_ascii_lowercase().as_str() {
            "status" => record.status = RecordStatus::from_token(attr_val),
            "msg" => record.message = Some(attr_val.to_string()),
            "ts" => match attr_val.parse::<i64>() {
                Ok(ts) => record.timestamp = ts,
                Err(_) => trace!(value = attr_val, "Ignoring unparseable ts attribute"),
            },
            _ => {}
        }
    }

    Some(record)
}
