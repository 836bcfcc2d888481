//! Helpers over stored answer documents.
//!
//! An answer document maps questiongroup keywords to lists of records;
//! each record maps question keywords to values. Numbered groups carry a
//! synthetic `__order` field per record.

use serde_json::{Map, Value};

use crate::structure::ORDER_FIELD;

/// `{questiongroup_keyword → [record, …]}`.
pub type AnswerDocument = Map<String, Value>;

/// Records of a questiongroup, empty when the group is unanswered.
pub fn records<'a>(document: &'a AnswerDocument, questiongroup: &str) -> &'a [Value] {
    document
        .get(questiongroup)
        .and_then(Value::as_array)
        .map_or(&[], Vec::as_slice)
}

/// A question's value inside one record.
pub fn record_value<'a>(record: &'a Value, question: &str) -> Option<&'a Value> {
    let value = record.as_object()?.get(question)?;
    if is_empty_value(value) { None } else { Some(value) }
}

/// Empty answers (null, empty string, empty list or object) count as
/// missing data and render as "n.a.".
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        _ => false,
    }
}

/// Records sorted by their `__order` field. Records without the field
/// keep their relative position after the ordered ones.
pub fn sorted_records(records: &[Value]) -> Vec<Value> {
    let mut sorted: Vec<Value> = records.to_vec();
    sorted.sort_by_key(|record| {
        record
            .as_object()
            .and_then(|fields| fields.get(ORDER_FIELD))
            .and_then(Value::as_i64)
            .unwrap_or(i64::MAX)
    });
    sorted
}

/// Whether a group's record count honors its `min_num`/`max_num` bounds.
/// An absent group (zero records) is always acceptable; groups only
/// bound the count once data exists.
pub fn count_within(records: &[Value], min_num: usize, max_num: usize) -> bool {
    records.is_empty() || (records.len() >= min_num && records.len() <= max_num)
}

/// Canonical byte serialization of an answer document, used for change
/// detection. CBOR maps serialize with sorted keys, so two documents
/// with equal content hash identically.
pub fn canonical_bytes(document: &AnswerDocument) -> Result<Vec<u8>, serde_cbor::Error> {
    let canonical = serde_cbor::value::to_value(document)?;
    serde_cbor::to_vec(&canonical)
}
