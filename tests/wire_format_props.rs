//! Shape of the bulk body for arbitrary batches.

use logship::{BulkRequest, Document};
use proptest::prelude::*;
use serde_json::Value;

fn label() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_\"\\\\ -]{0,12}"
}

/// Payload text without interior newlines, optionally padded.
fn payload() -> impl Strategy<Value = String> {
    ("[ \t\n]{0,2}", "[^\n\r]{0,24}", "[ \t\n]{0,2}")
        .prop_map(|(lead, body, trail)| format!("{lead}{}{trail}", body.trim()))
}

proptest! {
    #[test]
    fn body_has_two_lines_per_document(
        index in label(),
        docs in prop::collection::vec((payload(), label()), 0..8),
    ) {
        let batch: BulkRequest = docs
            .iter()
            .map(|(source, kind)| Document::new(source.as_str(), kind.as_str()))
            .collect();
        let body = batch.to_body(&index);

        prop_assert!(body.is_empty() || body.ends_with('\n'));
        let lines: Vec<&str> = body.split_terminator('\n').collect();
        prop_assert_eq!(lines.len(), 2 * docs.len());

        for (k, (source, kind)) in docs.iter().enumerate() {
            let action: Value = serde_json::from_str(lines[2 * k]).expect("action is JSON");
            prop_assert_eq!(&action["index"]["_index"], &Value::from(index.as_str()));
            prop_assert_eq!(&action["index"]["_type"], &Value::from(kind.as_str()));
            prop_assert_eq!(lines[2 * k + 1], source.trim());
        }
    }
}
