//! Bulk request bodies.
//!
//! A [`BulkRequest`] owns an ordered batch of [`Document`] values and renders
//! them into the newline-delimited body accepted by bulk ingestion endpoints:
//! one action line naming the destination index and document type, followed
//! by the document source on its own line.
//!
//! Payloads are forwarded verbatim apart from trimming surrounding
//! whitespace. Malformed JSON is left for the endpoint to reject.

use serde::Serialize;
use serde_json::Value;

/// A single document queued for bulk ingestion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    source: String,
    type_label: String,
}

impl Document {
    /// Create a document from its serialised payload and type label.
    pub fn new(source: impl Into<String>, type_label: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            type_label: type_label.into(),
        }
    }

    /// Serialise `value` as the document payload.
    pub fn from_serialize<T: Serialize + ?Sized>(
        value: &T,
        type_label: impl Into<String>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::to_string(value)?, type_label))
    }

    /// Serialised payload text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Free-form classification attached to the action line.
    pub fn type_label(&self) -> &str {
        &self.type_label
    }
}

/// Ordered batch of documents sent in one request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BulkRequest {
    documents: Vec<Document>,
}

impl BulkRequest {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a batch from documents in iteration order.
    pub fn from_documents(documents: impl IntoIterator<Item = Document>) -> Self {
        Self {
            documents: documents.into_iter().collect(),
        }
    }

    /// Return the batch extended with `document`.
    pub fn with_document(mut self, document: Document) -> Self {
        self.documents.push(document);
        self
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Render the request body targeting `index`.
    pub fn to_body(&self, index: &str) -> String {
        serialise_bulk_body(&self.documents, index)
    }
}

impl FromIterator<Document> for BulkRequest {
    fn from_iter<I: IntoIterator<Item = Document>>(iter: I) -> Self {
        Self::from_documents(iter)
    }
}

/// Serialise `documents` into a bulk body addressed to `index`.
///
/// Each document contributes exactly two `\n`-terminated lines. An empty
/// slice produces an empty body.
///
/// # Examples
///
/// ```
/// use logship::bulk::{Document, serialise_bulk_body};
///
/// let body = serialise_bulk_body(&[Document::new("{\"a\":1}\n", "t1")], "tok123");
/// assert_eq!(
///     body,
///     "{\"index\":{\"_index\":\"tok123\",\"_type\":\"t1\"}}\n{\"a\":1}\n"
/// );
/// ```
pub fn serialise_bulk_body(documents: &[Document], index: &str) -> String {
    let index = json_string(index);
    let mut body = String::new();
    for document in documents {
        body.push_str(&action_line(&index, &json_string(&document.type_label)));
        body.push('\n');
        body.push_str(document.source.trim());
        body.push('\n');
    }
    body
}

/// Both arguments must already be JSON string literals.
fn action_line(index: &str, type_label: &str) -> String {
    format!(r#"{{"index":{{"_index":{index},"_type":{type_label}}}}}"#)
}

/// Quote and escape `raw` as a JSON string literal.
fn json_string(raw: &str) -> String {
    Value::from(raw).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn batch() -> BulkRequest {
        BulkRequest::new()
            .with_document(Document::new("  {\"a\":1}\n", "t1"))
            .with_document(Document::new("\n{\"b\":2}\t", "t2"))
    }

    #[rstest]
    fn renders_action_and_source_lines(batch: BulkRequest) {
        let body = batch.to_body("idx");
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(
            lines,
            vec![
                r#"{"index":{"_index":"idx","_type":"t1"}}"#,
                r#"{"a":1}"#,
                r#"{"index":{"_index":"idx","_type":"t2"}}"#,
                r#"{"b":2}"#,
            ]
        );
        assert!(body.ends_with("{\"b\":2}\n"));
        assert!(!body.ends_with("\n\n"));
    }

    #[rstest]
    fn empty_batch_renders_empty_body() {
        assert_eq!(BulkRequest::new().to_body("idx"), "");
    }

    #[rstest]
    fn malformed_payloads_pass_through() {
        let batch = BulkRequest::from_documents([Document::new("not json {", "raw")]);
        assert_eq!(
            batch.to_body("idx"),
            "{\"index\":{\"_index\":\"idx\",\"_type\":\"raw\"}}\nnot json {\n"
        );
    }

    #[rstest]
    fn escapes_quotes_in_index_and_type() {
        let body = serialise_bulk_body(&[Document::new("{}", "a\"b")], "i\\x");
        let action: Value =
            serde_json::from_str(body.lines().next().expect("action line")).expect("valid json");
        assert_eq!(action["index"]["_index"], "i\\x");
        assert_eq!(action["index"]["_type"], "a\"b");
    }

    #[rstest]
    fn serialises_structured_payloads() {
        #[derive(Serialize)]
        struct Event<'a> {
            level: &'a str,
            message: &'a str,
        }

        let document = Document::from_serialize(
            &Event {
                level: "warn",
                message: "disk \"full\"",
            },
            "event",
        )
        .expect("serialises");
        assert_eq!(
            document.source(),
            r#"{"level":"warn","message":"disk \"full\""}"#
        );
        assert_eq!(document.type_label(), "event");
    }

    #[rstest]
    fn collects_from_iterator_in_order() {
        let batch: BulkRequest = ["x", "y", "z"]
            .into_iter()
            .map(|label| Document::new("{}", label))
            .collect();
        let labels: Vec<&str> = batch.documents().iter().map(Document::type_label).collect();
        assert_eq!(labels, ["x", "y", "z"]);
        assert_eq!(batch.len(), 3);
        assert!(!batch.is_empty());
    }
}
