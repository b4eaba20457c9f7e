use serde::Serialize;
use serde_json::{Map, Value};

use super::Attribute;

/// Attributes set locally since the last sync with the server.
///
/// Only names are queued. The values are read back out of the body when the
/// patch is built, so setting an attribute twice sends its latest value once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchQueue<A> {
    attrs: Vec<A>,
}

impl<A> Default for PatchQueue<A> {
    fn default() -> Self {
        Self { attrs: Vec::new() }
    }
}

impl<A: Attribute> PatchQueue<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `attr`, returning false if it was already queued.
    pub fn push(&mut self, attr: A) -> bool {
        if self.attrs.contains(&attr) {
            return false;
        }

        self.attrs.push(attr);
        true
    }

    pub fn contains(&self, attr: A) -> bool {
        self.attrs.contains(&attr)
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = A> + '_ {
        self.attrs.iter().copied()
    }

    pub fn clear(&mut self) {
        self.attrs.clear();
    }

    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    /// Builds the minimal patch for `body`: each queued field with its
    /// current value (`null` when unset), plus `etag`.
    pub fn build<B>(&self, body: &B, etag: Option<&str>) -> crate::Result<PatchBody>
    where
        B: Serialize,
    {
        let serialized = match serde_json::to_value(body)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        let mut fields = Map::with_capacity(self.attrs.len());
        for attr in self.iter() {
            let name = attr.field_name();
            let value = serialized.get(name).cloned().unwrap_or(Value::Null);
            fields.insert(name.to_owned(), value);
        }

        Ok(PatchBody {
            fields,
            etag: etag.map(Box::from),
        })
    }
}

/// A partial update: changed fields and the ETag they were based on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchBody {
    pub fields: Map<String, Value>,
    pub etag: Option<Box<str>>,
}

impl PatchBody {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.fields.keys().map(String::as_str)
    }

    /// The wire body. The ETag is sent in the body as well as the
    /// `If-Match` header.
    pub fn to_value(&self) -> Value {
        let mut body = self.fields.clone();
        if let Some(ref etag) = self.etag {
            body.insert("etag".to_owned(), Value::String(etag.to_string()));
        }

        Value::Object(body)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::resource::attributes;

    attributes! {
        pub enum TestAttr {
            Name => "friendlyName",
            Description => "description",
            Labels => "labels",
        }
    }

    #[derive(serde::Serialize)]
    #[serde(rename_all = "camelCase")]
    struct TestBody {
        friendly_name: Option<&'static str>,
        description: Option<&'static str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        labels: Option<Vec<&'static str>>,
    }

    #[test]
    fn test_queue_dedupes() {
        let mut queue = PatchQueue::new();
        assert!(queue.push(TestAttr::Name));
        assert!(queue.push(TestAttr::Description));
        assert!(!queue.push(TestAttr::Name));

        assert_eq!(queue.len(), 2);
        assert_eq!(
            queue.iter().collect::<Vec<_>>(),
            [TestAttr::Name, TestAttr::Description]
        );
    }

    #[test]
    fn test_build_reads_current_values() -> crate::Result<()> {
        let mut queue = PatchQueue::new();
        queue.push(TestAttr::Description);
        queue.push(TestAttr::Labels);

        let body = TestBody {
            friendly_name: Some("ignored"),
            description: Some("new"),
            labels: None,
        };

        let patch = queue.build(&body, Some("e1"))?;
        assert_eq!(
            patch.to_value(),
            json!({ "description": "new", "labels": null, "etag": "e1" })
        );

        // building is idempotent
        assert_eq!(queue.build(&body, Some("e1"))?, patch);
        Ok(())
    }
}
