//! Work item identity, wire encoding, and typed payloads.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Field carrying the correlation identifier on the wire.
pub const ID_FIELD: &str = "id";
/// Field carrying the discriminator on the wire.
pub const TYPE_FIELD: &str = "type";

/// Opaque, unique work item identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItemId(pub String);

impl WorkItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for WorkItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A typed work item payload.
///
/// Each payload type owns one discriminator. The payload's own fields are
/// serialized next to `type`; it must include an `id` field and should give
/// every later-added field a serde default so older messages still decode.
pub trait WorkItemPayload: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Discriminator written to the `type` field.
    const TYPE: &'static str;

    fn id(&self) -> &WorkItemId;
}

/// A work item as read off the queue: identity, discriminator, and the full
/// structural record for the processor to decode.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub id: WorkItemId,
    pub work_item_type: String,
    pub body: Value,
}

impl WorkItem {
    /// Parse a raw message body.
    ///
    /// Fails with [`Error::MalformedWorkItem`] if the body is not a JSON
    /// object or lacks a non-empty string `id` or `type`.
    pub fn parse(raw: &str) -> Result<Self> {
        let body: Value = serde_json::from_str(raw)
            .map_err(|e| Error::MalformedWorkItem(format!("body is not valid JSON: {e}")))?;

        let object = body
            .as_object()
            .ok_or_else(|| Error::MalformedWorkItem("body is not a JSON object".to_string()))?;

        let id = required_str(object, ID_FIELD)?;
        let work_item_type = required_str(object, TYPE_FIELD)?;

        Ok(Self {
            id: WorkItemId(id),
            work_item_type,
            body,
        })
    }

    /// Decode the record into its typed payload.
    ///
    /// A record whose discriminator matched but whose fields don't fit the
    /// payload type can never succeed, so this fails as non-retriable.
    pub fn decode<T: WorkItemPayload>(&self) -> Result<T> {
        T::deserialize(&self.body).map_err(|e| {
            Error::NonRetriable(format!(
                "work item {} does not decode as {}: {e}",
                self.id,
                T::TYPE
            ))
        })
    }

    /// Encode a typed payload into its wire form, stamping the discriminator.
    pub fn encode<T: WorkItemPayload>(payload: &T) -> Result<String> {
        let mut value = serde_json::to_value(payload)?;
        let object = value.as_object_mut().ok_or_else(|| {
            Error::Other(format!(
                "work item payload {} must serialize to a JSON object",
                T::TYPE
            ))
        })?;
        object.insert(ID_FIELD.to_string(), Value::String(payload.id().0.clone()));
        object.insert(TYPE_FIELD.to_string(), Value::String(T::TYPE.to_string()));
        Ok(serde_json::to_string(&value)?)
    }
}

fn required_str(object: &serde_json::Map<String, Value>, field: &str) -> Result<String> {
    match object.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::String(_)) => Err(Error::MalformedWorkItem(format!(
            "field '{field}' is empty"
        ))),
        Some(other) => Err(Error::MalformedWorkItem(format!(
            "field '{field}' must be a string, got {other}"
        ))),
        None => Err(Error::MalformedWorkItem(format!(
            "missing required field '{field}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct BuildFlow {
        id: WorkItemId,
        build_id: i64,
        #[serde(default)]
        target_branch: Option<String>,
    }

    impl WorkItemPayload for BuildFlow {
        const TYPE: &'static str = "BuildFlow";

        fn id(&self) -> &WorkItemId {
            &self.id
        }
    }

    #[test]
    fn parse_reads_identity_and_keeps_body() {
        let item = WorkItem::parse(r#"{"id":"abc","type":"X","extra":1}"#).unwrap();
        assert_eq!(item.id.as_str(), "abc");
        assert_eq!(item.work_item_type, "X");
        assert_eq!(item.body["extra"], 1);
    }

    #[test]
    fn parse_rejects_bad_bodies() {
        for raw in [
            "not json at all",
            "[1, 2, 3]",
            r#"{"type":"X"}"#,
            r#"{"id":"abc"}"#,
            r#"{"id":42,"type":"X"}"#,
            r#"{"id":"abc","type":""}"#,
            r#"{"id":null,"type":"X"}"#,
        ] {
            let err = WorkItem::parse(raw).unwrap_err();
            assert!(
                matches!(err, Error::MalformedWorkItem(_)),
                "expected malformed for {raw}, got {err:?}"
            );
        }
    }

    #[test]
    fn encode_stamps_type_and_uses_camel_case() {
        let payload = BuildFlow {
            id: WorkItemId::from("w-1"),
            build_id: 7,
            target_branch: None,
        };
        let raw = WorkItem::encode(&payload).unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["type"], "BuildFlow");
        assert_eq!(value["id"], "w-1");
        assert_eq!(value["buildId"], 7);

        let decoded: BuildFlow = WorkItem::parse(&raw).unwrap().decode().unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn decode_tolerates_unknown_fields_from_newer_producers() {
        let item = WorkItem::parse(&json!({
            "id": "w-2",
            "type": "BuildFlow",
            "buildId": 9,
            "addedInNextRelease": {"nested": true}
        })
        .to_string())
        .unwrap();
        let decoded: BuildFlow = item.decode().unwrap();
        assert_eq!(decoded.build_id, 9);
        assert_eq!(decoded.target_branch, None);
    }

    #[test]
    fn decode_mismatch_is_non_retriable() {
        let item = WorkItem::parse(r#"{"id":"w-3","type":"BuildFlow"}"#).unwrap();
        let err = item.decode::<BuildFlow>().unwrap_err();
        assert!(!err.is_retriable());
    }
}
