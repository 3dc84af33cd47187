//! Response classification and envelope normalization
//!
//! This module decides what a completed response means (success, business
//! error, unauthorized) and rewrites server envelopes, whatever their field
//! names, into the canonical `{code, data, msg}` [`Envelope`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::http::transport::{Blob, ResponseBody, TransportResponse};
use crate::Result;

/// Wire names of the three envelope fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResAlias {
    pub code: String,
    pub data: String,
    pub msg: String,
}

impl Default for ResAlias {
    fn default() -> Self {
        Self {
            code: "code".to_string(),
            data: "data".to_string(),
            msg: "msg".to_string(),
        }
    }
}

/// Canonical response envelope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub code: Value,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub msg: Value,
    /// Fields other than the three aliased ones, untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    /// Binary payload of a successful blob response
    #[serde(skip)]
    pub blob: Option<Blob>,
}

impl Envelope {
    pub fn new(code: i64, data: Value, msg: impl Into<String>) -> Self {
        Self {
            code: Value::from(code),
            data,
            msg: Value::String(msg.into()),
            ..Default::default()
        }
    }

    /// The status code, when it is an integer
    pub fn code(&self) -> Option<i64> {
        self.code.as_i64()
    }

    /// The message as text
    pub fn message(&self) -> String {
        crate::format::display_value(&self.msg)
    }

    /// Deserialize the payload into a caller type
    pub fn into_data<T: DeserializeOwned>(self) -> Result<T> {
        Ok(serde_json::from_value(self.data)?)
    }
}

/// Kind of payload a response carries, detected once per response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Json,
    Blob,
}

impl PayloadKind {
    pub fn of(body: &ResponseBody) -> Self {
        match body {
            ResponseBody::Json(_) => PayloadKind::Json,
            ResponseBody::Blob(_) => PayloadKind::Blob,
        }
    }
}

/// Terminal state of one response
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    Unauthorized(Envelope),
    BlobOk(Envelope),
    BlobError(Envelope),
    JsonOk(Envelope),
    OtherError(Envelope),
}

impl Disposition {
    pub fn is_success(&self) -> bool {
        matches!(self, Disposition::BlobOk(_) | Disposition::JsonOk(_))
    }

    pub fn envelope(&self) -> &Envelope {
        match self {
            Disposition::Unauthorized(e)
            | Disposition::BlobOk(e)
            | Disposition::BlobError(e)
            | Disposition::JsonOk(e)
            | Disposition::OtherError(e) => e,
        }
    }

    pub fn into_envelope(self) -> Envelope {
        match self {
            Disposition::Unauthorized(e)
            | Disposition::BlobOk(e)
            | Disposition::BlobError(e)
            | Disposition::JsonOk(e)
            | Disposition::OtherError(e) => e,
        }
    }
}

/// Rewrite the aliased fields of `raw` to canonical names, keeping the rest
pub fn normalize_envelope(raw: Value, alias: &ResAlias) -> Envelope {
    match raw {
        Value::Object(mut fields) => {
            let code = fields.remove(&alias.code).unwrap_or(Value::Null);
            let data = fields.remove(&alias.data).unwrap_or(Value::Null);
            let msg = fields.remove(&alias.msg).unwrap_or(Value::Null);
            Envelope {
                code,
                data,
                msg,
                extra: fields,
                blob: None,
            }
        }
        other => Envelope {
            data: other,
            ..Default::default()
        },
    }
}

fn code_in(code: &Value, set: &[i64]) -> bool {
    code.as_i64().is_some_and(|c| set.contains(&c))
}

/// Classifies responses under one alias and code configuration
#[derive(Debug, Clone)]
pub struct ResponseClassifier {
    alias: ResAlias,
    success_codes: Vec<i64>,
    unauthorized_codes: Vec<i64>,
}

impl ResponseClassifier {
    pub fn new(alias: ResAlias, success_codes: Vec<i64>, unauthorized_codes: Vec<i64>) -> Self {
        Self {
            alias,
            success_codes,
            unauthorized_codes,
        }
    }

    pub fn alias(&self) -> &ResAlias {
        &self.alias
    }

    /// Decide the terminal state of a response
    ///
    /// Fails only when a blob declared as JSON does not parse.
    pub fn classify(&self, response: TransportResponse) -> Result<Disposition> {
        let kind = PayloadKind::of(&response.body);
        let envelope = match response.body {
            ResponseBody::Json(raw) => normalize_envelope(raw, &self.alias),
            ResponseBody::Blob(blob) if blob.is_json() => {
                let embedded: Value = serde_json::from_slice(&blob.bytes)?;
                normalize_envelope(embedded, &self.alias)
            }
            ResponseBody::Blob(blob) => {
                let code = self.success_codes.first().copied().unwrap_or(200);
                return Ok(Disposition::BlobOk(Envelope {
                    blob: Some(blob),
                    ..Envelope::new(code, Value::Null, "")
                }));
            }
        };

        let succeeded = code_in(&envelope.code, &self.success_codes);
        Ok(match kind {
            PayloadKind::Json if code_in(&envelope.code, &self.unauthorized_codes) => {
                Disposition::Unauthorized(envelope)
            }
            PayloadKind::Json if succeeded => Disposition::JsonOk(envelope),
            PayloadKind::Json => Disposition::OtherError(envelope),
            PayloadKind::Blob if succeeded => Disposition::BlobOk(envelope),
            PayloadKind::Blob => Disposition::BlobError(envelope),
        })
    }
}

impl Default for ResponseClassifier {
    fn default() -> Self {
        Self::new(ResAlias::default(), vec![200], vec![401])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_success_unauthorized_and_error_codes() {
        let classifier = ResponseClassifier::default();

        let ok = TransportResponse::json(json!({"code": 200, "data": 1, "msg": "ok"}));
        let ok = classifier.classify(ok).unwrap();
        assert!(matches!(ok, Disposition::JsonOk(_)));

        let unauthorized = TransportResponse::json(json!({"code": 401, "msg": "expired"}));
        let unauthorized = classifier.classify(unauthorized).unwrap();
        assert!(matches!(unauthorized, Disposition::Unauthorized(_)));

        let failed = TransportResponse::json(json!({"code": 500, "msg": "boom"}));
        let failed = classifier.classify(failed).unwrap();
        assert!(matches!(failed, Disposition::OtherError(_)));
        assert_eq!(failed.envelope().message(), "boom");
    }

    #[test]
    fn test_payload_kind_follows_body_not_content() {
        let blob = Blob::new(Some("application/json"), br#"{"code":401}"#.to_vec());
        let json_blob = TransportResponse::blob(blob);
        assert_eq!(PayloadKind::of(&json_blob.body), PayloadKind::Blob);
        assert_eq!(PayloadKind::of(&TransportResponse::json(json!({})).body), PayloadKind::Json);

        // An unauthorized code inside a blob is a blob failure, not a session event
        let disposition = ResponseClassifier::default().classify(json_blob).unwrap();
        assert!(matches!(disposition, Disposition::BlobError(_)));
    }

    #[test]
    fn test_alias_mapping_keeps_other_fields() {
        let alias = ResAlias {
            code: "status".into(),
            data: "result".into(),
            msg: "message".into(),
        };
        let classifier = ResponseClassifier::new(alias, vec![0], vec![401]);
        let raw = json!({"status": 0, "result": [1], "message": "", "traceId": "t-1"});
        let disposition = classifier.classify(TransportResponse::json(raw)).unwrap();

        let envelope = disposition.into_envelope();
        assert_eq!(envelope.code(), Some(0));
        assert_eq!(envelope.data, json!([1]));
        assert_eq!(envelope.extra.get("traceId"), Some(&json!("t-1")));
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({"code": 0, "data": [1], "msg": "", "traceId": "t-1"})
        );
    }

    #[test]
    fn test_custom_unauthorized_codes() {
        let classifier = ResponseClassifier::new(ResAlias::default(), vec![200], vec![401, 403]);
        let d = classifier.classify(TransportResponse::json(json!({"code": 403}))).unwrap();
        assert!(matches!(d, Disposition::Unauthorized(_)));
    }

    #[test]
    fn test_json_blob_uses_embedded_code() {
        let classifier = ResponseClassifier::default();
        let ok = br#"{"code":200,"data":"x","msg":""}"#.to_vec();
        let ok = Blob::new(Some("application/json"), ok);
        let d = classifier.classify(TransportResponse::blob(ok)).unwrap();
        assert!(matches!(d, Disposition::BlobOk(_)));

        let failed =
            Blob::new(Some("application/json"), br#"{"code":500,"msg":"no file"}"#.to_vec());
        let d = classifier.classify(TransportResponse::blob(failed)).unwrap();
        assert!(matches!(d, Disposition::BlobError(_)));
        assert_eq!(d.envelope().message(), "no file");
    }

    #[test]
    fn test_binary_blob_is_always_ok() {
        let classifier = ResponseClassifier::default();
        let blob = Blob::new(Some("application/pdf"), b"%PDF-1.7".to_vec());
        let d = classifier.classify(TransportResponse::blob(blob.clone())).unwrap();
        assert!(d.is_success());
        assert_eq!(d.into_envelope().blob, Some(blob));
    }

    #[test]
    fn test_malformed_json_blob_fails() {
        let classifier = ResponseClassifier::default();
        let blob = Blob::new(Some("application/json"), b"{oops".to_vec());
        assert!(classifier.classify(TransportResponse::blob(blob)).is_err());
    }

    #[test]
    fn test_non_object_payload_is_an_error() {
        let classifier = ResponseClassifier::default();
        let d = classifier.classify(TransportResponse::json(json!([1, 2]))).unwrap();
        assert!(matches!(d, Disposition::OtherError(_)));
        assert_eq!(d.envelope().data, json!([1, 2]));
    }
}
