//! JSON surface for error values
//!
//! Field names are normative: `name`, `message`, `context`, `cause`,
//! `stack`. Empty fields are omitted. A library cause serializes
//! recursively; a foreign cause collapses to its rendered message string.

use std::collections::HashMap;
use std::error::Error as StdError;

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ContextValue, Error};

impl Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        if !self.inner.name.is_empty() {
            map.serialize_entry("name", &self.inner.name)?;
        }
        if !self.inner.msg.is_empty() {
            map.serialize_entry("message", &self.inner.msg)?;
        }
        let context = self.context();
        if !context.is_empty() {
            map.serialize_entry("context", &context)?;
        }
        if let Some(cause) = &self.inner.cause {
            let cause_dyn: &(dyn StdError + 'static) = &**cause;
            match cause_dyn.downcast_ref::<Error>() {
                Some(lib) => map.serialize_entry("cause", lib)?,
                None => map.serialize_entry("cause", &cause.to_string())?,
            }
        }
        let stack = self.stack();
        if !stack.is_empty() {
            map.serialize_entry("stack", &stack)?;
        }
        map.end()
    }
}

#[derive(Deserialize)]
struct JsonRepr {
    #[serde(default)]
    name: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    context: Option<HashMap<String, ContextValue>>,
    #[serde(default)]
    cause: Option<JsonCause>,
    // Symbolized frames cannot be mapped back to program counters; the
    // field is accepted and discarded on the way in.
    #[serde(default)]
    #[allow(dead_code)]
    stack: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonCause {
    Nested(Box<JsonRepr>),
    Text(String),
}

impl JsonRepr {
    fn into_error(self) -> Error {
        let mut err = Error::new(self.message).with_name(self.name);
        if let Some(context) = self.context {
            for (key, value) in context {
                err = err.with(key, value);
            }
        }
        match self.cause {
            Some(JsonCause::Nested(repr)) => err.wrap(repr.into_error()),
            Some(JsonCause::Text(text)) => err.wrap(Error::new(text)),
            None => err,
        }
    }
}

impl<'de> Deserialize<'de> for Error {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        JsonRepr::deserialize(deserializer).map(JsonRepr::into_error)
    }
}

impl Error {
    /// Serialize to a JSON string. The encoder emits no trailing newline
    /// and performs no HTML escaping.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Rebuild an error from its JSON form. The stack field, being
    /// symbolized text, is not restored.
    pub fn from_json(json: &str) -> Result<Error, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use crate::config::test_support;

    #[test]
    fn test_empty_fields_omitted() {
        let err = Error::new("boom");
        let json = err.to_json().expect("serializes");
        assert_eq!(json, r#"{"message":"boom"}"#);
        assert!(!json.ends_with('\n'));
    }

    #[test]
    fn test_serializes_name_context_and_stack() {
        let _g = test_support::lock();
        config::reset_config();
        config::configure(|c| c.filter_internal = false);

        let err = Error::named("NetSplit").with("region", "eu-1");
        let json = err.to_json().expect("serializes");
        config::reset_config();

        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value["name"], "NetSplit");
        assert_eq!(value["context"]["region"], "eu-1");
        assert!(value["stack"].as_array().is_some_and(|s| !s.is_empty()));
    }

    #[test]
    fn test_library_cause_nests_foreign_cause_collapses() {
        let nested = Error::new("outer").wrap(Error::new("inner").with("k", 1i64));
        let value: serde_json::Value =
            serde_json::from_str(&nested.to_json().expect("serializes")).expect("valid");
        assert_eq!(value["cause"]["message"], "inner");
        assert_eq!(value["cause"]["context"]["k"], 1);

        let foreign = Error::new("outer")
            .wrap(std::io::Error::new(std::io::ErrorKind::Other, "io blew up"));
        let value: serde_json::Value =
            serde_json::from_str(&foreign.to_json().expect("serializes")).expect("valid");
        assert_eq!(value["cause"], "io blew up");
    }

    #[test]
    fn test_round_trip_preserves_identity_and_chain() {
        let original = Error::new("request failed")
            .with_name("ApiError")
            .with("attempt", 3u64)
            .with("host", "api.prod")
            .wrap(Error::new("tcp reset").wrap(Error::new("rst by peer")));

        let json = original.to_json().expect("serializes");
        let revived = Error::from_json(&json).expect("deserializes");

        assert_eq!(revived.name(), original.name());
        assert_eq!(revived.message(), original.message());
        assert_eq!(revived.context(), original.context());
        assert_eq!(revived.unwrap_all().len(), original.unwrap_all().len());
    }

    #[test]
    fn test_string_cause_round_trip() {
        let json = r#"{"message":"outer","cause":"plain inner"}"#;
        let err = Error::from_json(json).expect("deserializes");
        let all = err.unwrap_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].to_string(), "plain inner");
    }
}
