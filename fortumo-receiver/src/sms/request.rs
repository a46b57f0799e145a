//! Inbound SMS notification fields.

use std::collections::HashMap;

use serde::ser::{Serialize, SerializeMap, Serializer};

/// Query parameter carrying the provider's service identifier.
pub const SERVICE_ID_KEY: &str = "service_id";

/// Query parameter carrying the provider's signature. Never part of the
/// canonical string.
pub const SIGNATURE_KEY: &str = "sig";

/// Fields of one inbound notification, in the order they appeared on the wire.
///
/// Keys are unique. A parameter repeated on the wire keeps the position of
/// its first occurrence and its values are joined with `,`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundRequest {
    fields: Vec<(String, String)>,
    positions: HashMap<String, usize>,
}

impl InboundRequest {
    /// Parse a raw (still percent-encoded) query string.
    pub fn from_query(query: &str) -> Self {
        url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.positions
            .get(key)
            .map(|&i| self.fields[i].1.as_str())
    }

    pub fn service_id(&self) -> Option<&str> {
        self.get(SERVICE_ID_KEY)
    }

    pub fn signature(&self) -> Option<&str> {
        self.get(SIGNATURE_KEY)
    }

    /// Fields in wire order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn insert(&mut self, key: String, value: String) {
        match self.positions.get(&key) {
            Some(&i) => {
                let existing = &mut self.fields[i].1;
                existing.push(',');
                existing.push_str(&value);
            }
            None => {
                self.positions.insert(key.clone(), self.fields.len());
                self.fields.push((key, value));
            }
        }
    }
}

impl<K, V> FromIterator<(K, V)> for InboundRequest
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut request = InboundRequest::default();
        for (k, v) in iter {
            request.insert(k.into(), v.into());
        }
        request
    }
}

impl Serialize for InboundRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_query_decodes_and_keeps_order() {
        let request =
            InboundRequest::from_query("message=hello%20world&sender=372555&service_id=abc&sig=ff");

        let keys: Vec<&str> = request.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["message", "sender", "service_id", "sig"]);
        assert_eq!(request.get("message"), Some("hello world"));
        assert_eq!(request.service_id(), Some("abc"));
        assert_eq!(request.signature(), Some("ff"));
    }

    #[test]
    fn test_many_distinct_keys() {
        let query = (0..10_000)
            .map(|i| format!("k{}={}", i, i))
            .collect::<Vec<_>>()
            .join("&");

        let request = InboundRequest::from_query(&format!("{}&k42=again", query));

        assert_eq!(request.len(), 10_000);
        assert_eq!(request.get("k0"), Some("0"));
        assert_eq!(request.get("k9999"), Some("9999"));
        assert_eq!(request.get("k42"), Some("42,again"));
        assert_eq!(request.iter().last(), Some(("k9999", "9999")));
    }

    #[test]
    fn test_plus_decodes_to_space() {
        let request = InboundRequest::from_query("message=pay+now");
        assert_eq!(request.get("message"), Some("pay now"));
    }

    #[test]
    fn test_repeated_keys_are_joined() {
        let request = InboundRequest::from_query("a=1&b=2&a=3");

        assert_eq!(request.len(), 2);
        assert_eq!(request.get("a"), Some("1,3"));
        let keys: Vec<&str> = request.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_empty_query() {
        let request = InboundRequest::from_query("");
        assert!(request.is_empty());
        assert_eq!(request.service_id(), None);
        assert_eq!(request.signature(), None);
    }

    #[test]
    fn test_serializes_as_json_object() {
        let request: InboundRequest = [("sender", "372555"), ("message", "hi")]
            .into_iter()
            .collect();

        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"sender":"372555","message":"hi"}"#);
    }
}
