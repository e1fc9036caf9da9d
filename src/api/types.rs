use log::debug;
use serde::Deserialize;
use serde_json::Value;

// ============================================================================
// Search Parameters
// ============================================================================

/// Search parameters the tool knows about. Anything else is still sent
/// to the server as-is.
pub const RECOGNIZED_PARAMS: &[&str] = &[
    "_id",
    "_lastUpdated",
    "identifier",
    "name",
    "family",
    "given",
    "gender",
    "birthdate",
    "address",
    "address-city",
    "address-state",
    "address-postalcode",
    "phone",
    "email",
    "telecom",
    "active",
    "subject",
    "patient",
];

pub fn is_recognized_param(key: &str) -> bool {
    RECOGNIZED_PARAMS.contains(&key)
}

/// Ordered search parameters for a FHIR search request.
///
/// Keys are unique: setting an existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchQuery {
    params: Vec<(String, String)>,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style `set`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if !is_recognized_param(&key) && !key.starts_with('_') {
            debug!("passing through unrecognized search parameter '{}'", key);
        }
        match self.params.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.params.push((key, value)),
        }
    }

    /// Insert only when the key is not already present.
    pub fn set_default(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if !self.contains(&key) {
            self.set(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.params
    }

    /// Parse a `key=value` pair as given on the command line.
    pub fn parse_pair(s: &str) -> Result<(String, String), String> {
        match s.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.to_string()))
            }
            _ => Err(format!("invalid search parameter '{}': expected key=value", s)),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SearchQuery {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut query = SearchQuery::new();
        for (k, v) in iter {
            query.set(k, v);
        }
        query
    }
}

// ============================================================================
// Bundle Response
// ============================================================================

/// The parts of a FHIR searchset Bundle this tool reads.
#[derive(Debug, Deserialize, Default)]
pub struct Bundle {
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub link: Vec<BundleLink>,
    #[serde(default)]
    pub entry: Vec<BundleEntry>,
}

#[derive(Debug, Deserialize)]
pub struct BundleLink {
    #[serde(default)]
    pub relation: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BundleEntry {
    #[serde(default)]
    pub resource: Option<Value>,
}

impl Bundle {
    /// URL of the "next" page, if the server sent one.
    pub fn next_link(&self) -> Option<&str> {
        self.link
            .iter()
            .find(|l| l.relation.as_deref() == Some("next"))
            .and_then(|l| l.url.as_deref())
            .filter(|url| !url.is_empty())
    }

    /// Convert into a page, keeping only resources of `resource_type`.
    pub fn into_page(self, resource_type: &str) -> Page {
        let next = self.next_link().map(str::to_string);
        let entries = self
            .entry
            .into_iter()
            .filter_map(|e| e.resource)
            .filter(|r| r.get("resourceType").and_then(Value::as_str) == Some(resource_type))
            .collect();

        Page {
            entries,
            next,
            total: self.total,
        }
    }
}

// ============================================================================
// Pages and Result Sets
// ============================================================================

/// One page of search results.
#[derive(Debug, Default)]
pub struct Page {
    pub entries: Vec<Value>,
    pub next: Option<String>,
    pub total: Option<u64>,
}

/// Entries accumulated across pages, in the order the server returned them.
#[derive(Debug, Default)]
pub struct ResultSet {
    pub entries: Vec<Value>,
    pub pages_fetched: u32,
    /// Total reported by the first page, if any.
    pub total: Option<u64>,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn push_page(&mut self, page: Page) {
        if self.pages_fetched == 0 {
            self.total = page.total;
        }
        self.entries.extend(page.entries);
        self.pages_fetched += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_replaces_in_place() {
        let mut query = SearchQuery::new()
            .with("name", "smith")
            .with("gender", "female");
        query.set("name", "jones");

        assert_eq!(
            query.pairs(),
            &[
                ("name".to_string(), "jones".to_string()),
                ("gender".to_string(), "female".to_string())
            ]
        );
    }

    #[test]
    fn test_set_default_keeps_caller_value() {
        let mut query = SearchQuery::new().with("active", "false");
        query.set_default("active", "true");
        assert_eq!(query.get("active"), Some("false"));

        let mut query = SearchQuery::new();
        query.set_default("active", "true");
        assert_eq!(query.get("active"), Some("true"));
    }

    #[test]
    fn test_unknown_keys_pass_through() {
        let query: SearchQuery = [("x-custom-filter", "abc")].into_iter().collect();
        assert!(!is_recognized_param("x-custom-filter"));
        assert_eq!(query.get("x-custom-filter"), Some("abc"));
    }

    #[test]
    fn test_parse_pair() {
        assert_eq!(
            SearchQuery::parse_pair("address-city=Baton Rouge"),
            Ok(("address-city".to_string(), "Baton Rouge".to_string()))
        );
        assert_eq!(
            SearchQuery::parse_pair("birthdate=ge1950-01-01"),
            Ok(("birthdate".to_string(), "ge1950-01-01".to_string()))
        );
        // Value may itself contain '='
        assert_eq!(
            SearchQuery::parse_pair("identifier=sys|a=b"),
            Ok(("identifier".to_string(), "sys|a=b".to_string()))
        );
        assert!(SearchQuery::parse_pair("novalue").is_err());
        assert!(SearchQuery::parse_pair("=value").is_err());
    }

    #[test]
    fn test_bundle_next_link() {
        let bundle: Bundle = serde_json::from_value(json!({
            "resourceType": "Bundle",
            "link": [
                {"relation": "self", "url": "https://x/Patient?page=1"},
                {"relation": "next", "url": "https://x/Patient?page=2"}
            ]
        }))
        .unwrap();
        assert_eq!(bundle.next_link(), Some("https://x/Patient?page=2"));

        let bundle: Bundle = serde_json::from_value(json!({"resourceType": "Bundle"})).unwrap();
        assert_eq!(bundle.next_link(), None);
    }

    #[test]
    fn test_into_page_filters_other_resource_types() {
        let bundle: Bundle = serde_json::from_value(json!({
            "resourceType": "Bundle",
            "total": 2,
            "entry": [
                {"resource": {"resourceType": "Patient", "id": "a"}},
                {"resource": {"resourceType": "OperationOutcome"}},
                {"fullUrl": "urn:uuid:1"},
                {"resource": {"resourceType": "Patient", "id": "b"}}
            ]
        }))
        .unwrap();

        let page = bundle.into_page("Patient");
        let ids: Vec<&str> = page
            .entries
            .iter()
            .map(|r| r["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(page.total, Some(2));
        assert!(page.next.is_none());
    }

    #[test]
    fn test_result_set_keeps_first_total() {
        let mut results = ResultSet::default();
        results.push_page(Page {
            entries: vec![json!({"id": "1"})],
            next: Some("n".to_string()),
            total: Some(10),
        });
        results.push_page(Page {
            entries: vec![json!({"id": "2"})],
            next: None,
            total: None,
        });

        assert_eq!(results.len(), 2);
        assert_eq!(results.pages_fetched, 2);
        assert_eq!(results.total, Some(10));
    }
}
