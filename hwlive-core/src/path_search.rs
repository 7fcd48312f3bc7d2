//! PathSearch - Extract values from JSON responses with JMESPath expressions
//!
//! A thin layer over the `jmespath` crate that speaks `serde_json::Value`
//! and reports a null result as `None`.
//!
//! ```
//! use hwlive_core::path_search::path_search;
//! use serde_json::json;
//!
//! let body = json!({"channels": [{"id": "a"}, {"id": "b"}]});
//! assert_eq!(path_search("channels|[0].id", &body), Some(json!("a")));
//! assert_eq!(path_search("channels[?id=='c']|[0]", &body), None);
//! ```

use std::fmt;

use serde_json::Value;

/// Error compiling or evaluating a path expression
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PathError {
    #[error("invalid expression: {0}")]
    Compile(String),

    #[error("search failed: {0}")]
    Search(String),
}

/// A compiled path expression
pub struct Expression {
    inner: jmespath::Expression<'static>,
}

impl Expression {
    /// Evaluate against a document. Missing paths evaluate to `null`.
    pub fn search(&self, value: &Value) -> Result<Value, PathError> {
        let found = self
            .inner
            .search(value)
            .map_err(|e| PathError::Search(e.to_string()))?;
        serde_json::to_value(&*found).map_err(|e| PathError::Search(e.to_string()))
    }

    pub fn as_str(&self) -> &str {
        self.inner.as_str()
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Expression").field(&self.as_str()).finish()
    }
}

/// Compile an expression for repeated use
pub fn compile(expr: &str) -> Result<Expression, PathError> {
    jmespath::compile(expr)
        .map(|inner| Expression { inner })
        .map_err(|e| PathError::Compile(e.to_string()))
}

/// Search a document, returning `None` for null results
///
/// Invalid expressions are logged and treated as finding nothing.
pub fn path_search(expr: &str, value: &Value) -> Option<Value> {
    match compile(expr).and_then(|compiled| compiled.search(value)) {
        Ok(Value::Null) => None,
        Ok(found) => Some(found),
        Err(e) => {
            log::debug!("path expression '{}': {}", expr, e);
            None
        }
    }
}

/// Search a document, falling back to `default` when nothing is found
pub fn path_search_or(expr: &str, value: &Value, default: Value) -> Value {
    path_search(expr, value).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn channels() -> Value {
        json!({
            "total": 2,
            "channels": [
                {
                    "id": "ch-1",
                    "state": "ON",
                    "input": {
                        "sources": [
                            {"url": "rtmp://a/1", "bitrate": 800},
                            {"url": "rtmp://a/2", "bitrate": 1200}
                        ]
                    }
                },
                {"id": "ch-2", "state": "OFF", "input": {"sources": []}}
            ]
        })
    }

    #[test]
    fn first_element_through_pipe() {
        let doc = channels();
        assert_eq!(path_search("channels|[0].id", &doc), Some(json!("ch-1")));
        assert_eq!(path_search("channels[-1].id", &doc), Some(json!("ch-2")));
        assert_eq!(path_search("channels[5]", &doc), None);
    }

    #[test]
    fn missing_paths_are_none() {
        let doc = channels();
        assert_eq!(path_search("nothing.here", &doc), None);
        assert_eq!(path_search("total.inner", &doc), None);
        assert_eq!(path_search("channels|[0]", &json!({"channels": []})), None);
    }

    #[test]
    fn integers_stay_integers() {
        let doc = channels();
        let found = path_search("channels[0].input.sources[*].bitrate", &doc).unwrap();
        assert_eq!(found, json!([800, 1200]));
        assert!(found[0].is_i64() || found[0].is_u64());
    }

    #[test]
    fn filters_select_items() {
        let doc = channels();
        assert_eq!(
            path_search("channels[?state=='OFF'].id", &doc),
            Some(json!(["ch-2"]))
        );
    }

    #[test]
    fn or_returns_first_truthy() {
        let doc = json!({"error_code": "", "error": {"code": "LIVE.100"}});
        assert_eq!(
            path_search("error_code || error.code", &doc),
            Some(json!("LIVE.100"))
        );
    }

    #[test]
    fn defaults_and_invalid_expressions() {
        let doc = channels();
        assert_eq!(path_search_or("missing", &doc, json!("x")), json!("x"));
        assert_eq!(path_search("channels[", &doc), None);
        assert!(matches!(compile("channels["), Err(PathError::Compile(_))));
        assert_eq!(compile("channels|[0]").unwrap().as_str(), "channels|[0]");
    }
}
