use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NavigationError {
    #[error("failed to parse URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("cannot move history from {from} to a different origin ({to})")]
    CrossOrigin { from: String, to: String },
}

/// Decomposed view of the current entry's URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub href: String,
    pub path: String,
    /// Raw query without the leading `?`, empty when absent.
    pub query: String,
    /// Fragment without the leading `#`, empty when absent.
    pub fragment: String,
}

impl Location {
    pub fn from_url(url: &Url) -> Self {
        Self {
            href: url.to_string(),
            path: url.path().to_string(),
            query: url.query().unwrap_or_default().to_string(),
            fragment: url.fragment().unwrap_or_default().to_string(),
        }
    }

    /// Decoded `key=value` pairs; an undecodable query yields no pairs.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        match serde_urlencoded::from_str(&self.query) {
            Ok(pairs) => pairs,
            Err(err) => {
                tracing::debug!(target: "navigation", query = %self.query, "undecodable query: {err}");
                Vec::new()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct HistoryEntry {
    url: Url,
    title: String,
    state: JsonValue,
}

/// Session history for client-side routing.
#[derive(Debug, Clone)]
pub struct History {
    entries: Vec<HistoryEntry>,
    index: usize,
}

impl History {
    pub fn new(initial: &str) -> Result<Self, NavigationError> {
        let url = parse(initial)?;
        Ok(Self {
            entries: vec![HistoryEntry {
                url,
                title: String::new(),
                state: JsonValue::Null,
            }],
            index: 0,
        })
    }

    pub fn location(&self) -> Location {
        Location::from_url(self.current_url())
    }

    pub fn current_url(&self) -> &Url {
        &self.current().url
    }

    pub fn state(&self) -> &JsonValue {
        &self.current().state
    }

    pub fn title(&self) -> &str {
        &self.current().title
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Adds an entry after the current one, discarding any forward entries.
    /// `url` may be relative; `None` keeps the current URL.
    pub fn push_state(
        &mut self,
        state: JsonValue,
        title: &str,
        url: Option<&str>,
    ) -> Result<(), NavigationError> {
        let url = self.resolve(url)?;
        self.entries.truncate(self.index + 1);
        tracing::debug!(target: "navigation", url = %url, "push_state");
        self.entries.push(HistoryEntry {
            url,
            title: title.to_string(),
            state,
        });
        self.index = self.entries.len() - 1;
        Ok(())
    }

    pub fn replace_state(
        &mut self,
        state: JsonValue,
        title: &str,
        url: Option<&str>,
    ) -> Result<(), NavigationError> {
        let url = self.resolve(url)?;
        tracing::debug!(target: "navigation", url = %url, "replace_state");
        self.entries[self.index] = HistoryEntry {
            url,
            title: title.to_string(),
            state,
        };
        Ok(())
    }

    pub fn can_go_back(&self) -> bool {
        self.index > 0
    }

    pub fn can_go_forward(&self) -> bool {
        self.index + 1 < self.entries.len()
    }

    /// Returns the new location, or `None` at the start of history.
    pub fn back(&mut self) -> Option<Location> {
        if !self.can_go_back() {
            return None;
        }
        self.index -= 1;
        Some(self.location())
    }

    pub fn forward(&mut self) -> Option<Location> {
        if !self.can_go_forward() {
            return None;
        }
        self.index += 1;
        Some(self.location())
    }

    fn current(&self) -> &HistoryEntry {
        &self.entries[self.index]
    }

    fn resolve(&self, url: Option<&str>) -> Result<Url, NavigationError> {
        let current = self.current_url();
        let Some(raw) = url else {
            return Ok(current.clone());
        };
        let resolved = current
            .join(raw)
            .map_err(|source| NavigationError::InvalidUrl {
                url: raw.to_string(),
                source,
            })?;
        if resolved.origin() != current.origin() {
            return Err(NavigationError::CrossOrigin {
                from: current.origin().ascii_serialization(),
                to: resolved.origin().ascii_serialization(),
            });
        }
        Ok(resolved)
    }
}

fn parse(raw: &str) -> Result<Url, NavigationError> {
    Url::parse(raw.trim()).map_err(|source| NavigationError::InvalidUrl {
        url: raw.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn location_splits_url_parts() {
        let history = History::new("https://news.example/item?id=42&sort=top#comments").unwrap();
        let location = history.location();
        assert_eq!(location.path, "/item");
        assert_eq!(location.query, "id=42&sort=top");
        assert_eq!(location.fragment, "comments");
        assert_eq!(
            location.query_pairs(),
            vec![
                ("id".to_string(), "42".to_string()),
                ("sort".to_string(), "top".to_string())
            ]
        );
    }

    #[test]
    fn push_truncates_forward_entries() {
        let mut history = History::new("https://news.example/").unwrap();
        history
            .push_state(json!({"page": 1}), "one", Some("/page/1"))
            .unwrap();
        history
            .push_state(json!({"page": 2}), "two", Some("/page/2"))
            .unwrap();
        assert_eq!(history.len(), 3);

        let back = history.back().unwrap();
        assert_eq!(back.path, "/page/1");
        assert_eq!(history.state(), &json!({"page": 1}));

        history.push_state(json!(null), "other", Some("other")).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history.location().path, "/page/other");
        assert!(history.forward().is_none());
    }

    #[test]
    fn back_and_forward_stop_at_the_ends() {
        let mut history = History::new("https://news.example/").unwrap();
        assert!(history.back().is_none());
        history.push_state(json!(null), "", Some("/a")).unwrap();
        assert_eq!(history.back().unwrap().path, "/");
        assert_eq!(history.forward().unwrap().path, "/a");
        assert!(history.forward().is_none());
    }

    #[test]
    fn replace_state_keeps_length() {
        let mut history = History::new("https://news.example/").unwrap();
        history
            .replace_state(json!("s"), "home", Some("?tab=new"))
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history.location().query, "tab=new");
        assert_eq!(history.title(), "home");
    }

    #[test]
    fn rejects_cross_origin_pushes() {
        let mut history = History::new("https://news.example/").unwrap();
        let err = history
            .push_state(json!(null), "", Some("https://evil.example/"))
            .unwrap_err();
        assert!(matches!(err, NavigationError::CrossOrigin { .. }));
        assert_eq!(history.len(), 1);
    }
}
