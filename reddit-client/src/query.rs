use url::form_urlencoded;

/// Ordered query parameters. Insertion order is kept so URLs are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.pairs.push((key.into(), value.into()));
        self
    }

    /// Parameters for a relevance-sorted search restricted to one community.
    pub fn community_search(query: &str) -> Self {
        Self::new()
            .with("q", query)
            .with("sort", "relevance")
            .with("t", "year")
            .with("restrict_sr", "1")
            .with("limit", "100")
    }

    /// Parameters for a site-wide search.
    pub fn global_search(query: &str) -> Self {
        Self::new()
            .with("q", query)
            .with("sort", "relevance")
            .with("t", "year")
            .with("limit", "100")
    }

    /// Copy with the pagination cursor appended last.
    pub fn with_cursor(&self, cursor: Option<&str>) -> Self {
        match cursor {
            Some(after) => self.clone().with("after", after),
            None => self.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// `?`-prefixed form-urlencoded string, or `""` when there are no pairs.
    pub fn to_query_string(&self) -> String {
        if self.pairs.is_empty() {
            return String::new();
        }
        let encoded = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs.iter())
            .finish();
        format!("?{}", encoded)
    }
}
