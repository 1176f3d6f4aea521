use std::fmt;

/// Response headers as they arrived on the wire.
///
/// Names keep their original case. Inserting a name that is already present
/// (exact match) replaces the value but keeps the original position, so
/// iteration order is the order of first appearance.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ResponseHeaders {
    entries: Vec<(String, String)>,
}

impl ResponseHeaders {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header; the last value for an exact name wins.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Value for an exact (case-sensitive) name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Value for a name compared ASCII case-insensitively.
    ///
    /// When several spellings are present the most recently inserted one wins.
    #[must_use]
    pub fn get_ignore_case(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn contains_ignore_case(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Remove every spelling of `name`. Returns whether anything was removed.
    pub fn remove_ignore_case(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.entries.len() != before
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(name, value)` pairs in order of first appearance.
    #[must_use]
    pub fn iter(&self) -> Iter<'_> {
        Iter(self.entries.iter())
    }
}

/// Iterator over [`ResponseHeaders`] entries.
#[derive(Debug, Clone)]
pub struct Iter<'a>(std::slice::Iter<'a, (String, String)>);

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl<'a> IntoIterator for &'a ResponseHeaders {
    type Item = (&'a str, &'a str);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Debug for ResponseHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for ResponseHeaders {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_last_value_wins_in_first_position() {
        let mut headers = ResponseHeaders::new();
        headers.insert("A", "1");
        headers.insert("B", "2");
        headers.insert("A", "3");

        let pairs: Vec<_> = headers.iter().collect();
        assert_eq!(pairs, vec![("A", "3"), ("B", "2")]);
    }

    #[test]
    fn test_names_keep_case() {
        let headers: ResponseHeaders = [("Content-Type", "a"), ("content-type", "b")]
            .into_iter()
            .collect();

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("Content-Type"), Some("a"));
        assert_eq!(headers.get("CONTENT-TYPE"), None);
        assert_eq!(headers.get_ignore_case("CONTENT-TYPE"), Some("b"));
    }

    #[test]
    fn test_remove_ignore_case_removes_all_spellings() {
        let mut headers: ResponseHeaders =
            [("Connection", "close"), ("connection", "x"), ("X", "y")]
                .into_iter()
                .collect();

        assert!(headers.remove_ignore_case("CONNECTION"));
        assert!(!headers.contains_ignore_case("connection"));
        assert_eq!(headers.len(), 1);
        assert!(!headers.remove_ignore_case("connection"));
    }

    #[test]
    #[allow(clippy::use_debug)]
    fn test_debug_is_map() {
        let headers: ResponseHeaders = [("A", "1")].into_iter().collect();
        assert_eq!(format!("{headers:?}"), r#"{"A": "1"}"#);
        assert!(ResponseHeaders::new().is_empty());
    }
}
