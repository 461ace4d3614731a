//! Namespace scopes for the parser driver.

/// Namespace bound to the `xml` prefix in every document.
pub(crate) const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Stack of in-scope prefix bindings, one frame per open element.
///
/// A `None` prefix is the default namespace; binding it to `""` undeclares
/// it for the element's subtree.
#[derive(Debug)]
pub(crate) struct NamespaceScopes {
    frames: Vec<Vec<(Option<String>, String)>>,
}

impl NamespaceScopes {
    pub fn new() -> Self {
        Self {
            frames: vec![vec![(Some("xml".to_string()), XML_NAMESPACE.to_string())]],
        }
    }

    pub fn push(&mut self) {
        self.frames.push(Vec::new());
    }

    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn bind(&mut self, prefix: Option<&str>, uri: &str) {
        if let Some(frame) = self.frames.last_mut() {
            frame.push((prefix.map(String::from), uri.to_string()));
        }
    }

    /// Innermost binding for `prefix`. An undeclared default namespace
    /// resolves to `None`.
    pub fn resolve(&self, prefix: Option<&str>) -> Option<&str> {
        self.frames
            .iter()
            .rev()
            .flat_map(|frame| frame.iter().rev())
            .find(|(p, _)| p.as_deref() == prefix)
            .map(|(_, uri)| uri.as_str())
            .filter(|uri| !uri.is_empty())
    }
}

/// Splits `p:local` into its prefix and local part.
pub(crate) fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.split_once(':') {
        Some((prefix, local)) if !prefix.is_empty() && !local.is_empty() => (Some(prefix), local),
        _ => (None, qname),
    }
}

/// True if `uri` starts with an RFC 3986 scheme (`ALPHA *( ALPHA / DIGIT / "+" / "-" / "." ) ":"`).
pub(crate) fn is_absolute_uri(uri: &str) -> bool {
    let Some((scheme, _)) = uri.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inner_binding_shadows_outer() {
        let mut scopes = NamespaceScopes::new();
        scopes.push();
        scopes.bind(Some("a"), "urn:outer");
        scopes.push();
        scopes.bind(Some("a"), "urn:inner");
        assert_eq!(scopes.resolve(Some("a")), Some("urn:inner"));
        scopes.pop();
        assert_eq!(scopes.resolve(Some("a")), Some("urn:outer"));
        scopes.pop();
        assert_eq!(scopes.resolve(Some("a")), None);
    }

    #[test]
    fn test_xml_prefix_is_prebound() {
        let scopes = NamespaceScopes::new();
        assert_eq!(scopes.resolve(Some("xml")), Some(XML_NAMESPACE));
    }

    #[test]
    fn test_default_namespace_undeclared() {
        let mut scopes = NamespaceScopes::new();
        scopes.push();
        scopes.bind(None, "urn:d");
        scopes.push();
        scopes.bind(None, "");
        assert_eq!(scopes.resolve(None), None);
        scopes.pop();
        assert_eq!(scopes.resolve(None), Some("urn:d"));
    }

    #[test]
    fn test_split_qname() {
        assert_eq!(split_qname("x:a"), (Some("x"), "a"));
        assert_eq!(split_qname("a"), (None, "a"));
        assert_eq!(split_qname(":a"), (None, ":a"));
    }

    #[test]
    fn test_absolute_uri_check() {
        assert!(is_absolute_uri("http://example.com/ns"));
        assert!(is_absolute_uri("urn:x"));
        assert!(!is_absolute_uri("relative/path"));
        assert!(!is_absolute_uri("1abc:x"));
        assert!(!is_absolute_uri(""));
    }
}
