//! Integration tests for the tree parser's outcome and ownership protocol.

#![allow(clippy::unwrap_used)]

use std::io::Write;

use pretty_assertions::assert_eq;
use tempfile::NamedTempFile;

use xmlwrap::tree_parser::UNKNOWN_ERROR;
use xmlwrap::{Document, DocumentHandle, Error, NodeKind, ParseOptions, TreeParser};

fn temp_xml(content: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content).unwrap();
    file.flush().unwrap();
    file
}

fn element_names(doc: &Document) -> Vec<String> {
    let root = doc.root_element().unwrap();
    doc.children(root)
        .filter_map(|id| doc.node_name(id).map(String::from))
        .collect()
}

// ---------------------------------------------------------------------------
// File-based construction
// ---------------------------------------------------------------------------

#[test]
fn test_missing_file_reports_path() {
    let parser = TreeParser::from_file("missing.xml", false).unwrap();
    assert!(parser.failed());
    assert!(parser.error_message().contains("missing.xml"));
    assert!(parser.error_message().contains("failed to open"));
}

#[test]
fn test_missing_file_raises_when_allowed() {
    let err = TreeParser::from_file("missing.xml", true).unwrap_err();
    match err {
        Error::Parse(msg) => assert_eq!(msg, "failed to open file \"missing.xml\""),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[cfg(unix)]
#[test]
fn test_openable_but_unparsable_path_keeps_sentinel() {
    // A directory can be opened for reading but not read as a document.
    let dir = tempfile::tempdir().unwrap();
    let parser = TreeParser::from_file(dir.path(), false).unwrap();
    assert!(parser.failed());
    assert_eq!(parser.error_message(), UNKNOWN_ERROR);
}

#[test]
fn test_file_success() {
    let file = temp_xml(b"<?xml version=\"1.0\"?>\n<list><item/><item/></list>\n");
    let parser = TreeParser::parse_file(file.path()).unwrap();
    assert!(!parser.failed());
    assert!(!parser.had_warnings());
    let doc = parser.document().get().unwrap();
    assert_eq!(element_names(doc), vec!["item", "item"]);
    assert_eq!(doc.version.as_deref(), Some("1.0"));
}

#[test]
fn test_file_malformed() {
    let file = temp_xml(b"<a>\n<b></a>");
    let parser = TreeParser::from_file(file.path(), false).unwrap();
    assert!(parser.failed());
    assert_eq!(
        parser.error_message(),
        "Opening and ending tag mismatch: b line 2 and a"
    );
    assert!(parser.document().get().unwrap().is_empty());
}

#[test]
fn test_file_namespace_error_discards_tree() {
    let file = temp_xml(b"<p:a/>");
    let parser = TreeParser::from_file(file.path(), false).unwrap();
    assert!(parser.failed());
    assert_eq!(parser.error_message(), "Namespace prefix p on a is not defined");
    assert!(parser.document().get().unwrap().is_empty());
}

#[test]
fn test_empty_file_is_empty_document() {
    let file = temp_xml(b"");
    let parser = TreeParser::from_file(file.path(), false).unwrap();
    assert!(parser.failed());
    assert_eq!(parser.error_message(), "Document is empty");
}

#[test]
fn test_latin1_file_is_transcoded() {
    let file = temp_xml(b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><a>caf\xe9</a>");
    let parser = TreeParser::parse_file(file.path()).unwrap();
    let doc = parser.document().get().unwrap();
    assert_eq!(doc.text_content(doc.root_element().unwrap()), "caf\u{e9}");
    assert_eq!(doc.encoding.as_deref(), Some("ISO-8859-1"));
}

#[test]
fn test_invalid_utf8_is_reported() {
    let file = temp_xml(b"<a>\xff\xfe\xfd</a>");
    let parser = TreeParser::from_file(file.path(), false).unwrap();
    assert!(parser.failed());
    assert_eq!(
        parser.error_message(),
        "Input is not proper UTF-8, indicate encoding !"
    );
}

// ---------------------------------------------------------------------------
// Memory-based construction
// ---------------------------------------------------------------------------

#[test]
fn test_memory_nested_elements() {
    let input = b"<a><b/></a>";
    assert_eq!(input.len(), 11);
    let parser = TreeParser::from_memory(input, true).unwrap();
    assert!(!parser.failed());
    let doc = parser.document().get().unwrap();
    let a = doc.root_element().unwrap();
    assert_eq!(doc.node_name(a), Some("a"));
    assert_eq!(element_names(doc), vec!["b"]);
}

#[test]
fn test_memory_mismatched_tag() {
    let parser = TreeParser::from_memory(b"<a><b></a>", false).unwrap();
    assert!(parser.failed());
    assert!(!parser.error_message().is_empty());
    assert_ne!(parser.error_message(), UNKNOWN_ERROR);
}

#[test]
fn test_no_exceptions_never_raise_on_malformed_input() {
    let inputs: [&[u8]; 8] = [
        b"<a>",
        b"<a></b>",
        b"text only",
        b"<a/><b/>",
        b"<a x='1' x='2'/>",
        b"<a>&undefined;</a>",
        b"<p:a/>",
        b"   ",
    ];
    for input in inputs {
        let parser = TreeParser::from_memory(input, false).unwrap();
        assert!(parser.failed(), "{:?} should fail", String::from_utf8_lossy(input));
        assert_ne!(parser.error_message(), UNKNOWN_ERROR);
        assert!(parser.document().get().unwrap().is_empty());
    }
}

#[test]
fn test_malformed_inputs_are_rejected() {
    let cases: [(&[u8], &str); 6] = [
        (b"<1a/>", "StartTag: invalid element name"),
        (b"<a>]]></a>", "Sequence ']]>' not allowed in content"),
        (b"<a>\x01</a>", "PCDATA invalid Char value 1"),
        (b"<a b='1'c='2'/>", "attributes construct error"),
        (b"<!DOCTYPE a><!DOCTYPE a><a/>", "StartTag: invalid element name"),
        (b"<a>a < b</a>", "StartTag: invalid element name"),
    ];
    for (input, expected) in cases {
        let parser = TreeParser::from_memory(input, false).unwrap();
        assert!(parser.failed(), "{:?} should fail", String::from_utf8_lossy(input));
        assert_eq!(parser.error_message(), expected);
    }
}

#[test]
fn test_internal_subset_entities() {
    let parser = TreeParser::parse_memory(
        b"<!DOCTYPE a [<!ENTITY e \"x\"><!ENTITY both '&e;&e;'>]><a title='&both;'>&e;</a>",
    )
    .unwrap();
    let doc = parser.document().get().unwrap();
    let a = doc.root_element().unwrap();
    assert_eq!(doc.text_content(a), "x");
    assert_eq!(doc.attribute(a, "title"), Some("xx"));
}

#[test]
fn test_undeclared_entity_fails() {
    let parser = TreeParser::from_memory(b"<a>&e;</a>", false).unwrap();
    assert!(parser.failed());
    assert_eq!(parser.error_message(), "Entity 'e' not defined");
}

#[test]
fn test_empty_buffer_is_context_failure_even_without_exceptions() {
    let err = TreeParser::from_memory(b"", false).unwrap_err();
    assert!(matches!(err, Error::ContextCreation(_)));
}

#[test]
fn test_first_error_is_kept() {
    // The namespace error on <p:a> comes before the mismatch on </c>.
    let parser = TreeParser::from_memory(b"<p:a><b></c></p:a>", false).unwrap();
    assert!(parser.failed());
    assert_eq!(
        parser.error_message(),
        "Namespace prefix p on a is not defined"
    );
}

#[test]
fn test_namespace_error_tree_is_discarded() {
    let parser = TreeParser::from_memory(b"<root><x:child/></root>", false).unwrap();
    assert!(parser.failed());
    assert!(parser.document().get().unwrap().is_empty());
}

#[test]
fn test_namespaces_resolved() {
    let parser =
        TreeParser::parse_memory(b"<r xmlns='urn:default' xmlns:p='urn:p'><p:c/><d/></r>").unwrap();
    let doc = parser.document().get().unwrap();
    let r = doc.root_element().unwrap();
    assert_eq!(doc.node_namespace(r), Some("urn:default"));
    let kids: Vec<_> = doc.children(r).collect();
    assert_eq!(doc.node_namespace(kids[0]), Some("urn:p"));
    assert_eq!(doc.node_namespace(kids[1]), Some("urn:default"));
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

#[test]
fn test_warning_only_input() {
    let parser = TreeParser::from_memory(b"<?xml version='1.1'?><a/>", true).unwrap();
    assert!(!parser.failed());
    assert!(parser.had_warnings());
    assert!(!parser.document().get().unwrap().is_empty());
}

#[test]
fn test_relative_namespace_uri_warns() {
    let parser = TreeParser::from_memory(b"<a xmlns:x='relative'><x:b/></a>", true).unwrap();
    assert!(!parser.failed());
    assert!(parser.had_warnings());
}

#[test]
fn test_queries_are_idempotent() {
    let parser = TreeParser::from_memory(b"<?xml version='1.1'?><a><b></a>", false).unwrap();
    let first = (parser.failed(), parser.error_message().to_string(), parser.had_warnings());
    for _ in 0..3 {
        assert_eq!(
            (parser.failed(), parser.error_message().to_string(), parser.had_warnings()),
            first
        );
    }
    assert!(first.0);
    assert!(first.2);
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[test]
fn test_blank_text_kept_by_default() {
    let parser = TreeParser::parse_memory(b"<a>\n  <b/>\n</a>").unwrap();
    let doc = parser.document().get().unwrap();
    assert_eq!(doc.children(doc.root_element().unwrap()).count(), 3);
}

#[test]
fn test_noblanks_drops_blank_text() {
    let options = ParseOptions::default().keep_blanks(false);
    let parser = TreeParser::from_memory_with_options(b"<a>\n  <b/>\n</a>", &options, true).unwrap();
    let doc = parser.document().get().unwrap();
    assert_eq!(doc.children(doc.root_element().unwrap()).count(), 1);
}

#[test]
fn test_noblanks_respects_xml_space_preserve() {
    let options = ParseOptions::default().keep_blanks(false);
    let parser = TreeParser::from_memory_with_options(
        b"<a><pre xml:space='preserve'> </pre><b> </b></a>",
        &options,
        true,
    )
    .unwrap();
    let doc = parser.document().get().unwrap();
    let kids: Vec<_> = doc.children(doc.root_element().unwrap()).collect();
    assert_eq!(doc.text_content(kids[0]), " ");
    assert_eq!(doc.children(kids[1]).count(), 0);
}

#[test]
fn test_depth_limit_option() {
    let options = ParseOptions::default().max_depth(3);
    let parser =
        TreeParser::from_memory_with_options(b"<a><b><c><d/></c></b></a>", &options, false).unwrap();
    assert!(parser.failed());
    assert_eq!(parser.error_message(), "Excessive depth in document: 4");
}

// ---------------------------------------------------------------------------
// Ownership
// ---------------------------------------------------------------------------

#[test]
fn test_release_then_access_fails() {
    let mut parser = TreeParser::parse_memory(b"<a/>").unwrap();
    let doc = parser.document_mut().release().unwrap();
    assert!(matches!(doc.node(doc.root_element().unwrap()).kind, NodeKind::Element { .. }));
    assert!(matches!(parser.document().get(), Err(Error::DocumentReleased)));
    assert!(matches!(parser.document_mut().release(), Err(Error::DocumentReleased)));
}

#[test]
fn test_into_document_moves_handle() {
    let parser = TreeParser::parse_memory(b"<a><b/></a>").unwrap();
    let mut handle: DocumentHandle = parser.into_document();
    assert_eq!(element_names(handle.get().unwrap()), vec!["b"]);
    handle.release().unwrap();
    assert!(handle.is_released());
}

#[test]
fn test_independent_parses_on_threads() {
    fn assert_send<T: Send>() {}
    assert_send::<TreeParser>();
    assert_send::<DocumentHandle>();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            std::thread::spawn(move || {
                let input = if i % 2 == 0 { "<ok/>" } else { "<bad>" };
                let parser = TreeParser::from_memory(input.as_bytes(), false).unwrap();
                (i, parser.failed(), parser.error_message().to_string())
            })
        })
        .collect();
    for handle in handles {
        let (i, failed, message) = handle.join().unwrap();
        assert_eq!(failed, i % 2 == 1);
        if failed {
            assert_eq!(message, "Premature end of data in tag bad line 1");
        }
    }
}
