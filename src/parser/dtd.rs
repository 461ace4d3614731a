//! Document type declaration scanning.
//!
//! Only general entity declarations from the internal subset are kept so
//! that references to them can be expanded in content and attribute
//! values. Element, attribute-list and notation declarations are skipped
//! and nothing is validated. External subsets and external entities are
//! never loaded.

use std::borrow::Cow;
use std::collections::HashMap;

use quick_xml::escape::{resolve_predefined_entity, unescape_with, EscapeError};

use super::chars::{is_name_char, is_name_start_char};

/// Upper bound on the expanded length of a single entity.
pub(crate) const MAX_ENTITY_LENGTH: usize = 10 * 1024 * 1024;

#[derive(Debug)]
enum Entity {
    /// Fully expanded replacement text.
    Text(String),
    /// Declared with `SYSTEM` or `PUBLIC`; expands to nothing.
    External,
    /// Declared, but expanding it fails with this message.
    Invalid(String),
}

/// General entities declared in a document's internal subset.
#[derive(Debug, Default)]
pub(crate) struct Entities {
    decls: HashMap<String, Entity>,
}

impl Entities {
    /// Scans the content of a `<!DOCTYPE ...>` event (everything after the
    /// keyword) and collects its entity declarations.
    pub(crate) fn from_doctype(content: &str) -> Result<Self, String> {
        let raw = SubsetScanner::new(content).scan()?;
        Ok(Self::expand(raw))
    }

    /// Expands character and entity references in `raw`.
    ///
    /// Inside attribute values, references to external entities and to
    /// replacement text containing `<` are errors.
    pub(crate) fn unescape<'r>(&self, raw: &'r str, in_attribute: bool) -> Result<Cow<'r, str>, String> {
        let decls = &self.decls;
        let mut problem: Option<String> = None;
        let result = unescape_with(raw, |name| {
            if let Some(predefined) = resolve_predefined_entity(name) {
                return Some(predefined);
            }
            let found = match decls.get(name)? {
                Entity::Text(value) => {
                    if in_attribute && value.contains('<') {
                        problem.get_or_insert_with(|| {
                            format!("'<' in entity '{name}' is not allowed in attributes values")
                        });
                    }
                    value.as_str()
                }
                Entity::External => {
                    if in_attribute {
                        problem.get_or_insert_with(|| {
                            format!("Attribute references external entity '{name}'")
                        });
                    }
                    ""
                }
                Entity::Invalid(message) => {
                    problem.get_or_insert_with(|| message.clone());
                    ""
                }
            };
            Some(found)
        });
        let value = result.map_err(|err| escape_message(raw, &err))?;
        match problem {
            Some(message) => Err(message),
            None => Ok(value),
        }
    }

    /// Resolves nested references between declarations. Entities are
    /// expanded in passes; a pass that makes no progress means the rest
    /// refer to each other.
    fn expand(raw: Vec<(String, RawEntity)>) -> Self {
        let mut decls: HashMap<String, Entity> = HashMap::new();
        let mut pending: Vec<(String, String)> = Vec::new();
        for (name, entity) in raw {
            if decls.contains_key(&name) || pending.iter().any(|(n, _)| *n == name) {
                // The first declaration is binding.
                continue;
            }
            match entity {
                RawEntity::Internal(value) => pending.push((name, value)),
                RawEntity::External => {
                    decls.insert(name, Entity::External);
                }
            }
        }

        while !pending.is_empty() {
            let waiting_on: Vec<String> = pending.iter().map(|(n, _)| n.clone()).collect();
            let mut next = Vec::new();
            let mut progressed = false;
            for (name, value) in pending {
                let mut blocked = false;
                let result = unescape_with(&value, |r| {
                    if let Some(predefined) = resolve_predefined_entity(r) {
                        return Some(predefined);
                    }
                    match decls.get(r) {
                        Some(Entity::Text(text)) => Some(text.as_str()),
                        Some(Entity::External | Entity::Invalid(_)) => Some(""),
                        None => {
                            blocked |= waiting_on.iter().any(|n| n == r);
                            None
                        }
                    }
                })
                .map(Cow::into_owned);
                let entity = match result {
                    Err(_) if blocked => {
                        next.push((name, value));
                        continue;
                    }
                    Err(err) => Entity::Invalid(escape_message(&value, &err)),
                    Ok(text) if text.len() > MAX_ENTITY_LENGTH => {
                        Entity::Invalid("Maximum entity amplification factor exceeded".to_string())
                    }
                    Ok(text) => Entity::Text(text),
                };
                decls.insert(name, entity);
                progressed = true;
            }
            if !progressed {
                for (name, _) in next {
                    decls.insert(
                        name,
                        Entity::Invalid("Detected an entity reference loop".to_string()),
                    );
                }
                break;
            }
            pending = next;
        }
        Self { decls }
    }
}

/// Maps a reference expansion failure to libxml2's wording.
pub(crate) fn escape_message(raw: &str, err: &EscapeError) -> String {
    match err {
        EscapeError::UnrecognizedEntity(_, name) => {
            if name.chars().next().is_some_and(is_name_start_char) && name.chars().all(is_name_char) {
                format!("Entity '{name}' not defined")
            } else {
                "xmlParseEntityRef: no name".to_string()
            }
        }
        EscapeError::UnterminatedEntity(range) => {
            let after = raw.get(range.start..).unwrap_or("");
            let after = after.strip_prefix('&').unwrap_or(after);
            if after.starts_with('#') || after.chars().next().is_some_and(is_name_start_char) {
                "EntityRef: expecting ';'".to_string()
            } else {
                "xmlParseEntityRef: no name".to_string()
            }
        }
        EscapeError::InvalidCharRef(_) => "xmlParseCharRef: invalid xmlChar value".to_string(),
    }
}

#[derive(Debug)]
enum RawEntity {
    Internal(String),
    External,
}

/// Cursor over a DOCTYPE declaration's content.
struct SubsetScanner<'a> {
    input: &'a str,
    pos: usize,
    entities: Vec<(String, RawEntity)>,
}

impl<'a> SubsetScanner<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            entities: Vec::new(),
        }
    }

    fn scan(mut self) -> Result<Vec<(String, RawEntity)>, String> {
        self.parse_name()
            .map_err(|_| "xmlParseDocTypeDecl : no DOCTYPE name !".to_string())?;
        self.skip_whitespace();

        if self.looking_at("SYSTEM") || self.looking_at("PUBLIC") {
            self.external_id()?;
            self.skip_whitespace();
        }

        if self.peek() == Some('[') {
            self.pos += 1;
            self.internal_subset()?;
            self.skip_whitespace();
        }

        if !self.at_end() {
            return Err("DOCTYPE improperly terminated".to_string());
        }
        Ok(self.entities)
    }

    fn internal_subset(&mut self) -> Result<(), String> {
        loop {
            self.skip_whitespace();
            if self.at_end() {
                return Err("xmlParseInternalSubset: error detected in Markup declaration".to_string());
            }
            if self.peek() == Some(']') {
                self.pos += 1;
                return Ok(());
            }

            if self.looking_at("<!--") {
                self.skip_past("-->")?;
            } else if self.looking_at("<?") {
                self.skip_past("?>")?;
            } else if self.looking_at("<!ENTITY") {
                self.entity_decl()?;
            } else if self.looking_at("<!") {
                self.skip_declaration()?;
            } else if self.peek() == Some('%') {
                self.skip_past(";")?;
            } else {
                return Err(
                    "xmlParseInternalSubset: error detected in Markup declaration".to_string(),
                );
            }
        }
    }

    fn entity_decl(&mut self) -> Result<(), String> {
        self.pos += "<!ENTITY".len();
        self.skip_whitespace_required("Space required after '<!ENTITY'")?;

        let parameter = self.peek() == Some('%');
        if parameter {
            self.pos += 1;
            self.skip_whitespace_required("Space required after '%'")?;
        }
        let name = self
            .parse_name()
            .map_err(|_| "xmlParseEntityDecl: no name".to_string())?;
        if name.contains(':') {
            return Err(format!("colons are forbidden from entities names '{name}'"));
        }
        self.skip_whitespace_required("Space required after the entity name")?;

        let entity = if matches!(self.peek(), Some('"' | '\'')) {
            RawEntity::Internal(self.parse_quoted_value()?)
        } else if self.looking_at("SYSTEM") || self.looking_at("PUBLIC") {
            self.external_id()?;
            self.skip_whitespace();
            if self.looking_at("NDATA") {
                self.pos += "NDATA".len();
                self.skip_whitespace_required("Space required after 'NDATA'")?;
                self.parse_name()
                    .map_err(|_| "xmlParseEntityDecl: no notation name".to_string())?;
            }
            RawEntity::External
        } else {
            return Err("Entity value required".to_string());
        };

        self.skip_whitespace();
        if self.peek() != Some('>') {
            return Err(format!("xmlParseEntityDecl: entity {name} not terminated"));
        }
        self.pos += 1;

        if !parameter {
            self.entities.push((name.to_string(), entity));
        }
        Ok(())
    }

    fn external_id(&mut self) -> Result<(), String> {
        let public = self.looking_at("PUBLIC");
        self.pos += "SYSTEM".len();
        self.skip_whitespace_required("Space required after 'SYSTEM' or 'PUBLIC'")?;
        self.parse_quoted_value()?;
        if public {
            self.skip_whitespace_required("Space required after the Public Identifier")?;
            self.parse_quoted_value()?;
        }
        Ok(())
    }

    /// Skips `<!ELEMENT`, `<!ATTLIST`, `<!NOTATION` up to their closing `>`,
    /// stepping over quoted literals.
    fn skip_declaration(&mut self) -> Result<(), String> {
        while let Some(c) = self.peek() {
            match c {
                '"' | '\'' => {
                    self.parse_quoted_value()?;
                }
                '>' => {
                    self.pos += 1;
                    return Ok(());
                }
                _ => self.pos += c.len_utf8(),
            }
        }
        Err("xmlParseInternalSubset: error detected in Markup declaration".to_string())
    }

    fn skip_past(&mut self, terminator: &str) -> Result<(), String> {
        match self.input[self.pos..].find(terminator) {
            Some(at) => {
                self.pos += at + terminator.len();
                Ok(())
            }
            None => Err("xmlParseInternalSubset: error detected in Markup declaration".to_string()),
        }
    }

    fn parse_name(&mut self) -> Result<&'a str, ()> {
        let rest = &self.input[self.pos..];
        let mut chars = rest.char_indices();
        match chars.next() {
            Some((_, c)) if is_name_start_char(c) => {}
            _ => return Err(()),
        }
        let end = chars
            .find(|&(_, c)| !is_name_char(c))
            .map_or(rest.len(), |(i, _)| i);
        self.pos += end;
        Ok(&rest[..end])
    }

    fn parse_quoted_value(&mut self) -> Result<String, String> {
        let Some(quote) = self.peek().filter(|c| matches!(c, '"' | '\'')) else {
            return Err("EntityValue: \" or ' expected".to_string());
        };
        let start = self.pos + 1;
        match self.input[start..].find(quote) {
            Some(len) => {
                self.pos = start + len + 1;
                Ok(self.input[start..start + len].to_string())
            }
            None => Err("EntityValue: \" or ' expected".to_string()),
        }
    }

    fn skip_whitespace_required(&mut self, message: &str) -> Result<(), String> {
        if self.skip_whitespace() {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        let rest = &self.input[self.pos..];
        let trimmed = rest.trim_start_matches([' ', '\t', '\n', '\r']);
        self.pos += rest.len() - trimmed.len();
        self.pos > start
    }

    fn looking_at(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }
}
