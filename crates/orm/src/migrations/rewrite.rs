//! Schema rewriting for migration bodies
//!
//! Migrations are written either with the `{{schema}}` placeholder or against
//! the default schema name. The placeholder is always substituted. Literal
//! references to the default schema are rewritten only when targeting another
//! schema: `<default>.` qualifiers in code and in single-quoted literals, and
//! `CREATE SCHEMA IF NOT EXISTS <default>;` in code only. Comments and quoted
//! identifiers are never touched.

use regex::{NoExpand, Regex};

use crate::error::{OrmError, OrmResult};

/// Token replaced with the target schema in every migration body
pub const SCHEMA_PLACEHOLDER: &str = "{{schema}}";

/// Rewrites migration SQL for a target schema
#[derive(Debug, Clone)]
pub struct SchemaRewriter {
    default_schema: String,
    target_schema: String,
    create_schema: Regex,
    qualifier: Regex,
}

impl SchemaRewriter {
    pub fn new(default_schema: &str, target_schema: &str) -> OrmResult<Self> {
        for name in [default_schema, target_schema] {
            if !showroom_core::config::is_valid_identifier(name) {
                return Err(OrmError::Configuration(format!(
                    "'{}' is not a valid schema name",
                    name
                )));
            }
        }

        let escaped = regex::escape(default_schema);
        let create_schema = Regex::new(&format!(
            r"(?i)CREATE\s+SCHEMA\s+IF\s+NOT\s+EXISTS\s+{}\s*;",
            escaped
        ))
        .map_err(|e| OrmError::Configuration(e.to_string()))?;
        let qualifier = Regex::new(&format!(r"\b{}\.", escaped))
            .map_err(|e| OrmError::Configuration(e.to_string()))?;

        Ok(Self {
            default_schema: default_schema.to_string(),
            target_schema: target_schema.to_string(),
            create_schema,
            qualifier,
        })
    }

    /// Whether literal default-schema references are left untouched
    pub fn is_identity(&self) -> bool {
        self.default_schema == self.target_schema
    }

    /// Rewrite a migration body for the target schema
    pub fn rewrite(&self, sql: &str) -> String {
        let sql = sql.replace(SCHEMA_PLACEHOLDER, &self.target_schema);
        if self.is_identity() {
            return sql;
        }

        let create_replacement = format!("CREATE SCHEMA IF NOT EXISTS {};", self.target_schema);
        let qualifier_replacement = format!("{}.", self.target_schema);

        let mut rewritten = String::with_capacity(sql.len());
        for segment in split_segments(&sql) {
            match segment {
                Segment::Code(code) => {
                    let code = self
                        .create_schema
                        .replace_all(code, NoExpand(&create_replacement));
                    let code = self
                        .qualifier
                        .replace_all(&code, NoExpand(&qualifier_replacement));
                    rewritten.push_str(&code);
                }
                // nextval('selection.x_seq'), to_regclass('selection.t') and
                // quoted function bodies name objects from inside literals
                Segment::Literal(text) => {
                    let text = self
                        .qualifier
                        .replace_all(text, NoExpand(&qualifier_replacement));
                    rewritten.push_str(&text);
                }
                Segment::Opaque(text) => rewritten.push_str(text),
            }
        }
        rewritten
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    /// SQL text eligible for every rewrite
    Code(&'a str),
    /// Single-quoted string literal; only qualifiers are rewritten
    Literal(&'a str),
    /// Quoted identifier or comment
    Opaque(&'a str),
}

/// Split SQL into code, literal and opaque segments. Unterminated literals
/// and comments run to the end of the input.
fn split_segments(sql: &str) -> Vec<Segment<'_>> {
    let bytes = sql.as_bytes();
    let mut segments = Vec::new();
    let mut code_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let end = match (bytes[i], bytes.get(i + 1)) {
            (b'\'', _) => {
                let escaped = is_escape_string(bytes, i);
                Some((quoted_end(bytes, i, b'\'', escaped), true))
            }
            (b'"', _) => Some((quoted_end(bytes, i, b'"', false), false)),
            (b'-', Some(b'-')) => Some((
                sql[i..]
                    .find('\n')
                    .map_or(bytes.len(), |offset| i + offset),
                false,
            )),
            (b'/', Some(b'*')) => Some((
                sql[i + 2..]
                    .find("*/")
                    .map_or(bytes.len(), |offset| i + 2 + offset + 2),
                false,
            )),
            _ => None,
        };

        match end {
            Some((end, literal)) => {
                if code_start < i {
                    segments.push(Segment::Code(&sql[code_start..i]));
                }
                let text = &sql[i..end];
                segments.push(if literal {
                    Segment::Literal(text)
                } else {
                    Segment::Opaque(text)
                });
                code_start = end;
                i = end;
            }
            None => i += 1,
        }
    }

    if code_start < bytes.len() {
        segments.push(Segment::Code(&sql[code_start..]));
    }
    segments
}

// `E'...'`: the quote follows a lone E that is not the tail of an identifier
fn is_escape_string(bytes: &[u8], quote: usize) -> bool {
    let is_ident = |b: u8| b.is_ascii_alphanumeric() || b == b'_' || b == b'$';
    quote >= 1
        && matches!(bytes[quote - 1], b'E' | b'e')
        && (quote < 2 || !is_ident(bytes[quote - 2]))
}

// Index just past the closing quote. A doubled quote is an escaped one, and
// so is a backslash-escaped one in an escape string.
fn quoted_end(bytes: &[u8], start: usize, quote: u8, backslash_escapes: bool) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        if backslash_escapes && bytes[i] == b'\\' {
            i += 2;
            continue;
        }
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}
