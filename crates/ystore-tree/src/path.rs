//! Data-path addressing.
//!
//! Paths are absolute, slash-separated, with an explicit module prefix on
//! the first segment (later segments inherit it):
//!
//! ```text
//! /ietf-interfaces:interfaces/interface[name='eth0']/enabled
//! /test:cont/leaf-list[.='value']
//! ```
//!
//! Supported predicates are list keys (`[name='eth0']`, repeatable) and
//! leaf-list values (`[.='value']`). Quoting accepts `'` or `"`.

use std::fmt;

use smallvec::SmallVec;
use ystore_error::{Result, StoreError};

/// One predicate of a path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Predicate {
    /// A list key: `[name='value']`.
    Key { name: String, value: String },
    /// A leaf-list value: `[.='value']`.
    Value(String),
}

/// One `/`-separated step of a data path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PathSegment {
    /// Module prefix; mandatory on the first segment, inherited afterwards.
    pub module: Option<String>,
    /// Schema node name.
    pub name: String,
    pub predicates: Vec<Predicate>,
}

impl PathSegment {
    /// Key predicates as `(name, value)` pairs, in path order.
    #[must_use]
    pub fn key_values(&self) -> Vec<(&str, &str)> {
        self.predicates
            .iter()
            .filter_map(|p| match p {
                Predicate::Key { name, value } => Some((name.as_str(), value.as_str())),
                Predicate::Value(_) => None,
            })
            .collect()
    }

    /// The leaf-list value predicate, when present.
    #[must_use]
    pub fn value_predicate(&self) -> Option<&str> {
        self.predicates.iter().find_map(|p| match p {
            Predicate::Value(v) => Some(v.as_str()),
            Predicate::Key { .. } => None,
        })
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(m) = &self.module {
            write!(f, "{m}:")?;
        }
        f.write_str(&self.name)?;
        for p in &self.predicates {
            match p {
                Predicate::Key { name, value } => write!(f, "[{name}='{value}']")?,
                Predicate::Value(v) => write!(f, "[.='{v}']")?,
            }
        }
        Ok(())
    }
}

/// A parsed absolute data path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Path {
    pub segments: SmallVec<[PathSegment; 4]>,
}

impl Path {
    /// Parse an absolute path. The first segment must carry a module
    /// prefix; an empty path or malformed predicate is *invalid argument*.
    pub fn parse(xpath: &str) -> Result<Self> {
        let rest = xpath
            .strip_prefix('/')
            .ok_or_else(|| StoreError::invalid_arg(format!("path \"{xpath}\" is not absolute")))?;
        if rest.is_empty() {
            return Err(StoreError::invalid_arg("empty path"));
        }

        let mut segments = SmallVec::new();
        for raw in split_segments(rest)? {
            segments.push(parse_segment(&raw, xpath)?);
        }
        let first: &PathSegment = &segments[0];
        if first.module.is_none() {
            return Err(StoreError::invalid_arg(format!(
                "path \"{xpath}\" is missing a module prefix on the first segment"
            )));
        }
        Ok(Self { segments })
    }

    /// The module name the path addresses (from the first segment).
    #[must_use]
    pub fn module(&self) -> &str {
        self.segments[0]
            .module
            .as_deref()
            .unwrap_or_default()
    }

    /// The last segment (the target node).
    #[must_use]
    pub fn last(&self) -> &PathSegment {
        self.segments
            .last()
            .expect("a parsed path has at least one segment")
    }

    /// A path with the last segment dropped; `None` for top-level targets.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1]
                .iter()
                .cloned()
                .collect(),
        })
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for seg in &self.segments {
            write!(f, "/{seg}")?;
        }
        Ok(())
    }
}

/// Split on `/` outside predicate brackets and quotes.
fn split_segments(s: &str) -> Result<Vec<String>> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut depth = 0_u32;
    let mut quote: Option<char> = None;
    for c in s.chars() {
        match (c, quote) {
            (q @ ('\'' | '"'), None) if depth > 0 => {
                quote = Some(q);
                current.push(c);
            }
            (c, Some(q)) if c == q => {
                quote = None;
                current.push(c);
            }
            ('[', None) => {
                depth += 1;
                current.push(c);
            }
            (']', None) => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| StoreError::invalid_arg("unbalanced ']' in path"))?;
                current.push(c);
            }
            ('/', None) if depth == 0 => {
                if current.is_empty() {
                    return Err(StoreError::invalid_arg("empty path segment"));
                }
                out.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    if quote.is_some() || depth != 0 {
        return Err(StoreError::invalid_arg("unterminated predicate in path"));
    }
    if current.is_empty() {
        return Err(StoreError::invalid_arg("trailing '/' in path"));
    }
    out.push(current);
    Ok(out)
}

fn parse_segment(raw: &str, full: &str) -> Result<PathSegment> {
    let (head, preds_raw) = match raw.find('[') {
        Some(i) => (&raw[..i], &raw[i..]),
        None => (raw, ""),
    };
    let (module, name) = match head.split_once(':') {
        Some((m, n)) => (Some(m.to_owned()), n.to_owned()),
        None => (None, head.to_owned()),
    };
    if name.is_empty() {
        return Err(StoreError::invalid_arg(format!(
            "empty node name in path \"{full}\""
        )));
    }

    let mut predicates = Vec::new();
    let mut rest = preds_raw;
    while !rest.is_empty() {
        let inner_end = rest
            .find(']')
            .ok_or_else(|| StoreError::invalid_arg("unterminated predicate in path"))?;
        let inner = &rest[1..inner_end];
        predicates.push(parse_predicate(inner, full)?);
        rest = &rest[inner_end + 1..];
    }
    Ok(PathSegment {
        module,
        name,
        predicates,
    })
}

fn parse_predicate(inner: &str, full: &str) -> Result<Predicate> {
    let (lhs, rhs) = inner.split_once('=').ok_or_else(|| {
        StoreError::invalid_arg(format!("predicate \"[{inner}]\" in \"{full}\" has no '='"))
    })?;
    let value = unquote(rhs).ok_or_else(|| {
        StoreError::invalid_arg(format!(
            "predicate value in \"[{inner}]\" must be quoted"
        ))
    })?;
    if lhs == "." {
        Ok(Predicate::Value(value))
    } else if !lhs.is_empty() {
        Ok(Predicate::Key {
            name: lhs.to_owned(),
            value,
        })
    } else {
        Err(StoreError::invalid_arg(format!(
            "empty predicate name in \"[{inner}]\""
        )))
    }
}

fn unquote(s: &str) -> Option<String> {
    let first = s.chars().next()?;
    if (first == '\'' || first == '"') && s.len() >= 2 && s.ends_with(first) {
        Some(s[1..s.len() - 1].to_owned())
    } else {
        None
    }
}
