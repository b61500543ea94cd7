//! Bean names and name patterns.
//!
//! A bean name has the form `domain:key=value[,key=value...]`. Values may be
//! double-quoted, in which case they can contain `,`, `=` and `:`.
//! Patterns use the same shape with a glob domain (`*` and `?`) and an
//! optional trailing `*` property entry that admits additional keys.
//!
//! Two names with the same domain and key set are the same name whatever
//! order the keys were written in. Display keeps the order as given.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use glob::Pattern;
use thiserror::Error;

/// Reasons a bean name or pattern fails to parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("missing ':' between domain and key properties")]
    MissingDomainSeparator,
    #[error("key property list is empty")]
    EmptyProperties,
    #[error("malformed key property '{0}'")]
    MalformedProperty(String),
    #[error("duplicate key '{0}'")]
    DuplicateKey(String),
    #[error("unterminated quoted value")]
    UnterminatedQuote,
    #[error("illegal character in domain '{0}'")]
    IllegalDomain(String),
}

/// Registered bean identifier.
///
/// Ordering, equality and hashing follow the canonical form (domain plus
/// keys sorted by name), so sorted listings are total and stable across
/// calls.
#[derive(Clone)]
pub struct BeanName {
    domain: String,
    properties: Vec<(String, String)>,
    text: String,
    canonical: String,
}

impl BeanName {
    /// Parses `domain:key=value,...`.
    pub fn parse(s: &str) -> Result<Self, NameError> {
        let (domain, rest) = s.split_once(':').ok_or(NameError::MissingDomainSeparator)?;
        if domain.contains(['*', '?', ',', '=']) {
            return Err(NameError::IllegalDomain(domain.to_string()));
        }
        let properties = parse_properties(rest)?;
        if properties.is_empty() {
            return Err(NameError::EmptyProperties);
        }
        if properties.iter().any(|(k, _)| k == "*") {
            return Err(NameError::MalformedProperty("*".into()));
        }
        Ok(Self::from_parts(domain, properties))
    }

    /// Builds a name from an already-split domain and key list.
    pub fn from_parts(domain: &str, properties: Vec<(String, String)>) -> Self {
        let text = join_name(domain, properties.iter());
        let mut sorted: Vec<&(String, String)> = properties.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        let canonical = join_name(domain, sorted.into_iter());
        Self {
            domain: domain.to_string(),
            properties,
            text,
            canonical,
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Value of a key property, quotes included.
    pub fn key(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn properties(&self) -> &[(String, String)] {
        &self.properties
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// `domain:k1=v1,k2=v2` with keys in lexical order.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }
}

fn join_name<'a>(domain: &str, properties: impl Iterator<Item = &'a (String, String)>) -> String {
    let mut text = String::with_capacity(domain.len() + 32);
    text.push_str(domain);
    text.push(':');
    for (i, (k, v)) in properties.enumerate() {
        if i > 0 {
            text.push(',');
        }
        text.push_str(k);
        text.push('=');
        text.push_str(v);
    }
    text
}

impl fmt::Display for BeanName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl fmt::Debug for BeanName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BeanName({})", self.text)
    }
}

impl PartialEq for BeanName {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for BeanName {}

impl PartialOrd for BeanName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BeanName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical.cmp(&other.canonical)
    }
}

impl Hash for BeanName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl FromStr for BeanName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Query pattern over bean names.
#[derive(Debug, Clone)]
pub struct BeanPattern {
    /// `None` selects the registry's default domain.
    domain: Option<Pattern>,
    properties: Vec<(String, String)>,
    open: bool,
}

impl BeanPattern {
    /// Parses `domain-glob:key=value,...[,*]`. An empty domain glob selects
    /// the registry's default domain.
    pub fn parse(s: &str) -> Result<Self, NameError> {
        let (domain, rest) = s.split_once(':').ok_or(NameError::MissingDomainSeparator)?;
        if domain.contains([',', '=']) {
            return Err(NameError::IllegalDomain(domain.to_string()));
        }
        let mut properties = parse_properties(rest)?;
        let before = properties.len();
        properties.retain(|(k, _)| k != "*");
        let open = properties.len() != before;
        if properties.is_empty() && !open {
            return Err(NameError::EmptyProperties);
        }
        let domain = if domain.is_empty() {
            None
        } else {
            Some(domain_glob(domain).ok_or_else(|| NameError::IllegalDomain(domain.to_string()))?)
        };
        Ok(Self {
            domain,
            properties,
            open,
        })
    }

    /// Pattern matching every bean.
    pub fn any() -> Self {
        Self {
            domain: domain_glob("*"),
            properties: Vec::new(),
            open: true,
        }
    }

    pub fn matches(&self, name: &BeanName, default_domain: &str) -> bool {
        let domain_ok = match &self.domain {
            Some(glob) => glob.matches(name.domain()),
            None => name.domain() == default_domain,
        };
        if !domain_ok {
            return false;
        }
        let all_present = self
            .properties
            .iter()
            .all(|(k, v)| name.key(k) == Some(v.as_str()));
        if !all_present {
            return false;
        }
        self.open || name.properties().len() == self.properties.len()
    }
}

impl FromStr for BeanPattern {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Splits `k=v,k="a,b",*` into pairs. A bare `*` entry becomes `("*", "")`.
fn parse_properties(s: &str) -> Result<Vec<(String, String)>, NameError> {
    let mut out: Vec<(String, String)> = Vec::new();
    if s.is_empty() {
        return Ok(out);
    }
    for entry in split_unquoted(s)? {
        if entry == "*" {
            if out.iter().any(|(k, _)| k == "*") {
                return Err(NameError::DuplicateKey("*".into()));
            }
            out.push(("*".into(), String::new()));
            continue;
        }
        let (k, v) = entry
            .split_once('=')
            .ok_or_else(|| NameError::MalformedProperty(entry.clone()))?;
        if k.is_empty() || v.is_empty() || k.contains(['*', '?', ':']) {
            return Err(NameError::MalformedProperty(entry.clone()));
        }
        if out.iter().any(|(existing, _)| existing == k) {
            return Err(NameError::DuplicateKey(k.to_string()));
        }
        out.push((k.to_string(), v.to_string()));
    }
    Ok(out)
}

fn split_unquoted(s: &str) -> Result<Vec<String>, NameError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut escaped = false;
    for c in s.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if quoted => {
                current.push(c);
                escaped = true;
            }
            '"' => {
                current.push(c);
                quoted = !quoted;
            }
            ',' if !quoted => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    if quoted {
        return Err(NameError::UnterminatedQuote);
    }
    parts.push(current);
    Ok(parts)
}

/// Compiles a domain glob where only `*` (any run) and `?` (one char) are
/// special. Every other character matches itself.
fn domain_glob(pattern: &str) -> Option<Pattern> {
    let mut escaped = String::with_capacity(pattern.len());
    let mut literal = String::new();
    for c in pattern.chars() {
        if c == '*' || c == '?' {
            escaped.push_str(&Pattern::escape(&std::mem::take(&mut literal)));
            if !(c == '*' && escaped.ends_with('*')) {
                escaped.push(c);
            }
        } else {
            literal.push(c);
        }
    }
    escaped.push_str(&Pattern::escape(&literal));
    Pattern::new(&escaped).ok()
}

/// Whether `text` matches the domain glob `pattern`.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    domain_glob(pattern).is_some_and(|glob| glob.matches(text))
}
