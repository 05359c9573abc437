use indexmap::IndexMap;
use rust_decimal::Decimal;
use std::fmt::{self, Display};

/// A node of a document tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Decimal(Decimal),
    Str(String),
    Seq(Vec<Value>),
    Map(Document),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Map(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_document_mut(&mut self) -> Option<&mut Document> {
        match self {
            Value::Map(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::Seq(items) => Some(items),
            _ => None,
        }
    }

    /// Equality that treats integers and decimals as numbers, so `4.50`,
    /// `4.5` and `Int(4)` vs `Decimal(4)` compare by magnitude.
    pub fn value_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Decimal(b)) | (Value::Decimal(b), Value::Int(a)) => {
                Decimal::from(*a) == *b
            }
            (a, b) => a == b,
        }
    }

    /// A short name of the variant, used in conversion errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Decimal(_) => "decimal",
            Value::Str(_) => "string",
            Value::Seq(_) => "sequence",
            Value::Map(_) => "document",
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Str(s) => write!(f, "{}", s),
            Value::Seq(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(doc) => write!(f, "{}", doc),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Decimal(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Document> for Value {
    fn from(d: Document) -> Self {
        Value::Map(d)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Seq(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// An ordered, string-keyed tree. Keys given to [`get`](Document::get),
/// [`put`](Document::put), [`remove`](Document::remove) and
/// [`contains_key`](Document::contains_key) may be dotted paths, which
/// address nested documents.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    entries: IndexMap<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        match path.split_once('.') {
            Some((head, tail)) => self.entries.get(head)?.as_document()?.get(tail),
            None => self.entries.get(path),
        }
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut Value> {
        match path.split_once('.') {
            Some((head, tail)) => self.entries.get_mut(head)?.as_document_mut()?.get_mut(tail),
            None => self.entries.get_mut(path),
        }
    }

    /// Stores `value` at `path`, creating intermediate documents. An
    /// intermediate segment holding anything other than a document is
    /// replaced by a fresh one.
    pub fn put(&mut self, path: &str, value: impl Into<Value>) -> Option<Value> {
        match path.split_once('.') {
            Some((head, tail)) => {
                let slot = self.entries.entry(head.to_string()).or_insert(Value::Null);
                if !matches!(slot, Value::Map(_)) {
                    *slot = Value::Map(Document::new());
                }
                match slot {
                    Value::Map(nested) => nested.put(tail, value),
                    _ => None,
                }
            }
            None => self.entries.insert(path.to_string(), value.into()),
        }
    }

    pub fn remove(&mut self, path: &str) -> Option<Value> {
        match path.split_once('.') {
            Some((head, tail)) => self.entries.get_mut(head)?.as_document_mut()?.remove(tail),
            None => self.entries.shift_remove(path),
        }
    }

    pub fn contains_key(&self, path: &str) -> bool {
        match path.split_once('.') {
            Some((head, tail)) => self
                .entries
                .get(head)
                .and_then(Value::as_document)
                .is_some_and(|nested| nested.contains_key(tail)),
            None => self.entries.contains_key(path),
        }
    }

    pub fn with(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.put(path, value);
        self
    }

    pub fn without(mut self, path: &str) -> Self {
        self.remove(path);
        self
    }

    /// Stores at `path` the `format` string with its first `{}` replaced by
    /// the value found at `from`.
    pub fn with_derived(mut self, path: &str, format: &str, from: &str) -> Self {
        let source = self.get(from).cloned().unwrap_or_default();
        let derived = format.replacen("{}", &source.to_string(), 1);
        self.put(path, derived);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut doc = Document::new();
        for (k, v) in iter {
            doc.put(&k, v);
        }
        doc
    }
}

impl Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", k, v)?;
        }
        write!(f, "}}")
    }
}
