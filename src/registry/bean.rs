//! Inspectable bean capability and the metadata it exposes.

use std::fmt;

/// A single attribute value as read from a bean.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    List(Vec<AttrValue>),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Null => f.write_str("null"),
            AttrValue::Bool(b) => write!(f, "{b}"),
            AttrValue::Int(i) => write!(f, "{i}"),
            AttrValue::UInt(u) => write!(f, "{u}"),
            AttrValue::Float(x) => write!(f, "{x:?}"),
            AttrValue::Text(s) => f.write_str(s),
            AttrValue::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl AttrValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<u64> for AttrValue {
    fn from(v: u64) -> Self {
        AttrValue::UInt(v)
    }
}

impl From<usize> for AttrValue {
    fn from(v: usize) -> Self {
        AttrValue::UInt(v as u64)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Text(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Text(v)
    }
}

impl<T: Into<AttrValue>> From<Option<T>> for AttrValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(AttrValue::Null, Into::into)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfo {
    pub name: String,
    pub type_name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterInfo {
    pub name: String,
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationInfo {
    pub name: String,
    pub return_type: String,
    pub parameters: Vec<ParameterInfo>,
    pub description: String,
}

impl OperationInfo {
    pub fn new(name: &str, return_type: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            return_type: return_type.to_string(),
            parameters: Vec::new(),
            description: description.to_string(),
        }
    }

    pub fn param(mut self, type_name: &str, name: &str) -> Self {
        self.parameters.push(ParameterInfo {
            name: name.to_string(),
            type_name: type_name.to_string(),
        });
        self
    }
}

/// Attribute and operation metadata of one bean, computed on demand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BeanDescriptor {
    pub attributes: Vec<AttributeInfo>,
    pub operations: Vec<OperationInfo>,
}

/// Why an attribute read failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    Unknown,
    Failed(String),
}

/// Anything that can be registered and inspected without the reader knowing
/// its concrete shape.
pub trait Inspectable: Send + Sync {
    fn attributes(&self) -> Vec<AttributeInfo>;

    fn operations(&self) -> Vec<OperationInfo> {
        Vec::new()
    }

    fn read_attribute(&self, name: &str) -> Result<AttrValue, ReadError>;
}

type Getter = Box<dyn Fn() -> Result<AttrValue, String> + Send + Sync>;

/// Bean assembled from getter closures.
#[derive(Default)]
pub struct DynamicBean {
    attributes: Vec<(AttributeInfo, Getter)>,
    operations: Vec<OperationInfo>,
}

impl DynamicBean {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an attribute whose getter cannot fail.
    pub fn attribute<F, V>(self, name: &str, type_name: &str, description: &str, getter: F) -> Self
    where
        F: Fn() -> V + Send + Sync + 'static,
        V: Into<AttrValue>,
    {
        self.fallible_attribute(name, type_name, description, move || Ok(getter().into()))
    }

    pub fn fallible_attribute<F>(
        mut self,
        name: &str,
        type_name: &str,
        description: &str,
        getter: F,
    ) -> Self
    where
        F: Fn() -> Result<AttrValue, String> + Send + Sync + 'static,
    {
        self.attributes.push((
            AttributeInfo {
                name: name.to_string(),
                type_name: type_name.to_string(),
                description: description.to_string(),
            },
            Box::new(getter),
        ));
        self
    }

    pub fn operation(mut self, op: OperationInfo) -> Self {
        self.operations.push(op);
        self
    }
}

impl Inspectable for DynamicBean {
    fn attributes(&self) -> Vec<AttributeInfo> {
        self.attributes.iter().map(|(info, _)| info.clone()).collect()
    }

    fn operations(&self) -> Vec<OperationInfo> {
        self.operations.clone()
    }

    fn read_attribute(&self, name: &str) -> Result<AttrValue, ReadError> {
        let (_, getter) = self
            .attributes
            .iter()
            .find(|(info, _)| info.name == name)
            .ok_or(ReadError::Unknown)?;
        getter().map_err(ReadError::Failed)
    }
}
