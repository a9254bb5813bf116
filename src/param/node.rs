use super::error::{SchemaError, ValidationError};
use super::value::{Value, ValueType};
use serde::Serialize;
use std::fmt;

/// One allowed value of an enumerated field, with its display label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Choice {
    pub value: Value,
    pub label: String,
}

/// Inclusive numeric bounds; a missing bound is open.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NumericRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl NumericRange {
    pub fn contains(&self, x: f64) -> bool {
        self.min.map_or(true, |min| x >= min) && self.max.map_or(true, |max| x <= max)
    }
}

impl fmt::Display for NumericRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.min {
            Some(min) => write!(f, "[{min}, ")?,
            None => f.write_str("(-inf, ")?,
        }
        match self.max {
            Some(max) => write!(f, "{max}]"),
            None => f.write_str("inf)"),
        }
    }
}

/// Constraint on a field's value beyond its type. Choices and range are exclusive.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    None,
    Choices(Vec<Choice>),
    Range(NumericRange),
}

/// A leaf parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    key: String,
    name: Option<String>,
    label: String,
    doc: String,
    value_type: ValueType,
    value: Value,
    default: Value,
    constraint: Constraint,
}

impl Field {
    /// Start declaring a field. The default must be set before `build`.
    pub fn builder(key: impl Into<String>, value_type: ValueType) -> FieldBuilder {
        let key = key.into();
        FieldBuilder {
            label: key.clone(),
            key,
            name: None,
            doc: String::new(),
            value_type,
            default: None,
            constraint: Constraint::None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Key under which this field appears in a flat snapshot.
    pub fn serialized_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.key)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn doc(&self) -> &str {
        &self.doc
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn default_value(&self) -> &Value {
        &self.default
    }

    pub fn constraint(&self) -> &Constraint {
        &self.constraint
    }

    /// Label of the current value when the field is enumerated.
    pub fn value_label(&self) -> Option<&str> {
        match &self.constraint {
            Constraint::Choices(choices) => choices
                .iter()
                .find(|c| c.value == self.value)
                .map(|c| c.label.as_str()),
            _ => None,
        }
    }

    /// Check `raw` against type and constraint, returning the typed value to store.
    pub fn validate(&self, raw: Value) -> Result<Value, ValidationError> {
        let found = raw.to_string();
        let value = raw
            .coerce(self.value_type)
            .ok_or(ValidationError::TypeMismatch {
                expected: self.value_type,
                found,
            })?;
        match &self.constraint {
            Constraint::None => Ok(value),
            Constraint::Choices(choices) => {
                if choices.iter().any(|c| c.value == value) {
                    Ok(value)
                } else {
                    let allowed = choices
                        .iter()
                        .map(|c| c.value.to_string())
                        .collect::<Vec<_>>()
                        .join(", ");
                    Err(ValidationError::NotInChoices { value, allowed })
                }
            }
            Constraint::Range(range) => match value.as_f64() {
                Some(x) if range.contains(x) => Ok(value),
                _ => Err(ValidationError::OutOfRange {
                    value,
                    range: range.to_string(),
                }),
            },
        }
    }

    pub(crate) fn assign(&mut self, value: Value) {
        self.value = value;
    }
}

pub struct FieldBuilder {
    key: String,
    name: Option<String>,
    label: String,
    doc: String,
    value_type: ValueType,
    default: Option<Value>,
    constraint: Constraint,
}

impl FieldBuilder {
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    /// Serialize under `name` instead of the key.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn choices<I, V, L>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = (V, L)>,
        V: Into<Value>,
        L: Into<String>,
    {
        self.constraint = Constraint::Choices(
            choices
                .into_iter()
                .map(|(value, label)| Choice {
                    value: value.into(),
                    label: label.into(),
                })
                .collect(),
        );
        self
    }

    pub fn range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.constraint = Constraint::Range(NumericRange { min, max });
        self
    }

    pub fn build(self) -> Result<Field, SchemaError> {
        let key = self.key;
        let constraint = match self.constraint {
            Constraint::Choices(choices) => {
                if choices.is_empty() {
                    return Err(SchemaError::EmptyChoices { key });
                }
                let mut typed = Vec::with_capacity(choices.len());
                for choice in choices {
                    let value = choice.value.clone().coerce(self.value_type).ok_or_else(|| {
                        SchemaError::InvalidChoice {
                            key: key.clone(),
                            value: choice.value.clone(),
                            expected: self.value_type,
                        }
                    })?;
                    typed.push(Choice {
                        value,
                        label: choice.label,
                    });
                }
                Constraint::Choices(typed)
            }
            Constraint::Range(range) => {
                if !matches!(self.value_type, ValueType::Int | ValueType::Float) {
                    return Err(SchemaError::RangeOnNonNumeric { key });
                }
                if let (Some(min), Some(max)) = (range.min, range.max) {
                    if min > max {
                        return Err(SchemaError::InvertedRange { key });
                    }
                }
                Constraint::Range(range)
            }
            Constraint::None => Constraint::None,
        };

        let mut field = Field {
            key,
            name: self.name,
            label: self.label,
            doc: self.doc,
            value_type: self.value_type,
            value: Value::Bool(false),
            default: Value::Bool(false),
            constraint,
        };
        // A missing default falls back to the first choice, as a combo box would show it.
        let raw_default = match (self.default, &field.constraint) {
            (Some(v), _) => v,
            (None, Constraint::Choices(choices)) => choices[0].value.clone(),
            (None, _) => zero_value(field.value_type),
        };
        let default = field
            .validate(raw_default)
            .map_err(|source| SchemaError::InvalidDefault {
                key: field.key.clone(),
                source,
            })?;
        field.value = default.clone();
        field.default = default;
        Ok(field)
    }
}

fn zero_value(value_type: ValueType) -> Value {
    match value_type {
        ValueType::Bool => Value::Bool(false),
        ValueType::Int => Value::Int(0),
        ValueType::Float => Value::Float(0.0),
        ValueType::Str => Value::Str(String::new()),
    }
}

/// A named, ordered container of fields and groups.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    key: String,
    label: String,
    children: Vec<Node>,
}

impl Group {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            label: key.clone(),
            key,
            children: Vec::new(),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Append a child during declaration. Key uniqueness is enforced when the
    /// group becomes part of a [`crate::param::ParamTree`].
    pub fn with(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn title(&self) -> &str {
        &self.label
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn child(&self, key: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.key() == key)
    }

    pub(crate) fn child_mut(&mut self, key: &str) -> Option<&mut Node> {
        self.children.iter_mut().find(|c| c.key() == key)
    }

    pub(crate) fn push(&mut self, child: Node) {
        self.children.push(child);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Field(Field),
    Group(Group),
}

impl Node {
    pub fn key(&self) -> &str {
        match self {
            Node::Field(f) => f.key(),
            Node::Group(g) => g.key(),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Node::Field(f) => f.label(),
            Node::Group(g) => g.title(),
        }
    }

    pub fn as_field(&self) -> Option<&Field> {
        match self {
            Node::Field(f) => Some(f),
            Node::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Node::Group(g) => Some(g),
            Node::Field(_) => None,
        }
    }
}

impl From<Field> for Node {
    fn from(value: Field) -> Self {
        Node::Field(value)
    }
}

impl From<Group> for Node {
    fn from(value: Group) -> Self {
        Node::Group(value)
    }
}
