use super::bus::{Change, ChangeBus, Observer, SubscriptionId};
use super::error::{ParamError, SchemaError, ValidationError};
use super::node::{Field, Group, Node};
use super::{ParamMap, ParamPath, Value};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashSet;

/// Borrowed view of a node returned by [`ParamTree::get`].
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Field(&'a Field),
    Group(&'a Group),
}

impl<'a> NodeRef<'a> {
    pub fn as_field(self) -> Option<&'a Field> {
        match self {
            NodeRef::Field(f) => Some(f),
            NodeRef::Group(_) => None,
        }
    }

    pub fn as_group(self) -> Option<&'a Group> {
        match self {
            NodeRef::Group(g) => Some(g),
            NodeRef::Field(_) => None,
        }
    }
}

/// Group-nested view of the current values, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Nested {
    Value(Value),
    Group(IndexMap<String, Nested>),
}

/// Outcome of applying a preset: accepted entries stay applied even when others fail.
#[derive(Debug, Default)]
pub struct PresetReport {
    pub applied: usize,
    pub rejected: Vec<(String, ParamError)>,
}

/// The whole addressable configuration, rooted at one group.
///
/// [`ParamTree::set_value`] is the only way to change a value; every accepted
/// change is published to the subscribers of its address and ancestors before
/// the call returns.
#[derive(Debug)]
pub struct ParamTree {
    root: Group,
    bus: ChangeBus,
}

impl ParamTree {
    pub fn new(root: Group) -> Result<Self, SchemaError> {
        let mut names = HashSet::new();
        check_group(&root, &ParamPath::root(), &mut names)?;
        Ok(Self {
            root,
            bus: ChangeBus::default(),
        })
    }

    pub fn root(&self) -> &Group {
        &self.root
    }

    pub fn get(&self, path: &ParamPath) -> Result<NodeRef<'_>, ParamError> {
        let mut current = NodeRef::Group(&self.root);
        for key in path.keys() {
            let group = current
                .as_group()
                .ok_or_else(|| ParamError::NotFound(path.clone()))?;
            current = match group.child(key) {
                Some(Node::Field(f)) => NodeRef::Field(f),
                Some(Node::Group(g)) => NodeRef::Group(g),
                None => return Err(ParamError::NotFound(path.clone())),
            };
        }
        Ok(current)
    }

    pub fn field(&self, path: &ParamPath) -> Result<&Field, ParamError> {
        self.get(path)?
            .as_field()
            .ok_or_else(|| ParamError::NotAField(path.clone()))
    }

    pub fn value(&self, path: &ParamPath) -> Result<&Value, ParamError> {
        self.field(path).map(Field::value)
    }

    /// Validate `raw` against the field at `path`, store it, and notify subscribers.
    ///
    /// On error the field keeps its previous value and nothing is published.
    pub fn set_value(&mut self, path: &ParamPath, raw: impl Into<Value>) -> Result<(), ParamError> {
        let field = find_field_mut(&mut self.root, path)?;
        let value = field.validate(raw.into()).map_err(|source| ParamError::Invalid {
            path: path.clone(),
            source,
        })?;
        field.assign(value.clone());
        tracing::debug!(path = %path, %value, "parameter updated");
        self.bus.publish(&Change {
            path: path.clone(),
            value,
        });
        Ok(())
    }

    /// Restore the field at `path`, or every field under the group at `path`, to its default.
    pub fn reset(&mut self, path: &ParamPath) -> Result<(), ParamError> {
        let targets: Vec<(ParamPath, Value)> = match self.get(path)? {
            NodeRef::Field(f) => vec![(path.clone(), f.default_value().clone())],
            NodeRef::Group(g) => {
                let mut out = Vec::new();
                collect_fields(g, path, &mut out);
                out.into_iter()
                    .map(|(p, f)| (p, f.default_value().clone()))
                    .collect()
            }
        };
        for (p, default) in targets {
            self.set_value(&p, default)?;
        }
        Ok(())
    }

    /// Observe changes at or below `scope`.
    pub fn subscribe(
        &mut self,
        scope: ParamPath,
        observer: Observer,
    ) -> Result<SubscriptionId, ParamError> {
        self.get(&scope)?;
        Ok(self.bus.subscribe(scope, observer))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Every field reachable from the root, depth first in declaration order.
    pub fn fields(&self) -> Vec<(ParamPath, &Field)> {
        let mut out = Vec::new();
        collect_fields(&self.root, &ParamPath::root(), &mut out);
        out
    }

    /// Flat snapshot keyed by serialized name, in declaration order.
    pub fn serialize(&self) -> ParamMap {
        self.fields()
            .into_iter()
            .map(|(_, f)| (f.serialized_name().to_string(), f.value().clone()))
            .collect()
    }

    pub fn serialize_nested(&self) -> IndexMap<String, Nested> {
        nest(&self.root)
    }

    /// Path of the field serialized as `name`.
    pub fn find_by_name(&self, name: &str) -> Option<ParamPath> {
        self.fields()
            .into_iter()
            .find(|(_, f)| f.serialized_name() == name)
            .map(|(p, _)| p)
    }

    /// Apply a JSON preset, either group-nested or flat by serialized name.
    pub fn apply_map(&mut self, preset: &serde_json::Map<String, serde_json::Value>) -> PresetReport {
        let mut report = PresetReport::default();
        self.apply_level(&ParamPath::root(), preset, &mut report);
        report
    }

    fn apply_level(
        &mut self,
        at: &ParamPath,
        entries: &serde_json::Map<String, serde_json::Value>,
        report: &mut PresetReport,
    ) {
        for (key, raw) in entries {
            let mut path = at.child(key.as_str());
            if self.get(&path).is_err() && at.is_root() {
                if let Some(found) = self.find_by_name(key) {
                    path = found;
                }
            }
            let node_is_group = match self.get(&path) {
                Ok(node) => node.as_group().is_some(),
                Err(e) => {
                    report.rejected.push((path.to_string(), e));
                    continue;
                }
            };
            match (node_is_group, raw) {
                (true, serde_json::Value::Object(inner)) => self.apply_level(&path, inner, report),
                (true, _) => report
                    .rejected
                    .push((path.to_string(), ParamError::NotAField(path.clone()))),
                (false, raw) => {
                    let outcome = match json_to_value(raw) {
                        Some(value) => self.set_value(&path, value),
                        None => Err(self.type_mismatch(&path, raw)),
                    };
                    match outcome {
                        Ok(()) => report.applied += 1,
                        Err(e) => report.rejected.push((path.to_string(), e)),
                    }
                }
            }
        }
    }

    fn type_mismatch(&self, path: &ParamPath, raw: &serde_json::Value) -> ParamError {
        match self.field(path) {
            Ok(field) => ParamError::Invalid {
                path: path.clone(),
                source: ValidationError::TypeMismatch {
                    expected: field.value_type(),
                    found: raw.to_string(),
                },
            },
            Err(e) => e,
        }
    }

    /// Extend the schema at runtime by appending `node` to the group at `parent`.
    pub fn append(&mut self, parent: &ParamPath, node: impl Into<Node>) -> Result<(), ParamError> {
        let node = node.into();
        let mut names: HashSet<String> = self
            .fields()
            .into_iter()
            .map(|(_, f)| f.serialized_name().to_string())
            .collect();
        let group = find_group_mut(&mut self.root, parent)?;
        if group.child(node.key()).is_some() {
            return Err(SchemaError::DuplicateKey {
                parent: parent.clone(),
                key: node.key().to_string(),
            }
            .into());
        }
        let path = parent.child(node.key());
        match &node {
            Node::Field(f) => {
                if !names.insert(f.serialized_name().to_string()) {
                    return Err(SchemaError::DuplicateName {
                        name: f.serialized_name().to_string(),
                    }
                    .into());
                }
            }
            Node::Group(g) => check_group(g, &path, &mut names)?,
        }
        tracing::debug!(path = %path, "parameter tree extended");
        group.push(node);
        Ok(())
    }
}

fn check_group(
    group: &Group,
    path: &ParamPath,
    names: &mut HashSet<String>,
) -> Result<(), SchemaError> {
    let mut keys = HashSet::new();
    for child in group.children() {
        if !keys.insert(child.key()) {
            return Err(SchemaError::DuplicateKey {
                parent: path.clone(),
                key: child.key().to_string(),
            });
        }
        match child {
            Node::Field(f) => {
                if !names.insert(f.serialized_name().to_string()) {
                    return Err(SchemaError::DuplicateName {
                        name: f.serialized_name().to_string(),
                    });
                }
            }
            Node::Group(g) => check_group(g, &path.child(g.key()), names)?,
        }
    }
    Ok(())
}

fn collect_fields<'a>(group: &'a Group, path: &ParamPath, out: &mut Vec<(ParamPath, &'a Field)>) {
    for child in group.children() {
        let child_path = path.child(child.key());
        match child {
            Node::Field(f) => out.push((child_path, f)),
            Node::Group(g) => collect_fields(g, &child_path, out),
        }
    }
}

fn nest(group: &Group) -> IndexMap<String, Nested> {
    group
        .children()
        .iter()
        .map(|child| {
            let nested = match child {
                Node::Field(f) => Nested::Value(f.value().clone()),
                Node::Group(g) => Nested::Group(nest(g)),
            };
            (child.key().to_string(), nested)
        })
        .collect()
}

fn find_group_mut<'a>(root: &'a mut Group, path: &ParamPath) -> Result<&'a mut Group, ParamError> {
    let mut current = root;
    for key in path.keys() {
        current = match current.child_mut(key) {
            Some(Node::Group(g)) => g,
            Some(Node::Field(_)) => return Err(ParamError::NotAGroup(path.clone())),
            None => return Err(ParamError::NotFound(path.clone())),
        };
    }
    Ok(current)
}

fn find_field_mut<'a>(root: &'a mut Group, path: &ParamPath) -> Result<&'a mut Field, ParamError> {
    let (last, parents) = path
        .keys()
        .split_last()
        .ok_or_else(|| ParamError::NotAField(path.clone()))?;
    let group = find_group_mut(root, &ParamPath::new(parents.iter().cloned()))
        .map_err(|_| ParamError::NotFound(path.clone()))?;
    match group.child_mut(last) {
        Some(Node::Field(f)) => Ok(f),
        Some(Node::Group(_)) => Err(ParamError::NotAField(path.clone())),
        None => Err(ParamError::NotFound(path.clone())),
    }
}

fn json_to_value(raw: &serde_json::Value) -> Option<Value> {
    match raw {
        serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .or_else(|| n.as_f64().map(Value::Float)),
        serde_json::Value::String(s) => Some(Value::Str(s.clone())),
        _ => None,
    }
}
