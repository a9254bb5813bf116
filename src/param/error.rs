use super::{ParamPath, Value, ValueType};
use thiserror::Error;

/// Why a value was refused by a field. The field keeps its previous value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("expected a {expected} value, got {found:?}")]
    TypeMismatch { expected: ValueType, found: String },
    #[error("{value} is outside the allowed range {range}")]
    OutOfRange { value: Value, range: String },
    #[error("{value} is not one of the allowed choices ({allowed})")]
    NotInChoices { value: Value, allowed: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationKind {
    TypeMismatch,
    OutOfRange,
    NotInChoices,
}

impl ValidationError {
    pub fn kind(&self) -> ValidationKind {
        match self {
            ValidationError::TypeMismatch { .. } => ValidationKind::TypeMismatch,
            ValidationError::OutOfRange { .. } => ValidationKind::OutOfRange,
            ValidationError::NotInChoices { .. } => ValidationKind::NotInChoices,
        }
    }
}

/// Errors from addressing or mutating a [`crate::param::ParamTree`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    #[error("no parameter at {0}")]
    NotFound(ParamPath),
    #[error("{0} is a group, not a field")]
    NotAField(ParamPath),
    #[error("{0} is a field, not a group")]
    NotAGroup(ParamPath),
    #[error("invalid value for {path}: {source}")]
    Invalid {
        path: ParamPath,
        #[source]
        source: ValidationError,
    },
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl ParamError {
    /// The validation failure, if this error is one.
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            ParamError::Invalid { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors raised while declaring or extending a schema.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("field {key:?} has an invalid default: {source}")]
    InvalidDefault {
        key: String,
        #[source]
        source: ValidationError,
    },
    #[error("field {key:?} declares choice {value} that is not a {expected}")]
    InvalidChoice {
        key: String,
        value: Value,
        expected: ValueType,
    },
    #[error("field {key:?} declares an empty choice list")]
    EmptyChoices { key: String },
    #[error("field {key:?} declares a range on a non-numeric type")]
    RangeOnNonNumeric { key: String },
    #[error("field {key:?} declares a range whose minimum exceeds its maximum")]
    InvertedRange { key: String },
    #[error("duplicate key {key:?} under {parent}")]
    DuplicateKey { parent: ParamPath, key: String },
    #[error("duplicate serialized name {name:?}")]
    DuplicateName { name: String },
}
