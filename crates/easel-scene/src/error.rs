use thiserror::Error;

/// A scene document that cannot be turned into a [`SceneGraph`](crate::SceneGraph).
///
/// `path` fields locate the offending node, e.g. `root.children[2]`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{path}: missing required field `{field}`")]
    MissingField { path: String, field: &'static str },

    #[error("scene `{field}` must be a positive integer, got {value}")]
    InvalidViewport { field: &'static str, value: f64 },

    #[error("{path}: unknown node type `{type_name}`")]
    UnknownNodeType { path: String, type_name: String },

    #[error("scene root must be a container, got `{type_name}`")]
    RootNotContainer { type_name: &'static str },

    #[error("{path}: duplicate node id `{id}`")]
    DuplicateId { path: String, id: String },

    #[error("{path}: `{field}` out of range ({value})")]
    OutOfRange { path: String, field: &'static str, value: f64 },

    #[error("{path}: invalid color `{value}`")]
    InvalidColor { path: String, value: String },

    #[error("{path}: malformed node: {message}")]
    Malformed { path: String, message: String },
}
