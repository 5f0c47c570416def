use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("path `{0}` does not resolve")]
    PathNotFound(String),
    #[error("path `{0}` has no parent to attach to")]
    NoParent(String),
    #[error("cannot add at path `{0}`: target container is not an object or array")]
    NotAContainer(String),
    #[error("array index `{0}` out of bounds for path `{1}`")]
    IndexOutOfBounds(String, String),
    #[error("state does not conform to schema: unknown top-level key `{0}`")]
    UnknownTopLevelKey(String),
    #[error("state does not conform to schema: {0}")]
    SchemaViolation(String),
}
