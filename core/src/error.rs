use compact_str::CompactString;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuarryError {
    /// The query names an entity type the model does not map
    #[error("Entity type `{0}` is not mapped")]
    UnmappedEntity(CompactString),

    /// A member access names a property the entity does not map
    #[error("Member `{member}` is not mapped on entity `{entity}`")]
    UnmappedMember {
        entity: CompactString,
        member: CompactString,
    },

    /// The query model is malformed (e.g. an operator follows a terminal operator)
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// A named parameter referenced by the command has no value
    #[error("No value supplied for parameter `{0}`")]
    MissingParameter(CompactString),

    /// No rows returned when at least one was expected
    #[error("Sequence contains no elements")]
    EmptySequence,

    /// More rows returned than the operator allows
    #[error("Sequence contains more than one element")]
    MultipleElements,

    /// Error mapping row data into a value
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Error executing a command
    #[error("Execution error: {0}")]
    Execution(String),

    /// Every connection slot of the store is in use
    #[error("No free connection slot")]
    ConnectionBusy,

    /// The cancellation token fired while rows were being read
    #[error("Query was cancelled")]
    Cancelled,

    /// Rusqlite specific errors
    #[cfg(feature = "rusqlite")]
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
}

impl QuarryError {
    pub(crate) fn unmapped_member(entity: &str, member: &str) -> Self {
        Self::UnmappedMember {
            entity: entity.into(),
            member: member.into(),
        }
    }
}

/// Result type for compilation and execution
pub type Result<T> = std::result::Result<T, QuarryError>;
