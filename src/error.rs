use crate::slice::Axis;
use crate::subcube::SubcubeOutcome;

/// Boxed failure returned by engine adapters.
pub type EngineError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures raised while resolving member specifications or running a
/// subcube operation.
#[derive(Debug, thiserror::Error)]
pub enum CubeError {
    #[error("member specification for dimension {dimension} cannot be empty")]
    EmptySpecification { dimension: String },

    #[error("the member specification '{spec}' is not valid")]
    MalformedSpecification { spec: String },

    #[error("no member named '{member}' exists in dimension {dimension} (spec '{spec}')")]
    UnknownMember {
        dimension: String,
        member: String,
        spec: String,
    },

    #[error("no member with id {id} exists in dimension {dimension}")]
    UnknownMemberId { dimension: String, id: i32 },

    #[error("no member list named '{list}' exists in dimension {dimension} (spec '{spec}')")]
    UnknownMemberList {
        dimension: String,
        list: String,
        spec: String,
    },

    #[error("dimension '{0}' is not defined in this application")]
    UnknownDimension(String),

    #[error("{operation} requires members for the {axis} dimension")]
    MissingAxis { operation: String, axis: Axis },

    #[error("{operation} failed for {pov}")]
    Engine {
        operation: String,
        pov: String,
        #[source]
        source: EngineError,
    },

    /// A failure part way through a batch, with the counts reached before it.
    #[error(
        "{operation} aborted with {} POVs executed and {} skipped",
        .outcome.executed,
        .outcome.skipped
    )]
    Aborted {
        operation: String,
        outcome: SubcubeOutcome,
        #[source]
        source: Box<CubeError>,
    },

    #[error("metadata store error")]
    Store(#[from] rusqlite::Error),

    #[error("invalid pattern")]
    Pattern(#[from] regex::Error),
}

impl CubeError {
    /// True for failures caused by the text of a member specification.
    pub fn is_specification_error(&self) -> bool {
        matches!(
            self,
            Self::EmptySpecification { .. }
                | Self::MalformedSpecification { .. }
                | Self::UnknownMember { .. }
                | Self::UnknownMemberList { .. }
        )
    }
}

pub type CubeResult<T> = Result<T, CubeError>;
