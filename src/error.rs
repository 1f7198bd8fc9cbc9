use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Verification error: {0}")]
    VerificationError(String),

    #[error("Type error: {0}")]
    TypeError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("failed to convert signature of function '{function}': no conversion for type {ty}")]
    SignatureConversion { function: String, ty: String },

    #[error("failed to legalize operation '{op}' in function '{function}': no matching legalization pattern")]
    NoLegalizationPattern { op: String, function: String },

    #[error("{}", join_failures(.0))]
    KernelLowering(Vec<Error>),

    #[error("pass '{pass}' failed: {source}")]
    PassFailed {
        pass: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{pipeline} failed: {source}")]
    PipelineFailed {
        pipeline: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Walks `PassFailed`/`PipelineFailed` wrappers down to the error that
    /// actually stopped the pipeline.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::PassFailed { source, .. } | Error::PipelineFailed { source, .. } => {
                source.root_cause()
            }
            other => other,
        }
    }
}

fn join_failures(failures: &[Error]) -> String {
    let details: Vec<String> = failures.iter().map(|e| e.to_string()).collect();
    format!(
        "{} kernel function(s) failed to lower: {}",
        failures.len(),
        details.join("; ")
    )
}

pub type Result<T> = std::result::Result<T, Error>;
