use thiserror::Error;

macro_rules! invalid_operation {
    // Single string version
    ($msg:expr) => {
        crate::Error::InvalidOperation($msg.to_string())
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::InvalidOperation(format!($fmt, $($arg)*))
    };
}

macro_rules! not_supported {
    ($msg:expr) => {
        crate::Error::NotSupported($msg.to_string())
    };

    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::NotSupported(format!($fmt, $($arg)*))
    };
}

macro_rules! argument_error {
    ($param:expr, $msg:expr) => {
        crate::Error::Argument {
            parameter: $param.to_string(),
            message: $msg.to_string(),
        }
    };

    ($param:expr, $fmt:expr, $($arg:tt)*) => {
        crate::Error::Argument {
            parameter: $param.to_string(),
            message: format!($fmt, $($arg)*),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants follow the failure taxonomy of the pipeline: configuration errors raised eagerly
/// by the descriptor model, code generation failures (wrapped with the requested type and the
/// configured participants), concurrency usage errors, and failures of the runtime that executes
/// generated code.
///
/// # Error Categories
///
/// ## Configuration Errors
/// - [`Error::Argument`] - An argument passed to a model operation is invalid
/// - [`Error::InvalidOperation`] - The operation is not valid in the current state
/// - [`Error::NotSupported`] - The requested modification cannot be expressed
/// - [`Error::DuplicateMember`] - A member with the same name or signature already exists
/// - [`Error::DescriptorSealed`] - A descriptor was modified after it was handed to codegen
/// - [`Error::Configuration`] - Invalid pipeline settings or participant setup
///
/// ## Code Generation Errors
/// - [`Error::TypeAssembly`] - Generic wrapper for failures that cannot keep their variant
///
/// ## Concurrency Usage Errors
/// - [`Error::PoolAffinity`] - A module context was returned on a foreign thread
///
/// ## Runtime Errors
/// - [`Error::MissingMember`], [`Error::NullReference`], [`Error::AbstractInstantiation`],
///   [`Error::RecursionLimit`], [`Error::TypeNotFound`]
///
/// ## Persistence Errors
/// - [`Error::Persistence`] - A flushed module could not be written or read back
/// - [`Error::FileError`] - Filesystem I/O errors
///
/// # Examples
///
/// ```rust,no_run
/// use typeforge::{Error, Pipeline};
///
/// # fn example(pipeline: &Pipeline, requested: &typeforge::runtime::TypeRc) {
/// match pipeline.reflection_service().get_assembled_type(requested) {
///     Ok(generated) => println!("Generated {}", generated.fullname()),
///     Err(Error::TypeAssembly { message, source }) => {
///         eprintln!("{message}: {source}");
///     }
///     Err(e) => eprintln!("Other error: {e}"),
/// }
/// # }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// An argument passed to an operation is invalid.
    ///
    /// Raised by the descriptor model for malformed member declarations, e.g. a property
    /// whose accessor belongs to a different type or a field of type `void`.
    #[error("Invalid argument '{parameter}': {message}")]
    Argument {
        /// Name of the offending parameter
        parameter: String,
        /// Description of what is wrong with it
        message: String,
    },

    /// The operation is not valid in the current state of the object.
    #[error("{0}")]
    InvalidOperation(String),

    /// The requested operation is not supported.
    #[error("{0}")]
    NotSupported(String),

    /// A member with an equal name (and signature) was already added.
    #[error("{kind} '{name}' already exists on type '{type_name}'")]
    DuplicateMember {
        /// Kind of member (field, method, ...)
        kind: &'static str,
        /// Name of the duplicated member
        name: String,
        /// Full name of the declaring type
        type_name: String,
    },

    /// A type descriptor was modified after it was handed over to code generation.
    #[error("Type '{0}' has been handed to code generation and can no longer be modified")]
    DescriptorSealed(String),

    /// The pipeline or one of its participants is configured incorrectly.
    #[error("Invalid pipeline configuration: {0}")]
    Configuration(String),

    /// Code generation for a requested type failed.
    ///
    /// This is the generic wrapper used when the original error cannot be rebuilt with the
    /// diagnostic context attached. The original error is kept as source.
    #[error("{message}")]
    TypeAssembly {
        /// Diagnostic message naming the requested type and the configured participants
        message: String,
        /// The error raised by the code generation backend
        #[source]
        source: Box<Error>,
    },

    /// A pooled module context was returned on a different thread than it was taken on.
    #[error("Module context leased by thread {owner} was returned on thread {current}")]
    PoolAffinity {
        /// Thread that dequeued the context
        owner: String,
        /// Thread that attempted to enqueue it
        current: String,
    },

    /// A member could not be found on a runtime type.
    #[error("Member '{member}' was not found on type '{type_name}'")]
    MissingMember {
        /// Full name of the searched type
        type_name: String,
        /// Description of the searched member
        member: String,
    },

    /// A null value was dereferenced while executing generated code.
    #[error("Null reference encountered while {0}")]
    NullReference(String),

    /// An abstract type, or an interface, was instantiated.
    #[error("Cannot create an instance of abstract type '{0}'")]
    AbstractInstantiation(String),

    /// Recursion limit reached.
    ///
    /// Execution of generated code is bounded to prevent stack exhaustion.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),

    /// Failed to find type in the registry.
    #[error("Failed to find type in registry - {0}")]
    TypeNotFound(String),

    /// A flushed module could not be written or loaded.
    #[error("Failed to persist or load generated code - {0}")]
    Persistence(String),

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),
}

impl Error {
    /// Attaches the requested type name and configured participants to a code generation error.
    ///
    /// Variants that only carry a message are rebuilt with the same variant and an augmented
    /// message, so callers matching on the variant keep working. All other variants are wrapped
    /// into [`Error::TypeAssembly`] with the original error as source.
    ///
    /// # Arguments
    ///
    /// * `type_name` - Full name of the requested type whose assembly failed
    /// * `participants` - Names of the configured participants, in order
    #[must_use]
    pub fn with_assembly_context(self, type_name: &str, participants: &[String]) -> Error {
        let context = assembly_context(type_name, participants);
        match self {
            Error::InvalidOperation(message) => {
                Error::InvalidOperation(format!("{context}\n{message}"))
            }
            Error::NotSupported(message) => Error::NotSupported(format!("{context}\n{message}")),
            Error::Configuration(message) => Error::Configuration(format!("{context}\n{message}")),
            Error::DescriptorSealed(name) => Error::DescriptorSealed(format!("{name} ({context})")),
            Error::Argument { parameter, message } => Error::Argument {
                parameter,
                message: format!("{context}\n{message}"),
            },
            other => Error::TypeAssembly {
                message: context,
                source: Box::new(other),
            },
        }
    }
}

fn assembly_context(type_name: &str, participants: &[String]) -> String {
    let configured = if participants.is_empty() {
        "<none>".to_string()
    } else {
        participants
            .iter()
            .map(|name| format!("'{name}'"))
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!(
        "Code generation for requested type '{type_name}' failed. Configured participants: {configured}."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participants() -> Vec<String> {
        vec!["Mixins".to_string(), "Logging".to_string()]
    }

    #[test]
    fn test_wrap_keeps_invalid_operation_variant() {
        let err = invalid_operation!("boom").with_assembly_context("App.Base", &participants());
        match err {
            Error::InvalidOperation(message) => {
                assert!(message.contains("App.Base"));
                assert!(message.contains("'Mixins', 'Logging'"));
                assert!(message.ends_with("boom"));
            }
            other => panic!("unexpected variant {other:?}"),
        }
    }

    #[test]
    fn test_wrap_keeps_argument_parameter() {
        let err = argument_error!("getter", "belongs to another type")
            .with_assembly_context("App.Base", &participants());
        match err {
            Error::Argument { parameter, message } => {
                assert_eq!(parameter, "getter");
                assert!(message.contains("belongs to another type"));
            }
            other => panic!("unexpected variant {other:?}"),
        }
    }

    #[test]
    fn test_wrap_falls_back_to_generic_wrapper() {
        let err = Error::RecursionLimit(64).with_assembly_context("App.Base", &[]);
        match err {
            Error::TypeAssembly { message, source } => {
                assert!(message.contains("<none>"));
                assert!(matches!(*source, Error::RecursionLimit(64)));
            }
            other => panic!("unexpected variant {other:?}"),
        }
    }

    #[test]
    fn test_not_supported_macro_format() {
        let err = not_supported!("cannot override {}", "Sealed");
        assert_eq!(err.to_string(), "cannot override Sealed");
    }
}
