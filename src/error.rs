//! # Dispatch Error Types
//!
//! Structured error handling for the dispatch engine using thiserror.
//!
//! The taxonomy follows the failure points of a call's life:
//!
//! - [`TransportError`] - the bus cannot bind, connect, send or receive
//! - [`EnvelopeError`] - a payload could not be encoded or decoded
//! - [`ResolutionError`] - a function identifier does not map to a callable
//! - [`ExecutionError`] - the resolved function itself failed
//! - [`DispatchError`] - what an eager caller observes
//! - [`ConfigurationError`] - invalid or unreadable configuration
//! - [`DaemonError`] - fatal worker daemon startup failures

use thiserror::Error;

/// Bus connection failures.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to create {kind} socket: {source}")]
    SocketCreate {
        kind: &'static str,
        #[source]
        source: zmq::Error,
    },

    #[error("Failed to set socket option {option}: {source}")]
    SocketOption {
        option: &'static str,
        #[source]
        source: zmq::Error,
    },

    #[error("Failed to bind to {endpoint}: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: zmq::Error,
    },

    #[error("Failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: zmq::Error,
    },

    #[error("No connected peer accepted the message")]
    NoPeers,

    #[error("No worker endpoints configured")]
    NoEndpoints,

    #[error("Send failed: {source}")]
    Send {
        #[source]
        source: zmq::Error,
    },

    #[error("Receive failed: {source}")]
    Receive {
        #[source]
        source: zmq::Error,
    },

    #[error("Poll failed: {source}")]
    Poll {
        #[source]
        source: zmq::Error,
    },
}

impl TransportError {
    pub fn socket_create(kind: &'static str, source: zmq::Error) -> Self {
        Self::SocketCreate { kind, source }
    }

    pub fn socket_option(option: &'static str, source: zmq::Error) -> Self {
        Self::SocketOption { option, source }
    }

    pub fn bind(endpoint: impl Into<String>, source: zmq::Error) -> Self {
        Self::Bind {
            endpoint: endpoint.into(),
            source,
        }
    }

    pub fn connect(endpoint: impl Into<String>, source: zmq::Error) -> Self {
        Self::Connect {
            endpoint: endpoint.into(),
            source,
        }
    }

    /// Map a send-side zmq error, folding `EAGAIN` into [`TransportError::NoPeers`]
    pub fn from_send(source: zmq::Error) -> Self {
        match source {
            zmq::Error::EAGAIN => Self::NoPeers,
            source => Self::Send { source },
        }
    }

    pub fn receive(source: zmq::Error) -> Self {
        Self::Receive { source }
    }

    pub fn poll(source: zmq::Error) -> Self {
        Self::Poll { source }
    }
}

/// Envelope encoding and decoding failures (the deserialization error class).
#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("Malformed envelope: {message}")]
    Malformed { message: String },

    #[error("Envelope has an empty function identifier")]
    EmptyFunctionId,

    #[error("Invalid deferral value {value}: must be a finite, non-negative number of seconds")]
    InvalidDeferral { value: f64 },

    #[error("Envelope serialization failed: {message}")]
    Serialization { message: String },
}

impl EnvelopeError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}

/// Function identifier resolution failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Invalid function identifier '{function_id}': expected <module.path>.<member>")]
    InvalidIdentifier { function_id: String },

    #[error("Module not found: {module}")]
    ModuleNotFound { module: String },

    #[error("Module {module} has no member named {member}")]
    MemberNotFound { module: String, member: String },

    #[error("Module {module} failed to load: {reason}")]
    ModuleLoadFailed { module: String, reason: String },
}

impl ResolutionError {
    pub fn invalid_identifier(function_id: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            function_id: function_id.into(),
        }
    }

    pub fn module_not_found(module: impl Into<String>) -> Self {
        Self::ModuleNotFound {
            module: module.into(),
        }
    }

    pub fn member_not_found(module: impl Into<String>, member: impl Into<String>) -> Self {
        Self::MemberNotFound {
            module: module.into(),
            member: member.into(),
        }
    }

    pub fn module_load_failed(module: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ModuleLoadFailed {
            module: module.into(),
            reason: reason.into(),
        }
    }
}

/// Failures raised by a task function.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Task failed: {message}")]
    Failed { message: String },

    #[error("Invalid task arguments: {message}")]
    InvalidArguments { message: String },

    #[error("Task panicked: {message}")]
    Panicked { message: String },
}

impl ExecutionError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
        }
    }

    pub fn panicked(message: impl Into<String>) -> Self {
        Self::Panicked {
            message: message.into(),
        }
    }
}

/// Errors a producer can observe from `enqueue`.
///
/// Outside eager mode only [`DispatchError::Envelope`] and
/// [`DispatchError::InvalidArgument`] are ever returned; every other failure is
/// logged and swallowed.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error("Argument {name} could not be converted to a message value: {message}")]
    InvalidArgument { name: String, message: String },
}

/// Configuration loading and validation failures.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Failed to read configuration file {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML in {path}: {message}")]
    InvalidYaml { path: String, message: String },

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigurationError {
    pub fn file_read(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_yaml(path: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidYaml {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Fatal worker daemon errors.
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Startup hook {hook} failed: {source}")]
    StartupHook {
        hook: String,
        #[source]
        source: DispatchError,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Failed to spawn subworker {worker_id}: {source}")]
    SubworkerSpawn {
        worker_id: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Receive loop aborted: {message}")]
    LoopAborted { message: String },
}

pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

/// Text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
