use std::fmt::{Debug, Display, Write};
use std::{borrow::Cow, panic::Location};

use serde::{ser::SerializeStruct, Deserialize, Serialize};
use strum_macros::IntoStaticStr;

/// An external command could not be found, could not be started, or exited unsuccessfully.
#[derive(Debug, Eq, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessError {
    #[error("Failed to find required binary '{binary}'")]
    MissingBinary { binary: &'static str },
    #[error("Failed to execute '{binary}'")]
    CommandCouldNotExecute { binary: &'static str },
    #[error("Command '{binary}' failed: {explanation}")]
    CommandFailed {
        binary: &'static str,
        explanation: String,
    },
}

/// A failure deliberately triggered through mock fault injection.
#[derive(Debug, Eq, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum InducedError {
    #[error("discoverTargets induced error")]
    Discovery,
    #[error("getInitiators induced error")]
    Initiator,
    #[error("NVMe TCP login induced error")]
    TcpLogin,
    #[error("NVMe FC login induced error")]
    FcLogin,
    #[error("NVMe logout induced error")]
    Logout,
    #[error("getSessions induced error")]
    GetSessions,
    #[error("listNVMeDeviceAndNamespace induced error")]
    DeviceAndNamespace,
    #[error("listNVMeNamespaceID induced error")]
    NamespaceId,
    #[error("getNVMeDeviceData induced error")]
    DeviceData,
}

/// A value required for an otherwise valid record could not be determined.
#[derive(Debug, Eq, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionError {
    #[error("Failed to resolve namespace ID for device '{device}'")]
    NamespaceId { device: String },
    #[error("Failed to read initiator name file '{path}'")]
    InitiatorNameFile { path: String },
    #[error("Failed to read Fibre Channel host information")]
    FcHostInfo,
}

/// Caller provided input that cannot be turned into a command.
#[derive(Debug, Eq, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum InvalidInputError {
    #[error("Fibre Channel target '{nqn}' has no host address")]
    MissingHostAddress { nqn: String },
}

/// Each variant of `ErrorKind` corresponds to a different category of error.
#[derive(Debug, Eq, thiserror::Error, IntoStaticStr, PartialEq)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    /// The nvme tool (or the chroot wrapper) failed.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// Synthetic failure produced by the mock initiator.
    #[error(transparent)]
    Induced(#[from] InducedError),

    /// A field of an otherwise valid record could not be determined.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    InvalidInput(#[from] InvalidInputError),
}

#[derive(Debug)]
struct InitiatorErrorInner {
    kind: ErrorKind,
    location: &'static Location<'static>,
    source: Option<anyhow::Error>,
    context: Vec<(Cow<'static, str>, &'static Location<'static>)>,
}

pub struct InitiatorError(Box<InitiatorErrorInner>);
impl InitiatorError {
    #[track_caller]
    pub fn new(kind: impl Into<ErrorKind>) -> Self {
        InitiatorError(Box::new(InitiatorErrorInner {
            kind: kind.into(),
            location: Location::caller(),
            source: None,
            context: Vec::new(),
        }))
    }

    #[track_caller]
    pub fn with_source(kind: impl Into<ErrorKind>, source: anyhow::Error) -> Self {
        InitiatorError(Box::new(InitiatorErrorInner {
            kind: kind.into(),
            location: Location::caller(),
            source: Some(source),
            context: Vec::new(),
        }))
    }

    /// Returns a reference to the inner ErrorKind.
    pub fn kind(&self) -> &ErrorKind {
        &self.0.kind
    }

    /// Returns true when this error was produced by mock fault injection.
    pub fn is_induced(&self) -> bool {
        matches!(self.0.kind, ErrorKind::Induced(_))
    }
}

pub trait ReportError<T, K> {
    /// Convert this error into a structured InitiatorError.
    fn structured(self, kind: K) -> Result<T, InitiatorError>;
}

impl<T, K> ReportError<T, K> for Option<T>
where
    K: Into<ErrorKind>,
{
    #[track_caller]
    fn structured(self, kind: K) -> Result<T, InitiatorError> {
        match self {
            Some(t) => Ok(t),
            None => Err(InitiatorError::new(kind)),
        }
    }
}

impl<T, E, K> ReportError<T, K> for Result<T, E>
where
    E: Into<anyhow::Error>,
    K: Into<ErrorKind>,
{
    #[track_caller]
    fn structured(self, kind: K) -> Result<T, InitiatorError> {
        match self {
            Ok(o) => Ok(o),
            Err(e) => Err(InitiatorError::with_source(kind, e.into())),
        }
    }
}

pub trait InitiatorResultExt<T> {
    /// Attach a context message to the error.
    fn message(self, context: impl Into<Cow<'static, str>>) -> Result<T, InitiatorError>;
}
impl<T> InitiatorResultExt<T> for Result<T, InitiatorError> {
    #[track_caller]
    fn message(mut self, context: impl Into<Cow<'static, str>>) -> Result<T, InitiatorError> {
        if let Err(ref mut e) = self {
            e.0.context.push((context.into(), Location::caller()));
        }
        self
    }
}

impl Serialize for InitiatorError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("initiator-error", 5)?;
        state.serialize_field("message", &self.0.kind.to_string())?;
        match self.0.kind {
            ErrorKind::Process(ref e) => state.serialize_field("error", e)?,
            ErrorKind::Induced(ref e) => state.serialize_field("error", e)?,
            ErrorKind::Resolution(ref e) => state.serialize_field("error", e)?,
            ErrorKind::InvalidInput(ref e) => state.serialize_field("error", e)?,
        }
        state.serialize_field("category", <&str>::from(&self.0.kind))?;
        state.serialize_field(
            "location",
            &format!("{}:{}", self.0.location.file(), self.0.location.line()),
        )?;
        match self.0.source {
            Some(ref e) => state.serialize_field("cause", &Some(format!("{:?}", e)))?,
            None => state.serialize_field("cause", &None::<String>)?,
        }
        state.end()
    }
}

impl Display for InitiatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.context.last() {
            Some((context, _)) => write!(f, "{}: {}", context, self.0.kind),
            None => write!(f, "{}", self.0.kind),
        }
    }
}

impl Debug for InitiatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} at {}:{}",
            self.0.kind,
            self.0.location.file(),
            self.0.location.line()
        )?;

        if !self.0.context.is_empty() {
            writeln!(f, "\n\nContext:")?;
            for (i, (context, location)) in self.0.context.iter().enumerate() {
                for (j, line) in context.split('\n').enumerate() {
                    if j == 0 {
                        write!(f, "{: >5}: ", i)?;
                    } else {
                        f.write_str("\n       ")?;
                    }
                    f.write_str(line)?;
                }
                writeln!(f, " at {}:{}", location.file(), location.line())?;
            }
        }

        if let Some(ref source) = self.0.source {
            writeln!(f, "\n\nCaused by:")?;
            let mut index = 0;
            let mut source: Option<&dyn std::error::Error> = Some(source.as_ref());
            while let Some(e) = source {
                for (i, line) in e.to_string().split('\n').enumerate() {
                    if i == 0 {
                        write!(f, "{: >5}: ", index)?;
                    } else {
                        f.write_str("\n       ")?;
                    }
                    f.write_str(line)?;
                }
                f.write_char('\n')?;
                source = e.source();
                index += 1;
            }
        }
        Ok(())
    }
}
