//! Fault detail attached to warnings, errors and termination events

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use std::panic::Location;

/// Exit status used when a panic terminates the process
pub const PANIC_STATUS_CODE: i32 = 101;

/// Status code for faults that do not carry one of their own
pub const DEFAULT_STATUS_CODE: i32 = 1;

/// Description of a failure: what kind it was, what it said and where it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    /// Type or category identifier (e.g. `std::io::Error`, `panic`)
    pub kind: String,
    /// Human-readable message
    pub message: String,
    /// Underlying cause, if any
    pub cause: Option<Box<Fault>>,
    /// Captured backtrace text
    pub backtrace: Option<String>,
    /// Native status code the process should exit with if this fault is fatal
    pub status_code: i32,
}

impl Fault {
    /// Create a new fault with no cause or backtrace
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            cause: None,
            backtrace: None,
            status_code: DEFAULT_STATUS_CODE,
        }
    }

    pub fn with_cause(mut self, cause: Fault) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn with_backtrace(mut self, backtrace: impl Into<String>) -> Self {
        self.backtrace = Some(backtrace.into());
        self
    }

    pub fn with_status_code(mut self, status_code: i32) -> Self {
        self.status_code = status_code;
        self
    }

    /// Build a fault from an error value, following its `source()` chain
    pub fn from_error<E>(err: &E) -> Self
    where
        E: std::error::Error + 'static,
    {
        let mut fault = Fault::new(std::any::type_name::<E>(), err.to_string());
        fault.cause = err.source().map(|source| Box::new(Self::from_source(source)));
        fault
    }

    fn from_source(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut fault = Fault::new("caused by", err.to_string());
        fault.cause = err.source().map(|source| Box::new(Self::from_source(source)));
        fault
    }

    /// Build a fault from a panic payload
    ///
    /// Recognizes a `Fault` passed through `std::panic::panic_any` as well as the
    /// `&str` and `String` payloads produced by `panic!`. Anything else returns
    /// `None`.
    pub fn from_panic_payload(
        payload: &(dyn Any + Send),
        location: Option<&Location<'_>>,
    ) -> Option<Self> {
        if let Some(fault) = payload.downcast_ref::<Fault>() {
            return Some(fault.clone());
        }

        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            return None;
        };

        let message = match location {
            Some(loc) => format!("{} at {}:{}", message, loc.file(), loc.line()),
            None => message,
        };

        let mut fault = Fault::new("panic", message).with_status_code(PANIC_STATUS_CODE);
        let backtrace = Backtrace::force_capture();
        if backtrace.status() == BacktraceStatus::Captured {
            fault.backtrace = Some(backtrace.to_string());
        }
        Some(fault)
    }

    /// Iterate over this fault and its causes, outermost first
    pub fn chain(&self) -> impl Iterator<Item = &Fault> {
        std::iter::successors(Some(self), |fault| fault.cause.as_deref())
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, " ---> {}", cause)?;
        }
        if let Some(backtrace) = &self.backtrace {
            write!(f, "\n{}", backtrace.trim_end())?;
        }
        Ok(())
    }
}

impl From<anyhow::Error> for Fault {
    fn from(err: anyhow::Error) -> Self {
        Fault::from(&err)
    }
}

impl From<&anyhow::Error> for Fault {
    fn from(err: &anyhow::Error) -> Self {
        let mut causes = err.chain().skip(1).collect::<Vec<_>>();
        let mut cause: Option<Box<Fault>> = None;
        while let Some(source) = causes.pop() {
            let mut fault = Fault::new("caused by", source.to_string());
            fault.cause = cause.take();
            cause = Some(Box::new(fault));
        }
        Fault {
            kind: "anyhow::Error".to_string(),
            message: err.to_string(),
            cause,
            backtrace: None,
            status_code: DEFAULT_STATUS_CODE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_fault_display_with_cause() {
        let fault = Fault::new("Outer", "top").with_cause(Fault::new("Inner", "bottom"));
        assert_eq!(fault.to_string(), "Outer: top ---> Inner: bottom");
    }

    #[test]
    fn test_fault_from_io_error() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let fault = Fault::from_error(&err);
        assert!(fault.kind.starts_with("std::io::"));
        assert_eq!(fault.message, "missing file");
        assert_eq!(fault.status_code, DEFAULT_STATUS_CODE);
    }

    #[test]
    fn test_fault_from_anyhow_chain() {
        let result: anyhow::Result<()> = Err(anyhow::anyhow!("disk gone"))
            .context("saving settings")
            .context("shutting down");
        let fault = Fault::from(result.unwrap_err());

        let messages: Vec<&str> = fault.chain().map(|f| f.message.as_str()).collect();
        assert_eq!(messages, vec!["shutting down", "saving settings", "disk gone"]);
    }

    #[test]
    fn test_from_panic_payload_str() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        let fault = Fault::from_panic_payload(payload.as_ref(), None).unwrap();
        assert_eq!(fault.kind, "panic");
        assert_eq!(fault.message, "boom");
        assert_eq!(fault.status_code, PANIC_STATUS_CODE);
    }

    #[test]
    fn test_from_panic_payload_string_with_location() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("bad state"));
        let location = Location::caller();
        let fault = Fault::from_panic_payload(payload.as_ref(), Some(location)).unwrap();
        assert!(fault.message.starts_with("bad state at "));
        assert!(fault.message.contains("fault.rs"));
    }

    #[test]
    fn test_from_panic_payload_fault() {
        let original = Fault::new("Custom", "explicit").with_status_code(7);
        let payload: Box<dyn Any + Send> = Box::new(original.clone());
        let fault = Fault::from_panic_payload(payload.as_ref(), None).unwrap();
        assert_eq!(fault, original);
    }

    #[test]
    fn test_from_panic_payload_unrecognized() {
        let payload: Box<dyn Any + Send> = Box::new(42u32);
        assert!(Fault::from_panic_payload(payload.as_ref(), None).is_none());
    }
}
