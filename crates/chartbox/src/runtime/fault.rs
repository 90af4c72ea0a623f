//! Runtime faults raised while a snippet executes

use std::fmt;

use thiserror::Error;

/// Exception classes a snippet can raise, catch and name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExcKind {
    Exception,
    ValueError,
    TypeError,
    ZeroDivisionError,
    IndexError,
    KeyError,
    NameError,
    AttributeError,
    ImportError,
    RuntimeError,
    MemoryError,
    RecursionError,
    OverflowError,
}

impl ExcKind {
    /// Every class, in the order they are bound as builtins
    pub const ALL: &'static [ExcKind] = &[
        ExcKind::Exception,
        ExcKind::ValueError,
        ExcKind::TypeError,
        ExcKind::ZeroDivisionError,
        ExcKind::IndexError,
        ExcKind::KeyError,
        ExcKind::NameError,
        ExcKind::AttributeError,
        ExcKind::ImportError,
        ExcKind::RuntimeError,
        ExcKind::MemoryError,
        ExcKind::RecursionError,
        ExcKind::OverflowError,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ExcKind::Exception => "Exception",
            ExcKind::ValueError => "ValueError",
            ExcKind::TypeError => "TypeError",
            ExcKind::ZeroDivisionError => "ZeroDivisionError",
            ExcKind::IndexError => "IndexError",
            ExcKind::KeyError => "KeyError",
            ExcKind::NameError => "NameError",
            ExcKind::AttributeError => "AttributeError",
            ExcKind::ImportError => "ImportError",
            ExcKind::RuntimeError => "RuntimeError",
            ExcKind::MemoryError => "MemoryError",
            ExcKind::RecursionError => "RecursionError",
            ExcKind::OverflowError => "OverflowError",
        }
    }

    pub fn from_name(name: &str) -> Option<ExcKind> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name)
    }

    /// Whether an `except self:` clause catches `raised`
    pub fn catches(&self, raised: ExcKind) -> bool {
        match self {
            ExcKind::Exception => true,
            ExcKind::RuntimeError => matches!(raised, ExcKind::RuntimeError | ExcKind::RecursionError),
            kind => *kind == raised,
        }
    }
}

impl fmt::Display for ExcKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A raised exception
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct Exception {
    pub kind: ExcKind,
    pub message: String,
}

/// Why evaluation stopped abnormally
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    /// Catchable by `try`/`except`
    #[error(transparent)]
    Raised(#[from] Exception),

    /// The watchdog raised the interrupt flag; never catchable
    #[error("execution interrupted")]
    Interrupted,
}

impl Fault {
    pub fn new(kind: ExcKind, message: impl Into<String>) -> Self {
        Fault::Raised(Exception {
            kind,
            message: message.into(),
        })
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ExcKind::TypeError, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new(ExcKind::ValueError, message)
    }

    pub fn index_error(message: impl Into<String>) -> Self {
        Self::new(ExcKind::IndexError, message)
    }

    pub fn key_error(message: impl Into<String>) -> Self {
        Self::new(ExcKind::KeyError, message)
    }

    pub fn name_error(name: &str) -> Self {
        Self::new(ExcKind::NameError, format!("name '{name}' is not defined"))
    }

    pub fn attribute_error(type_name: &str, attr: &str) -> Self {
        Self::new(
            ExcKind::AttributeError,
            format!("'{type_name}' object has no attribute '{attr}'"),
        )
    }

    pub fn zero_division(message: impl Into<String>) -> Self {
        Self::new(ExcKind::ZeroDivisionError, message)
    }

    pub fn overflow() -> Self {
        Self::new(ExcKind::OverflowError, "integer overflow")
    }

    pub fn import_error(message: impl Into<String>) -> Self {
        Self::new(ExcKind::ImportError, message)
    }

    pub fn memory_error(message: impl Into<String>) -> Self {
        Self::new(ExcKind::MemoryError, message)
    }

    /// Kind of the exception, if this is one
    pub fn kind(&self) -> Option<ExcKind> {
        match self {
            Fault::Raised(exc) => Some(exc.kind),
            Fault::Interrupted => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_kind_and_message() {
        let fault = Fault::value_error("bad value");
        assert_eq!(fault.to_string(), "ValueError: bad value");
        assert_eq!(Fault::Interrupted.to_string(), "execution interrupted");
    }

    #[test]
    fn exception_catches_everything() {
        for kind in ExcKind::ALL {
            assert!(ExcKind::Exception.catches(*kind));
        }
        assert!(!ExcKind::ValueError.catches(ExcKind::TypeError));
        assert!(ExcKind::RuntimeError.catches(ExcKind::RecursionError));
    }

    #[test]
    fn names_round_trip() {
        for kind in ExcKind::ALL {
            assert_eq!(ExcKind::from_name(kind.name()), Some(*kind));
        }
        assert_eq!(ExcKind::from_name("SystemExit"), None);
    }
}
