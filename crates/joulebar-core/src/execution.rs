use std::fmt;

/// Opaque handle naming a unit of work (a cell, a command line, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkHandle(pub String);

impl WorkHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for WorkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPhase {
    Started,
    Finished,
}

/// "Execution started/finished" signal emitted by whatever runs work units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionEvent {
    pub handle: WorkHandle,
    pub phase: ExecutionPhase,
}

impl ExecutionEvent {
    pub fn started(handle: WorkHandle) -> Self {
        Self {
            handle,
            phase: ExecutionPhase::Started,
        }
    }

    pub fn finished(handle: WorkHandle) -> Self {
        Self {
            handle,
            phase: ExecutionPhase::Finished,
        }
    }
}
