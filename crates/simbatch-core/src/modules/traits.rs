use crate::domain::{ProcessOutcome, ProcessSpec, SimbatchResult};

/// Executes one child process and reports how it ended.
///
/// `Err` is reserved for failures to start the process at all; a child that
/// ran and exited nonzero is an `Ok` outcome the caller has to inspect.
pub trait ProcessRunner {
    fn run(&self, spec: &ProcessSpec) -> SimbatchResult<ProcessOutcome>;
}

impl<T> ProcessRunner for &T
where
    T: ProcessRunner + ?Sized,
{
    fn run(&self, spec: &ProcessSpec) -> SimbatchResult<ProcessOutcome> {
        (**self).run(spec)
    }
}
