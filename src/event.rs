//! Decoding of wait statuses into stop outcomes.

use crate::Error;
use nix::sys::{signal::Signal, wait::WaitStatus};
use std::fmt;

/// The run state of a traced process as last observed through [`crate::Process`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProcessState {
    /// No wait has resolved the state yet.
    Unknown,
    /// The process was resumed and has not been waited on since.
    Running,
    /// The process is stopped and waiting for its tracer.
    Stopped,
    /// The process exited normally.
    Exited,
    /// The process was killed by a signal.
    Terminated,
}

impl ProcessState {
    /// Returns true if the process is gone and its pid has been reaped.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exited | Self::Terminated)
    }
}

/// The kind of state change reported by a wait.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StopCategory {
    /// The process exited; the code is its exit status.
    Exited,
    /// The process was terminated; the code is the terminating signal.
    Terminated,
    /// The process stopped; the code is the stopping signal.
    Stopped,
    /// The process was continued; the code is `SIGCONT`.
    Continued,
}

impl StopCategory {
    /// Returns the process state implied by this category.
    pub fn state(&self) -> ProcessState {
        match self {
            Self::Exited => ProcessState::Exited,
            Self::Terminated => ProcessState::Terminated,
            Self::Stopped => ProcessState::Stopped,
            Self::Continued => ProcessState::Running,
        }
    }
}

/// Why a wait on the traced process returned.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StopOutcome {
    /// What kind of state change happened.
    pub category: StopCategory,
    /// The exit status for [`StopCategory::Exited`], otherwise the signal number.
    pub code: i32,
}

impl StopOutcome {
    /// Decodes a raw status as filled in by `waitpid(2)`. Returns `None` for statuses that match
    /// none of the known shapes.
    pub fn from_raw(status: i32) -> Option<Self> {
        let (category, code) = if libc::WIFEXITED(status) {
            (StopCategory::Exited, libc::WEXITSTATUS(status))
        } else if libc::WIFSIGNALED(status) {
            (StopCategory::Terminated, libc::WTERMSIG(status))
        } else if libc::WIFSTOPPED(status) {
            (StopCategory::Stopped, libc::WSTOPSIG(status))
        } else if libc::WIFCONTINUED(status) {
            (StopCategory::Continued, libc::SIGCONT)
        } else {
            return None;
        };

        Some(Self { category, code })
    }
}

impl TryFrom<WaitStatus> for StopOutcome {
    type Error = Error;

    fn try_from(status: WaitStatus) -> Result<Self, Self::Error> {
        let (category, code) = match status {
            WaitStatus::Exited(_, code) => (StopCategory::Exited, code),
            WaitStatus::Signaled(_, signal, _) => (StopCategory::Terminated, signal as i32),
            WaitStatus::Stopped(_, signal) => (StopCategory::Stopped, signal as i32),
            #[cfg(any(target_os = "linux", target_os = "android"))]
            WaitStatus::PtraceEvent(_, signal, _) => (StopCategory::Stopped, signal as i32),
            #[cfg(any(target_os = "linux", target_os = "android"))]
            WaitStatus::PtraceSyscall(_) => (StopCategory::Stopped, Signal::SIGTRAP as i32),
            WaitStatus::Continued(_) => (StopCategory::Continued, Signal::SIGCONT as i32),
            WaitStatus::StillAlive => {
                return Err(Error::InvalidArgument(
                    "wait status carries no state change".to_string(),
                ));
            }
        };

        Ok(Self { category, code })
    }
}

impl fmt::Display for StopOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.category {
            StopCategory::Exited => write!(f, "exited with status {}", self.code),
            StopCategory::Terminated => write!(f, "terminated with signal {}", self.code),
            StopCategory::Stopped => write!(f, "stopped with signal {}", self.code),
            StopCategory::Continued => write!(f, "continued with signal {}", self.code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::Pid;

    #[test]
    fn exit_status_is_decoded() {
        let outcome = StopOutcome::from_raw(7 << 8).unwrap();

        assert_eq!(outcome.category, StopCategory::Exited);
        assert_eq!(outcome.code, 7);
    }

    #[test]
    fn stop_signal_is_decoded() {
        let outcome = StopOutcome::from_raw((19 << 8) | 0x7f).unwrap();

        assert_eq!(outcome.category, StopCategory::Stopped);
        assert_eq!(outcome.code, 19);
    }

    #[test]
    fn terminating_signal_is_decoded() {
        let outcome = StopOutcome::from_raw(libc::SIGKILL).unwrap();

        assert_eq!(outcome.category, StopCategory::Terminated);
        assert_eq!(outcome.code, libc::SIGKILL);

        // The core dump bit does not change the signal.
        let outcome = StopOutcome::from_raw(libc::SIGSEGV | 0x80).unwrap();

        assert_eq!(outcome.category, StopCategory::Terminated);
        assert_eq!(outcome.code, libc::SIGSEGV);
    }

    #[test]
    fn continued_status_gets_its_own_category() {
        let outcome = StopOutcome::from_raw(0xffff).unwrap();

        assert_eq!(outcome.category, StopCategory::Continued);
        assert_eq!(outcome.code, libc::SIGCONT);
        assert_eq!(outcome.category.state(), ProcessState::Running);
    }

    #[test]
    fn realtime_stop_signal_stays_numeric() {
        let signal = 40;
        let outcome = StopOutcome::from_raw((signal << 8) | 0x7f).unwrap();

        assert_eq!(outcome.category, StopCategory::Stopped);
        assert_eq!(outcome.code, signal);
    }

    #[test]
    fn decoded_wait_status_matches_raw_decoding() {
        let pid = Pid::from_raw(1234);

        for raw in [3 << 8, libc::SIGTERM, (libc::SIGTRAP << 8) | 0x7f] {
            let status = WaitStatus::from_raw(pid, raw).unwrap();

            assert_eq!(
                StopOutcome::try_from(status).unwrap(),
                StopOutcome::from_raw(raw).unwrap(),
            );
        }
    }

    #[test]
    fn ptrace_syscall_stop_is_a_trap() {
        let outcome = StopOutcome::try_from(WaitStatus::PtraceSyscall(Pid::from_raw(1))).unwrap();

        assert_eq!(outcome.category, StopCategory::Stopped);
        assert_eq!(outcome.code, libc::SIGTRAP);
    }

    #[test]
    fn still_alive_has_no_outcome() {
        assert!(matches!(
            StopOutcome::try_from(WaitStatus::StillAlive),
            Err(Error::InvalidArgument(_)),
        ));
    }

    #[test]
    fn outcomes_render_numerically() {
        let exited = StopOutcome {
            category: StopCategory::Exited,
            code: 3,
        };
        let stopped = StopOutcome {
            category: StopCategory::Stopped,
            code: 5,
        };
        let terminated = StopOutcome {
            category: StopCategory::Terminated,
            code: 9,
        };

        assert_eq!(exited.to_string(), "exited with status 3");
        assert_eq!(stopped.to_string(), "stopped with signal 5");
        assert_eq!(terminated.to_string(), "terminated with signal 9");
    }
}
