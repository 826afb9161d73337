//! Process control for a native debugger: launching or attaching to a process under `ptrace`,
//! resuming it, waiting for it to change state and releasing it safely when the session ends.

#[cfg(unix)]
pub mod error;
#[cfg(unix)]
pub mod event;
#[cfg(unix)]
pub mod pipe;

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(unix)]
pub use error::Error;
#[cfg(unix)]
pub use event::{ProcessState, StopCategory, StopOutcome};
#[cfg(unix)]
pub use pipe::Pipe;
#[cfg(unix)]
pub use nix::unistd::Pid;

#[cfg(target_os = "linux")]
pub use crate::linux::Process;
