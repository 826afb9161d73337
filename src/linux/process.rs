use crate::event::{ProcessState, StopOutcome};
use crate::pipe::Pipe;
use crate::Error;
use nix::{
    errno::Errno,
    sys::{
        ptrace,
        signal::{kill, Signal},
        wait::{waitpid, WaitStatus},
    },
    unistd::{fork, ForkResult, Pid},
};
use std::ffi::{CString, OsStr};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::ptr;
use tracing::{debug, info};

/// Exit status used by a forked child that could not become the requested program.
const CHILD_FAILURE: i32 = 127;

/// A process under the control of this session, either launched or attached to.
///
/// Dropping a `Process` releases it: a traced process is detached and continued, and a process
/// that was launched by this session is killed and reaped.
#[derive(Debug)]
pub struct Process {
    pid: Pid,
    state: ProcessState,
    is_traced: bool,
    owns_lifetime: bool,
}

impl Process {
    /// Launches the executable at `path`, searched for in `PATH` like a shell would.
    ///
    /// When `trace` is set the new process is traced from its first instruction and this
    /// function returns once it has stopped after `exec`.
    pub fn launch<P: AsRef<Path>>(path: P, trace: bool) -> Result<Self, Error> {
        Self::launch_with_args(path, std::iter::empty::<&OsStr>(), trace)
    }

    /// Like [`Process::launch`], passing `args` to the new program after `argv[0]`.
    pub fn launch_with_args<P, I, S>(path: P, args: I, trace: bool) -> Result<Self, Error>
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let path = path.as_ref();
        let program = to_cstring(path.as_os_str())?;
        let mut argv = vec![program.clone()];

        for arg in args {
            argv.push(to_cstring(arg.as_ref())?);
        }

        let mut argv_ptrs: Vec<*const libc::c_char> =
            argv.iter().map(|arg| arg.as_ptr()).collect();
        argv_ptrs.push(ptr::null());

        // The child must not allocate, so its failure message is prepared here.
        let exec_failure = format!("failed to execute {}", path.display()).into_bytes();

        let mut channel = Pipe::new(true)?;

        // SAFETY: everything the child touches was allocated before the fork, and the child only
        // calls ptrace, write, exec and _exit before leaving this process image.
        let fork_result = unsafe { fork() }.map_err(Error::acquisition("fork failed"))?;

        let pid = match fork_result {
            ForkResult::Child => {
                channel.close_read();

                if trace {
                    if let Err(errno) = ptrace::traceme() {
                        exit_with_error(&mut channel, b"tracing failed", errno);
                    }
                }

                // SAFETY: `argv_ptrs` is null-terminated and points into `argv`, which outlives
                // the call.
                unsafe { libc::execvp(program.as_ptr(), argv_ptrs.as_ptr()) };

                exit_with_error(&mut channel, &exec_failure, Errno::last());
            }
            ForkResult::Parent { child } => child,
        };

        channel.close_write();

        let message = match channel.read() {
            Ok(message) => message,
            Err(e) => {
                let _ = kill(pid, Signal::SIGKILL);
                let _ = waitpid(pid, None);

                return Err(e);
            }
        };

        if !message.is_empty() {
            let _ = waitpid(pid, None);

            return Err(Error::Execution(String::from_utf8_lossy(&message).into_owned()));
        }

        let mut process = Self {
            pid,
            state: ProcessState::Unknown,
            is_traced: trace,
            owns_lifetime: true,
        };

        info!(pid = pid.as_raw(), path = %path.display(), trace, "launched process");

        if trace {
            process.wait()?;
        }

        Ok(process)
    }

    /// Attaches to the running process with the given process ID.
    ///
    /// Attaching stops the process, but that stop is not consumed here: the state stays
    /// [`ProcessState::Unknown`] until [`Process::wait`] is called.
    pub fn attach(pid: Pid) -> Result<Self, Error> {
        if pid.as_raw() <= 0 {
            return Err(Error::InvalidArgument(format!("invalid process ID {pid}")));
        }

        ptrace::attach(pid).map_err(Error::acquisition("could not attach to process"))?;

        info!(pid = pid.as_raw(), "attached to process");

        Ok(Self {
            pid,
            state: ProcessState::Unknown,
            is_traced: true,
            owns_lifetime: false,
        })
    }

    /// Returns the process ID.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Returns the state as of the last resume or wait.
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Returns true if this session holds trace authority over the process.
    pub fn is_traced(&self) -> bool {
        self.is_traced
    }

    /// Returns true if the process was launched by this session and dies with it.
    pub fn owns_lifetime(&self) -> bool {
        self.owns_lifetime
    }

    /// Resumes the execution of the traced process.
    pub fn resume(&mut self) -> Result<(), Error> {
        if !self.is_traced {
            return Err(Error::InvalidArgument(format!("process {} is not traced", self.pid)));
        }

        // The pid has been reaped and may already belong to someone else.
        if self.state.is_terminal() {
            return Err(Error::Operation {
                context: "could not resume the process",
                source: Errno::ESRCH,
            });
        }

        ptrace::cont(self.pid, None).map_err(Error::operation("could not resume the process"))?;
        self.state = ProcessState::Running;

        debug!(pid = self.pid.as_raw(), "resumed process");

        Ok(())
    }

    /// Blocks until the process stops, exits or is terminated.
    pub fn wait(&mut self) -> Result<StopOutcome, Error> {
        let status = waitpid(self.pid, None).map_err(Error::operation("waitpid failed"))?;
        let outcome = StopOutcome::try_from(status)?;

        self.state = outcome.category.state();

        debug!(pid = self.pid.as_raw(), %outcome, "process changed state");

        Ok(outcome)
    }

    /// Stops a process that may be running and waits for the stop. Returns false if the process
    /// turned out to be gone.
    fn stop_for_detach(&mut self) -> bool {
        if let Err(e) = kill(self.pid, Signal::SIGSTOP) {
            debug!(pid = self.pid.as_raw(), "could not stop process: {e}");
            return true;
        }

        match waitpid(self.pid, None) {
            Ok(WaitStatus::Exited(..)) => {
                self.state = ProcessState::Exited;
                false
            }
            Ok(WaitStatus::Signaled(..)) => {
                self.state = ProcessState::Terminated;
                false
            }
            Ok(_) => {
                self.state = ProcessState::Stopped;
                true
            }
            Err(e) => {
                debug!(pid = self.pid.as_raw(), "could not wait for stop: {e}");
                true
            }
        }
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        if self.state.is_terminal() {
            return;
        }

        debug!(
            pid = self.pid.as_raw(),
            state = ?self.state,
            owns_lifetime = self.owns_lifetime,
            "releasing process"
        );

        if self.is_traced {
            // A tracee may only be detached while it sits in a trace-stop.
            if matches!(self.state, ProcessState::Running | ProcessState::Unknown)
                && !self.stop_for_detach()
            {
                return;
            }

            if let Err(e) = ptrace::detach(self.pid, None) {
                debug!(pid = self.pid.as_raw(), "could not detach: {e}");
            }

            if let Err(e) = kill(self.pid, Signal::SIGCONT) {
                debug!(pid = self.pid.as_raw(), "could not continue: {e}");
            }
        }

        if self.owns_lifetime {
            if let Err(e) = kill(self.pid, Signal::SIGKILL) {
                debug!(pid = self.pid.as_raw(), "could not kill: {e}");
            }

            if let Err(e) = waitpid(self.pid, None) {
                debug!(pid = self.pid.as_raw(), "could not reap: {e}");
            }
        }
    }
}

fn to_cstring(value: &OsStr) -> Result<CString, Error> {
    CString::new(value.as_bytes()).map_err(|_| {
        Error::InvalidArgument(format!("{value:?} contains a NUL byte"))
    })
}

/// Writes `<prefix>: <description of errno>` into `buffer`, truncating if it does not fit, and
/// returns the length written. Does not allocate.
fn compose_failure(buffer: &mut [u8], prefix: &[u8], errno: Errno) -> usize {
    let parts: [&[u8]; 3] = [prefix, b": ", errno.desc().as_bytes()];
    let mut len = 0;

    for part in parts {
        let take = part.len().min(buffer.len() - len);

        buffer[len..len + take].copy_from_slice(&part[..take]);
        len += take;
    }

    len
}

/// Reports the failure to the parent and ends the forked child without unwinding.
fn exit_with_error(channel: &mut Pipe, prefix: &[u8], errno: Errno) -> ! {
    let mut message = [0u8; 512];
    let len = compose_failure(&mut message, prefix, errno);

    let _ = channel.write(&message[..len]);

    // SAFETY: _exit ends the child at once, without running destructors or atexit handlers
    // inherited from the parent.
    unsafe { libc::_exit(CHILD_FAILURE) }
}
