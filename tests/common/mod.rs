use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;

/// Returns true if `pid` names a process in the process table, zombies included.
pub fn process_exists(pid: Pid) -> bool {
    !matches!(kill(pid, None), Err(Errno::ESRCH))
}

/// Returns the one-letter run state from `/proc/<pid>/stat`.
pub fn process_status(pid: Pid) -> char {
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).unwrap();

    // The command name may contain spaces and parentheses, so skip past the last `)`.
    let index = stat.rfind(')').unwrap() + 2;

    stat[index..].chars().next().unwrap()
}
