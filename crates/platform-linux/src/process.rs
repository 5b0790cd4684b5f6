//! Process inspection from procfs.

use std::path::PathBuf;

use idelens_platform_core::{
    ProcessDescription, ProcessId, ProcessLookupError, ProcessResolver, WindowHandle,
};

/// Describes processes through `/proc/<pid>/stat`.
///
/// Window ownership cannot be resolved without a window system backend, so
/// [`ProcessResolver::resolve`] always fails with [`ProcessLookupError::Other`].
#[derive(Debug, Clone)]
pub struct ProcfsProcessResolver {
    proc_root: PathBuf,
}

impl ProcfsProcessResolver {
    pub fn new() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
        }
    }

    pub fn with_root(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }
}

impl Default for ProcfsProcessResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Parsed subset of `/proc/<pid>/stat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcStat {
    pub comm: String,
    pub state: char,
}

/// Parse `/proc/<pid>/stat`. The command name sits in parentheses and may
/// itself contain spaces or parentheses, so the last `)` ends it.
pub fn parse_stat(content: &str) -> Option<ProcStat> {
    let open = content.find('(')?;
    let close = content.rfind(')')?;
    if close <= open {
        return None;
    }
    let comm = content[open + 1..close].to_string();
    let state = content[close + 1..].trim_start().chars().next()?;
    Some(ProcStat { comm, state })
}

impl ProcessResolver for ProcfsProcessResolver {
    fn resolve(&self, window: WindowHandle) -> Result<ProcessId, ProcessLookupError> {
        Err(ProcessLookupError::Other(format!(
            "cannot resolve the owner of window {window} without a window system backend"
        )))
    }

    fn describe(&self, pid: ProcessId) -> Result<ProcessDescription, ProcessLookupError> {
        let stat_path = self.proc_root.join(pid.0.to_string()).join("stat");
        let content = match std::fs::read_to_string(&stat_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProcessLookupError::NotFound)
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(ProcessLookupError::AccessDenied)
            }
            Err(e) => return Err(ProcessLookupError::Other(e.to_string())),
        };
        let stat = parse_stat(&content).ok_or_else(|| {
            ProcessLookupError::Other(format!("unparseable {}", stat_path.display()))
        })?;

        // Zombie or dead: the process is gone even though the entry remains.
        if matches!(stat.state, 'Z' | 'X' | 'x') {
            return Err(ProcessLookupError::Terminated);
        }
        check_signal_access(pid)?;

        Ok(ProcessDescription {
            name: stat.comm,
            is_responding: !matches!(stat.state, 'T' | 't'),
            has_exited: false,
        })
    }
}

/// Probe with signal 0: no signal is sent, only existence and permission are checked.
#[cfg(unix)]
fn check_signal_access(pid: ProcessId) -> Result<(), ProcessLookupError> {
    let Ok(raw) = libc::pid_t::try_from(pid.0) else {
        return Err(ProcessLookupError::NotFound);
    };
    // SAFETY: kill with signal 0 performs permission and existence checks only.
    let rc = unsafe { libc::kill(raw, 0) };
    if rc == 0 {
        return Ok(());
    }
    match std::io::Error::last_os_error().raw_os_error() {
        Some(libc::EPERM) => Err(ProcessLookupError::AccessDenied),
        Some(libc::ESRCH) => Err(ProcessLookupError::Terminated),
        Some(code) => Err(ProcessLookupError::Other(format!("kill(0) failed: errno {code}"))),
        None => Err(ProcessLookupError::Other("kill(0) failed".to_string())),
    }
}

#[cfg(not(unix))]
fn check_signal_access(_pid: ProcessId) -> Result<(), ProcessLookupError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comm_with_spaces_and_parens() {
        let stat = parse_stat("1234 (Web Content (x)) S 1 1234 1234 0 -1").unwrap();
        assert_eq!(stat.comm, "Web Content (x)");
        assert_eq!(stat.state, 'S');
        assert!(parse_stat("garbage").is_none());
    }

    #[test]
    fn missing_pid_is_not_found() {
        let resolver = ProcfsProcessResolver::with_root("/nonexistent-procfs-root");
        assert_eq!(
            resolver.describe(ProcessId(42)),
            Err(ProcessLookupError::NotFound)
        );
    }

    #[test]
    fn window_ownership_is_unsupported() {
        let resolver = ProcfsProcessResolver::new();
        assert!(matches!(
            resolver.resolve(WindowHandle(1)),
            Err(ProcessLookupError::Other(_))
        ));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn describes_the_current_process() {
        let pid = ProcessId(std::process::id());
        let description = ProcfsProcessResolver::new().describe(pid).unwrap();
        assert!(!description.name.is_empty());
        assert!(description.is_responding);
    }
}
