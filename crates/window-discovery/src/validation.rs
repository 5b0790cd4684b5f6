//! Owning-process validation for a single window.

use idelens_platform_core::{ProcessId, ProcessLookupError, ProcessResolver, WindowHandle};
use idelens_window_model::{ProcessValidation, ValidationFailure};

/// Whether an executable name is one of the configured targets.
///
/// Comparison ignores ASCII case and a trailing `.exe`.
pub fn is_target_process(name: &str, targets: &[String]) -> bool {
    let stem = strip_exe(name);
    targets
        .iter()
        .any(|t| strip_exe(t).eq_ignore_ascii_case(stem))
}

fn strip_exe(name: &str) -> &str {
    let len = name.len();
    if len > 4 && name.is_char_boundary(len - 4) && name[len - 4..].eq_ignore_ascii_case(".exe") {
        &name[..len - 4]
    } else {
        name
    }
}

/// Resolve and describe the process owning `window`.
///
/// Lookup failures are returned as errors so the caller can log them by
/// category. A process that resolves but has exited is reported as
/// [`ProcessLookupError::Terminated`].
pub fn validate_owner(
    resolver: &dyn ProcessResolver,
    window: WindowHandle,
    targets: &[String],
) -> Result<ProcessValidation, (ProcessId, ProcessLookupError)> {
    let pid = resolver
        .resolve(window)
        .map_err(|e| (ProcessId(0), e))?;
    let description = resolver.describe(pid).map_err(|e| (pid, e))?;
    if description.has_exited {
        return Err((pid, ProcessLookupError::Terminated));
    }
    Ok(ProcessValidation {
        process_id: pid,
        is_target_application: is_target_process(&description.name, targets),
        has_required_access: true,
        is_responding: description.is_responding,
        name: description.name,
        failure: ValidationFailure::None,
    })
}

/// Map a lookup error to its validation failure reason.
pub(crate) fn failure_of(error: &ProcessLookupError) -> ValidationFailure {
    match error {
        ProcessLookupError::NotFound => ValidationFailure::ProcessNotFound,
        ProcessLookupError::Terminated => ValidationFailure::Terminated,
        ProcessLookupError::AccessDenied => ValidationFailure::AccessDenied,
        ProcessLookupError::Other(_) => ValidationFailure::UnexpectedError,
    }
}

/// Log a skipped window at the level its failure category calls for.
pub(crate) fn log_skip(window: WindowHandle, pid: ProcessId, error: &ProcessLookupError) {
    match error {
        ProcessLookupError::NotFound => {}
        ProcessLookupError::Terminated => {
            tracing::debug!(%window, %pid, "Skipping window of terminated process");
        }
        ProcessLookupError::AccessDenied => {
            tracing::warn!(%window, %pid, "Access denied to owning process, skipping window");
        }
        ProcessLookupError::Other(message) => {
            tracing::error!(%window, %pid, error = %message, "Unexpected process validation failure, skipping window");
        }
    }
}

#[cfg(test)]
mod tests {
    use idelens_platform_core::simulated::SimulatedDesktop;

    use super::*;

    fn targets() -> Vec<String> {
        vec!["devenv".to_string()]
    }

    #[test]
    fn target_match_ignores_case_and_extension() {
        assert!(is_target_process("devenv", &targets()));
        assert!(is_target_process("DevEnv.EXE", &targets()));
        assert!(is_target_process("devenv", &["devenv.exe".to_string()]));
        assert!(!is_target_process("devenvx", &targets()));
        assert!(!is_target_process(".exe", &targets()));
    }

    #[test]
    fn ide_window_validates() {
        let desktop = SimulatedDesktop::ide_session();
        let validation = validate_owner(&desktop, WindowHandle(0x1002), &targets()).unwrap();
        assert_eq!(validation.process_id, ProcessId(4200));
        assert!(validation.is_accepted());
    }

    #[test]
    fn access_denied_is_reported_with_pid() {
        let desktop = SimulatedDesktop::ide_session();
        let (pid, err) = validate_owner(&desktop, WindowHandle(0x2000), &targets()).unwrap_err();
        assert_eq!(pid, ProcessId(4));
        assert_eq!(err, ProcessLookupError::AccessDenied);
        assert_eq!(failure_of(&err), ValidationFailure::AccessDenied);
    }

    #[test]
    fn exited_process_counts_as_terminated() {
        let desktop = SimulatedDesktop::ide_session();
        desktop.set_process_exited(4200, true);
        let (_, err) = validate_owner(&desktop, WindowHandle(0x1000), &targets()).unwrap_err();
        assert_eq!(err, ProcessLookupError::Terminated);
    }

    #[test]
    fn other_application_is_not_a_target() {
        let desktop = SimulatedDesktop::ide_session();
        let validation = validate_owner(&desktop, WindowHandle(0x3000), &targets()).unwrap();
        assert_eq!(validation.name, "notepad");
        assert!(!validation.is_target_application);
        assert!(!validation.is_accepted());
    }
}
