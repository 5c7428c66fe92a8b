//! Exit code logic for the backup process.
//!
//! Single responsibility: map the run report to the process exit outcome.

use backup_core::RunReport;

use crate::ProcessExit;

/// Interruption wins over failures; any failed file makes the run a failure.
pub(crate) fn determine_exit_outcome(report: &RunReport) -> ProcessExit {
    if report.interrupted {
        ProcessExit::Interrupted
    } else if report.failed > 0 {
        ProcessExit::Failure
    } else {
        ProcessExit::Success
    }
}
