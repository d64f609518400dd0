// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Maps a pass's [`PipelineError`] to a Unix sysexits-style exit code so
//! operators and supervisors (systemd, k8s) can distinguish a hard stop
//! from a transient failure without parsing log output.

use std::process::ExitCode;

use iati_pipeline_domain::error::PipelineError;

/// Maps a top-level pass result to a process [`ExitCode`].
pub fn result_to_exit_code(result: Result<(), PipelineError>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => map_error_to_exit_code(&e),
    }
}

/// `sysexits.h`-flavored mapping: configuration problems are `EX_CONFIG`
/// (78), hard stops are `EX_SOFTWARE` (70), everything else that can be
/// retried next pass is `EX_TEMPFAIL` (75).
pub fn map_error_to_exit_code(error: &PipelineError) -> ExitCode {
    ExitCode::from(exit_code_number(error))
}

fn exit_code_number(error: &PipelineError) -> u8 {
    match error {
        PipelineError::InvalidConfiguration(_) => 78,
        PipelineError::HardStop(_) => 70,
        PipelineError::Upstream { .. } | PipelineError::Database(_) => 75,
        PipelineError::ExpectedClient { .. }
        | PipelineError::SourceCorrupt(_)
        | PipelineError::SerializationError(_)
        | PipelineError::NotFound(_)
        | PipelineError::InternalError(_) => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hard_stop_maps_to_ex_software() {
        assert_eq!(exit_code_number(&PipelineError::HardStop("schema mismatch".into())), 70);
    }

    #[test]
    fn invalid_configuration_maps_to_ex_config() {
        assert_eq!(exit_code_number(&PipelineError::InvalidConfiguration("missing DATABASE_URL".into())), 78);
    }
}
