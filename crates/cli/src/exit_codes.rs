//! CLI Exit Code Registry
//!
//! This is the single source of truth for all `rsign` exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! | Code | Meaning                                              |
//! |------|------------------------------------------------------|
//! | 0    | Success                                              |
//! | 1    | General error (unspecified)                          |
//! | 2    | Usage error (bad arguments)                          |
//! | 3    | Config file unreadable or invalid                    |
//! | 4    | A registry feed failed or timed out; nothing changed |
//! | 5    | State file unreadable or unwritable                  |
//! | 6    | Export or output write failed                        |

use roadsigns_recon::ReconError;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

/// Config could not be read, parsed, or failed validation.
pub const EXIT_CONFIG: u8 = 3;

/// A feed was unreachable, answered with an error, sent garbage, or timed out.
pub const EXIT_FETCH: u8 = 4;

/// Previous-pass state could not be loaded or saved.
pub const EXIT_STATE: u8 = 5;

/// Writing CSV or JSON output failed.
pub const EXIT_OUTPUT: u8 = 6;

/// Map an engine error onto the registry.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => EXIT_CONFIG,
        ReconError::Fetch { .. } | ReconError::Worker(_) => EXIT_FETCH,
        ReconError::State(_) => EXIT_STATE,
        ReconError::Export(_) => EXIT_OUTPUT,
        ReconError::PassAborted => EXIT_ERROR,
    }
}
