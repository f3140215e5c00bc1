//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract: scripts rely on them.
//!
//! | Code | Meaning                                              |
//! |------|------------------------------------------------------|
//! | 0    | Success, no differences                              |
//! | 1    | Differences found                                    |
//! | 2    | Usage error (bad arguments, missing model/versions)  |
//! | 3    | Settings file unreadable or invalid                  |
//! | 4    | Output store unreadable                              |
//! | 5    | Session could not compare anything                   |

/// Success - completed and no table differs.
pub const EXIT_SUCCESS: u8 = 0;

/// At least one table differs between the baseline and a candidate.
/// Like `diff(1)`, exit 1 means "versions differ."
pub const EXIT_DIFFS: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

/// Settings file could not be read, parsed, validated or written.
pub const EXIT_CONFIG: u8 = 3;

/// Model database missing, unreadable or lacking the requested run.
pub const EXIT_STORE: u8 = 4;

/// No version ran, or fewer than two produced data to compare.
pub const EXIT_SESSION: u8 = 5;
