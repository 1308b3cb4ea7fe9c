//! # Conversion Configuration
//!
//! An explicit [`Config`] value is threaded through the engine; nothing in
//! the crate reads configuration from global state. The defaults mirror the
//! `auto` behaviour: the governor picks a size profile per table, the code
//! page is CP437, and row errors are skipped with a counter.
//!
//! ## Options
//!
//! | Option | Default | Meaning |
//! |--------|---------|---------|
//! | `memory_limit_bytes` | profile default | hard cap for resident memory budgeting |
//! | `profile` | `Auto` | force a size profile instead of estimating |
//! | `code_page` | CP437 | string decoding code page |
//! | `on_row_error` | `Skip` | skip, insert partial row, or abort the table |
//! | `parallel_tables` | 1 | decoder threads; honored under `enterprise` only |
//! | `resume` | false | continue from `_resume` markers if present |
//! | `release_interval` | 1000 | records between buffer release sweeps |
//! | `recovery_dir` | none | backup/checkpoint directory; off when unset |

mod constants;

pub use constants::*;

use std::path::PathBuf;
use std::str::FromStr;

use crate::decode::CodePage;

/// Size profile override. `Auto` estimates per table from
/// `record_length x last_issued_row`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProfileChoice {
    #[default]
    Auto,
    Small,
    Medium,
    Large,
    Enterprise,
}

impl FromStr for ProfileChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(ProfileChoice::Auto),
            "small" => Ok(ProfileChoice::Small),
            "medium" => Ok(ProfileChoice::Medium),
            "large" => Ok(ProfileChoice::Large),
            "enterprise" => Ok(ProfileChoice::Enterprise),
            other => Err(format!("unknown profile: {}", other)),
        }
    }
}

/// Policy applied when a record fails to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowErrorPolicy {
    /// Log, count, move on to the next record.
    #[default]
    Skip,
    /// Insert the row with NULL in the cells that failed.
    Partial,
    /// Abandon the table, keeping the batches already committed.
    Abort,
}

impl FromStr for RowErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skip" => Ok(RowErrorPolicy::Skip),
            "partial" => Ok(RowErrorPolicy::Partial),
            "abort" => Ok(RowErrorPolicy::Abort),
            other => Err(format!("unknown row error policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub memory_limit_bytes: Option<u64>,
    pub profile: ProfileChoice,
    pub code_page: CodePage,
    pub on_row_error: RowErrorPolicy,
    pub parallel_tables: usize,
    pub resume: bool,
    pub release_interval: u64,
    /// Directory for output backups and cancellation checkpoints.
    /// Recovery bookkeeping is off when unset.
    pub recovery_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory_limit_bytes: None,
            profile: ProfileChoice::Auto,
            code_page: CodePage::Cp437,
            on_row_error: RowErrorPolicy::Skip,
            parallel_tables: 1,
            resume: false,
            release_interval: DEFAULT_RELEASE_INTERVAL,
            recovery_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let config = Config::default();

        assert_eq!(config.memory_limit_bytes, None);
        assert_eq!(config.profile, ProfileChoice::Auto);
        assert_eq!(config.code_page, CodePage::Cp437);
        assert_eq!(config.on_row_error, RowErrorPolicy::Skip);
        assert_eq!(config.parallel_tables, 1);
        assert!(!config.resume);
        assert_eq!(config.release_interval, DEFAULT_RELEASE_INTERVAL);
        assert_eq!(config.recovery_dir, None);
    }

    #[test]
    fn profile_choice_parses_all_names() {
        assert_eq!("auto".parse::<ProfileChoice>().unwrap(), ProfileChoice::Auto);
        assert_eq!("small".parse::<ProfileChoice>().unwrap(), ProfileChoice::Small);
        assert_eq!("medium".parse::<ProfileChoice>().unwrap(), ProfileChoice::Medium);
        assert_eq!("large".parse::<ProfileChoice>().unwrap(), ProfileChoice::Large);
        assert_eq!(
            "enterprise".parse::<ProfileChoice>().unwrap(),
            ProfileChoice::Enterprise
        );
        assert!("SMALL".parse::<ProfileChoice>().is_err());
        assert!("".parse::<ProfileChoice>().is_err());
    }

    #[test]
    fn row_error_policy_parses_all_names() {
        assert_eq!("skip".parse::<RowErrorPolicy>().unwrap(), RowErrorPolicy::Skip);
        assert_eq!(
            "partial".parse::<RowErrorPolicy>().unwrap(),
            RowErrorPolicy::Partial
        );
        assert_eq!("abort".parse::<RowErrorPolicy>().unwrap(), RowErrorPolicy::Abort);
        assert!("ignore".parse::<RowErrorPolicy>().is_err());
    }
}
