//! Validation of user-supplied configuration values.
//!
//! Errors carry a hint so the user knows how to fix the flag.

use crate::error::TracehopError;
use crate::proxy::target::TargetBase;

const TARGET_HINT: &str = "Expected an absolute http(s) base URL, e.g. --target http://localhost:9000";

/// Validate the `--target` flag and turn it into a [`TargetBase`].
pub fn validate_target(raw: &str) -> Result<TargetBase, TracehopError> {
    TargetBase::parse(raw.trim()).map_err(|reason| TracehopError::InvalidTarget {
        url: raw.to_string(),
        reason,
        hint: TARGET_HINT,
    })
}
