//! Display-name normalization and unique assignment
//!
//! Display names are compared case-insensitively and literally. When a
//! preferred name is taken, a numeric suffix is appended (`"Alice 1"`,
//! `"Alice 2"`, ...) until a free name is found.

use crate::store::AccountRepository;
use crate::Result;

/// Fallback used when a requested name is empty after normalization
pub const DEFAULT_DISPLAY_NAME: &str = "User";

/// Trim and collapse internal whitespace runs into single spaces
pub fn normalize_display_name(value: &str) -> String {
    let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");

    if normalized.is_empty() {
        DEFAULT_DISPLAY_NAME.to_string()
    } else {
        normalized
    }
}

/// Return the first display name derived from `preferred` that no account uses
pub async fn resolve_unique_display_name(
    accounts: &dyn AccountRepository,
    preferred: &str,
) -> Result<String> {
    let base = normalize_display_name(preferred);
    let mut candidate = base.clone();
    let mut suffix: u64 = 1;

    while accounts.find_by_display_name(&candidate).await?.is_some() {
        candidate = format!("{base} {suffix}");
        suffix += 1;
    }

    if suffix > 1 {
        tracing::debug!(preferred = %base, resolved = %candidate, "Display name taken, suffixed");
    }

    Ok(candidate)
}
