use serde::Deserialize;

/// Resource limits for extraction (zip-bomb and name-abuse guard).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractLimits {
    pub max_entries: usize,
    pub max_entry_bytes: u64,
    pub max_total_bytes: u64,
    pub max_name_len: usize,
}

impl Default for ExtractLimits {
    fn default() -> Self {
        Self {
            max_entries: 100_000,
            max_entry_bytes: 4_u64 * 1024 * 1024 * 1024,
            max_total_bytes: 16_u64 * 1024 * 1024 * 1024,
            max_name_len: 1024,
        }
    }
}

impl ExtractLimits {
    /// No limits at all. Only for fully trusted containers.
    pub fn unlimited() -> Self {
        Self {
            max_entries: usize::MAX,
            max_entry_bytes: u64::MAX,
            max_total_bytes: u64::MAX,
            max_name_len: usize::MAX,
        }
    }

    /// Apply overrides onto these limits. Only `Some` values override.
    pub fn apply(self, overrides: ExtractLimitsOverrides) -> Self {
        Self {
            max_entries: overrides.max_entries.unwrap_or(self.max_entries),
            max_entry_bytes: overrides.max_entry_bytes.unwrap_or(self.max_entry_bytes),
            max_total_bytes: overrides.max_total_bytes.unwrap_or(self.max_total_bytes),
            max_name_len: overrides.max_name_len.unwrap_or(self.max_name_len),
        }
    }
}

/// Partial overrides for `ExtractLimits`, parsed from config JSON.
/// Unknown keys cause deserialization to fail (deny_unknown_fields).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractLimitsOverrides {
    pub max_entries: Option<usize>,
    pub max_entry_bytes: Option<u64>,
    pub max_total_bytes: Option<u64>,
    pub max_name_len: Option<usize>,
}
