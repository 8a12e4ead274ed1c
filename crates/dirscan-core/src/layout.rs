//! Parallel-filesystem layout metadata.
//!
//! Every field is best-effort. A missing field means the probe that would
//! have produced it was unavailable, timed out, or returned nothing useful.

use serde::{Deserialize, Serialize};

/// Stripe geometry parsed from `lfs getstripe -v`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripeInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe_offset: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
}

impl StripeInfo {
    /// Parse the verbose stripe listing. Returns `None` when nothing matched.
    ///
    /// Lines are matched by key substring so that both `stripe_count:` and
    /// `lmm_stripe_count:` spellings are accepted.
    pub fn parse(text: &str) -> Option<Self> {
        let mut info = Self::default();
        for line in text.lines().map(str::trim) {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            if key.ends_with("stripe_count") {
                info.stripe_count = info.stripe_count.or_else(|| value.parse().ok());
            } else if key.ends_with("stripe_size") {
                info.stripe_size = info.stripe_size.or_else(|| value.parse().ok());
            } else if key.ends_with("stripe_offset") {
                info.stripe_offset = info.stripe_offset.or_else(|| value.parse().ok());
            } else if key.ends_with("pool") && !value.is_empty() && info.pool.is_none() {
                info.pool = Some(value.to_string());
            }
        }
        (!info.is_empty()).then_some(info)
    }

    fn is_empty(&self) -> bool {
        self.stripe_count.is_none()
            && self.stripe_size.is_none()
            && self.stripe_offset.is_none()
            && self.pool.is_none()
    }
}

/// One component of a composite (progressive file layout) file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutComponent {
    pub component_id: u32,
    pub info: String,
}

/// Layout and placement metadata for one entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe_info_raw: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe_parsed: Option<StripeInfo>,
    /// YAML layout converted to a JSON value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_yaml: Option<serde_json::Value>,
    /// YAML layout text kept verbatim when it does not parse.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_raw: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ost_indices: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<LayoutComponent>>,
    /// Capacity listing of the containing filesystem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesystem_info: Option<String>,
    /// Quota listing for the scanning user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_quota: Option<String>,
}

impl LayoutMetadata {
    /// True when no probe produced anything.
    pub fn is_empty(&self) -> bool {
        self.stripe_info_raw.is_none()
            && self.stripe_parsed.is_none()
            && self.layout_yaml.is_none()
            && self.layout_raw.is_none()
            && self.ost_indices.is_none()
            && self.fid.is_none()
            && self.component_count.is_none()
            && self.components.is_none()
            && self.filesystem_info.is_none()
            && self.user_quota.is_none()
    }

    /// `Some(self)` unless empty.
    pub fn into_option(self) -> Option<Self> {
        (!self.is_empty()).then_some(self)
    }

    /// Record an OST index listing.
    pub fn set_ost_indices(&mut self, text: &str) {
        self.ost_indices = parse_ost_indices(text);
    }

    /// Stripe count, if parsed.
    pub fn stripe_count(&self) -> Option<i64> {
        self.stripe_parsed.as_ref().and_then(|s| s.stripe_count)
    }
}

/// Extract the numeric tokens of an OST index listing.
fn parse_ost_indices(text: &str) -> Option<Vec<u32>> {
    let indices: Vec<u32> = text
        .split_whitespace()
        .filter(|token| token.chars().all(|c| c.is_ascii_digit()))
        .filter_map(|token| token.parse().ok())
        .collect();
    (!indices.is_empty()).then_some(indices)
}
