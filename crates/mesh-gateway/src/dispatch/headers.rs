//! Header allow-list for REST forwarding.

use std::collections::BTreeMap;

/// Keep only the inbound headers named in `allowed` (case-insensitive).
///
/// Output names are lowercase.
pub fn forwarded_headers(
    inbound: &BTreeMap<String, String>,
    allowed: &[String],
) -> BTreeMap<String, String> {
    inbound
        .iter()
        .filter(|(name, _)| allowed.iter().any(|a| a.eq_ignore_ascii_case(name)))
        .map(|(name, value)| (name.to_ascii_lowercase(), value.clone()))
        .collect()
}
