//! Collecting platform entries for an integration domain

use serde_yaml::Value;

/// Every platform entry configured for `domain`
///
/// Reads the `domain` key and any `domain <label>` keys, in file order.
/// Each may hold a single mapping or a list of them; anything else is
/// skipped.
pub fn platform_configs(config: &Value, domain: &str) -> Vec<Value> {
    let Some(map) = config.as_mapping() else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    for (key, value) in map {
        let Some(key) = key.as_str() else { continue };
        if !is_domain_key(key, domain) {
            continue;
        }
        match value {
            Value::Sequence(items) => {
                entries.extend(items.iter().filter(|v| v.is_mapping()).cloned())
            }
            Value::Mapping(_) => entries.push(value.clone()),
            _ => {}
        }
    }
    entries
}

fn is_domain_key(key: &str, domain: &str) -> bool {
    match key.strip_prefix(domain) {
        Some("") => true,
        Some(rest) => rest.starts_with(' ') && !rest.trim().is_empty(),
        None => false,
    }
}
