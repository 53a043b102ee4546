//! Static extraction of the entity ids a template reads

use regex::Regex;
use std::sync::OnceLock;

fn entity_reference() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?x)
            states\.(?P<domain>[a-z0-9_]+)\.(?P<object_id>[a-z0-9_]+)
            |
            (?:states|is_state|state_attr|is_state_attr|has_value)
            \(\s*['"](?P<entity_id>[a-z0-9_]+\.[a-z0-9_]+)['"]
            "#,
        )
        .expect("entity reference pattern is valid")
    })
}

/// Entity ids referenced literally in `template`, in order of appearance
///
/// An empty result means the template's dependencies cannot be known
/// statically; callers should then react to every state change.
pub fn extract_entities(template: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();

    for caps in entity_reference().captures_iter(template) {
        let entity_id = match (caps.name("domain"), caps.name("object_id")) {
            (Some(domain), Some(object_id)) => {
                format!("{}.{}", domain.as_str(), object_id.as_str())
            }
            _ => match caps.name("entity_id") {
                Some(m) => m.as_str().to_string(),
                None => continue,
            },
        };
        if !found.contains(&entity_id) {
            found.push(entity_id);
        }
    }

    found
}
