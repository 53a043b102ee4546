//! Jinja2-compatible template engine
//!
//! Built on minijinja with the hub's state access on top:
//!
//! - `states('cover.garage')` - state value as a string (`unknown` if missing)
//! - `states.cover.garage` - full state object (`.state`, `.attributes`, ...)
//! - `is_state('cover.garage', 'open')`
//! - `state_attr('cover.garage', 'current_position')`
//! - `is_state_attr(...)`, `has_value(...)`
//! - `| float(default)` / `| int(default)` with lenient parsing
//!
//! Lookups through missing entities chain to undefined instead of failing,
//! so `{% if states.cover.missing.state %}` renders the else branch.
//!
//! ```ignore
//! let engine = TemplateEngine::new(state_machine);
//! let position = engine.render("{{ state_attr('cover.garage', 'position') }}")?;
//! let watched = extract_entities("{{ is_state('cover.garage', 'open') }}");
//! ```

mod engine;
mod error;
mod extract;
mod filters;
mod states;

pub use engine::TemplateEngine;
pub use error::{TemplateError, TemplateResult};
pub use extract::extract_entities;
pub use states::{StateWrapper, StatesObject};

pub use minijinja::Value;
