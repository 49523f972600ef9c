//! `{{path}}` substitution for automation outputs.
//!
//! `{{human.path}}` renders millisecond values as `[-]hh:mm:ss`. A path
//! that does not resolve is left in place, braces included.

use super::fields::resolve;
use crate::state::RuntimeState;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Substitute every placeholder in `template`.
pub fn render(template: &str, state: &RuntimeState) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            // unterminated placeholder
            out.push_str(&rest[start..]);
            return out;
        };
        let key = after_open[..end].trim();
        let (path, human) = match key.strip_prefix("human.") {
            Some(path) => (path, true),
            None => (key, false),
        };
        match resolve(state, path) {
            Some(value) if human => out.push_str(&value.render_human()),
            Some(value) => out.push_str(&value.render()),
            None => out.push_str(&rest[start..start + OPEN.len() + end + CLOSE.len()]),
        }
        rest = &after_open[end + CLOSE.len()..];
    }
    out.push_str(rest);
    out
}
