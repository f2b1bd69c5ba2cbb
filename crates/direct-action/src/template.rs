//! Placeholder template resolution
//!
//! Direct-action URLs, headers and bodies are configured as templates with
//! `{key}` placeholders. Placeholders are resolved against a flat string
//! context built from the call's metadata; a placeholder with no matching
//! context key is left verbatim so the backend can see what was missing.

use std::collections::HashMap;

/// Resolve `{key}` placeholders in `template` against `ctx`.
///
/// Resolution is a single pass: substituted values are not re-scanned for
/// placeholders. An unterminated `{` is copied through unchanged.
///
/// # Examples
///
/// ```rust
/// use std::collections::HashMap;
/// use callbridge_direct_action::template::resolve;
///
/// let mut ctx = HashMap::new();
/// ctx.insert("callId".to_string(), "abc-1".to_string());
///
/// assert_eq!(
///     resolve("https://x/{callId}/reject", &ctx),
///     "https://x/abc-1/reject"
/// );
/// assert_eq!(resolve("{missingKey}", &ctx), "{missingKey}");
/// ```
pub fn resolve(template: &str, ctx: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match tail.find('}') {
            Some(end) => {
                let key = &tail[1..end];
                match ctx.get(key) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&tail[..=end]),
                }
                rest = &tail[end + 1..];
            }
            None => {
                out.push_str(tail);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}
