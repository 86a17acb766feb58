//! Prompt rendering: `{{name}}` substitution plus control-character scrubbing.

/// Removes ASCII control characters other than `\n`, `\r` and `\t`, then trims.
pub fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_ascii_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Substitutes each `{{name}}` in `template` with its sanitized value.
///
/// The template is scanned once; inserted values are never rescanned, so a
/// value containing `{{other}}` stays literal. Placeholders without a value
/// are left in place so missing context stays visible in the rendered prompt.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let template = sanitize(template);
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template.as_str();

    while let Some(open) = rest.find("{{") {
        rendered.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("}}") else {
            rendered.push_str(&rest[open..]);
            rest = "";
            break;
        };
        let name = &after_open[..close];
        match vars.iter().find(|(key, _)| *key == name) {
            Some((_, value)) => rendered.push_str(&sanitize(value)),
            None => rendered.push_str(&rest[open..open + 2 + close + 2]),
        }
        rest = &after_open[close + 2..];
    }
    rendered.push_str(rest);

    sanitize(&rendered)
}
