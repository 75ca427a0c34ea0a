use crate::State;

/// Fills `{{key}}` placeholders from the state; unknown keys become empty.
pub fn compose_context(template: &str, state: &State) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        match after_open.find("}}") {
            Some(end) => {
                let key = after_open[..end].trim();
                output.push_str(state.get(key).unwrap_or_default());
                rest = &after_open[end + 2..];
            }
            None => {
                output.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    output.push_str(rest);
    output
}
