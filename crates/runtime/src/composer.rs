//! System prompt composition.
//!
//! Composition is pure and deterministic: the same (template, language,
//! format) triple always yields byte-identical output, which is what lets
//! the runtime cache the result until one of the inputs changes.

use std::collections::HashMap;

use troupe_core::assistant::{OutputFormat, StructuredSchema};

/// The language directive appended when none is configured.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Build the effective system prompt for an assistant.
///
/// Starts from the base template, appends a language directive, then the
/// output-format instructions the configured format calls for. `{variable}`
/// slots in the template (including `{history}`/`{input}`) pass through
/// untouched — they belong to upstream template generation.
pub fn compose(base_template: &str, language: &str, format: &OutputFormat) -> String {
    let language = if language.is_empty() {
        DEFAULT_LANGUAGE
    } else {
        language
    };

    let mut prompt = base_template.to_string();
    prompt.push_str(&format!(
        "\n\nAlways write your reply in the language '{language}'."
    ));

    match format {
        OutputFormat::None => {}
        OutputFormat::Json => {
            prompt.push_str(
                "\n\nWrap your entire reply in a fenced ```json code block containing \
                 a single JSON object with a \"response\" field holding the reply text.",
            );
        }
        OutputFormat::Structured(schema) => {
            prompt.push_str(&structured_instructions(schema));
        }
    }

    prompt
}

/// Generate the format instructions for a structured field set.
fn structured_instructions(schema: &StructuredSchema) -> String {
    let mut out = String::from(
        "\n\nReply with a single JSON object inside a fenced ```json code block. \
         The object must contain exactly these fields:\n",
    );
    for field in &schema.fields {
        out.push_str(&format!("- \"{}\": {}\n", field.name, field.description));
    }
    out.push_str("Do not add any text outside the code block.");
    out
}

/// Fill `{variable}` slots in a template from a variable map.
///
/// Plain substring replacement, no escaping: slots with no matching
/// variable stay in place. Used by upstream template generation to
/// personalize a base template before it reaches the runtime.
pub fn render_template(template: &str, variables: &HashMap<String, String>) -> String {
    let mut rendered = template.to_string();
    for (key, value) in variables {
        rendered = rendered.replace(&format!("{{{key}}}"), value);
    }
    rendered
}
