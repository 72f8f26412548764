//! Prompt templates.
//!
//! Templates use single-brace placeholders (`{question}`), with `{{` and `}}`
//! as literal braces. Placeholders without a value are left as written so a
//! prompt that talks about JSON such as `{"action": ...}` survives intact.

use std::collections::HashMap;

use thiserror::Error;

use crate::config::MessageTemplates;
use crate::llm::ChatMessage;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("question must not be empty")]
    EmptyQuestion,
}

/// Substitute `{key}` placeholders from `vars`.
pub fn render(template: &str, vars: &HashMap<&str, &str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }

        if tail.starts_with('{') {
            if let Some(end) = tail.find('}') {
                let key = &tail[1..end];
                let is_ident = !key.is_empty()
                    && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
                if let Some(value) = vars.get(key).filter(|_| is_ident) {
                    out.push_str(value);
                    rest = &tail[end + 1..];
                    continue;
                }
            }
        }

        out.push_str(&tail[..1]);
        rest = &tail[1..];
    }

    out.push_str(rest);
    out
}

/// Build the `[system, user]` message pair for `question`.
///
/// The system message is omitted when its rendered text is blank.
pub fn messages_from_template(
    templates: &MessageTemplates,
    question: &str,
) -> Result<Vec<ChatMessage>, TemplateError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(TemplateError::EmptyQuestion);
    }

    let vars: HashMap<&str, &str> = HashMap::from([
        ("role", templates.system.role.as_str()),
        ("style", templates.system.style.as_str()),
        ("question", question),
    ]);

    let mut messages = Vec::with_capacity(2);
    let system = render(&templates.system.content, &vars);
    if !system.trim().is_empty() {
        messages.push(ChatMessage::system(system.trim()));
    }
    messages.push(ChatMessage::user(render(&templates.user, &vars)));
    Ok(messages)
}
