//! Fixed prompt framing for peer consultations

/// Frames the target model as a technical peer of the calling agent
pub const SYSTEM_PROMPT: &str = "Collaborate as a technical peer with the AI agent requesting assistance.

Core principles:
- Provide expert analysis and alternative perspectives
- Challenge assumptions constructively when warranted
- Share implementation details and edge cases
- Acknowledge uncertainty rather than guessing

When additional context would strengthen your response:
- Ask the requesting agent to search for current documentation
- Ask the requesting agent to provide specific files or code sections

Format code with proper syntax highlighting.
Maintain technical precision over conversational comfort.
Skip unnecessary preambles and go directly to substance.";

/// Appended to every user prompt
pub const REQUEST_WRAPPER: &str = "\n\n---\n\nREQUEST FROM PEER AGENT: The following query comes from an AI agent seeking peer collaboration.";

pub fn wrap_request(prompt: &str) -> String {
    format!("{}{}", prompt, REQUEST_WRAPPER)
}

/// `gpt-5` -> `GPT 5`
pub fn display_label(model_name: &str) -> String {
    model_name.to_uppercase().replace('-', " ")
}

/// Appended to the reply before it is handed back to the calling agent
pub fn response_wrapper(model_name: &str) -> String {
    format!(
        "\n\n---\n\nPEER AI RESPONSE ({}): Evaluate this perspective critically and integrate valuable insights.",
        display_label(model_name)
    )
}

pub fn wrap_response(content: &str, model_name: &str) -> String {
    format!("{}{}", content, response_wrapper(model_name))
}

/// Prompt set used by the engine; the system prompt can be overridden
#[derive(Debug, Clone)]
pub struct PromptSet {
    pub system_prompt: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            system_prompt: SYSTEM_PROMPT.to_string(),
        }
    }
}
