//! Generation prompt assembly.
//!
//! The prompt has fixed sections in a fixed order: persona, context,
//! conversation history (or the new-conversation marker), the question,
//! response instructions, and the insufficient-context fallback. Only a
//! short window of history is rendered, so the model is told to answer
//! each question on its own terms.

use crate::models::Message;

/// Rendered in place of the transcript when a session has no prior turns.
pub const NEW_CONVERSATION_MARKER: &str =
    "This is the start of a new conversation. There are no previous messages; do not refer to any.";

/// The sentence the model must use verbatim when the context cannot answer the question.
pub fn fallback_sentence(domain: &str) -> String {
    format!(
        "Based on the available {} information, I don't have enough specific data to properly \
         answer your question about [topic]. Would you like me to help with a related aspect I \
         can address, or clarify your question?",
        domain
    )
}

/// Join retrieved chunks, most similar first, separated by blank lines.
pub fn render_context(chunks: &[String]) -> String {
    chunks.join("\n\n")
}

/// `User: …` / `Bot: …` transcript of `history`, or the new-conversation marker.
pub fn render_history(history: &[Message]) -> String {
    if history.is_empty() {
        return NEW_CONVERSATION_MARKER.to_string();
    }
    history
        .iter()
        .map(|m| format!("User: {}\nBot: {}", m.user, m.bot))
        .collect::<Vec<_>>()
        .join("\n")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

pub fn build_prompt(domain: &str, context: &[String], history: &[Message], query: &str) -> String {
    format!(
        "You are IntelliSphere, an expert AI assistant specializing in {persona} knowledge.
Your mission is to provide insightful, accurate, and comprehensive answers using domain-specific expertise.

---

CONTEXT
Base all responses exclusively on the following verified documents:
{context}

CONVERSATION HISTORY
Maintain conversational flow by considering:
{history}

NEW QUESTION
Address the following query:
{query}

---

RESPONSE INSTRUCTIONS
Treat the new question as self-contained. Use the conversation history only for short-range continuity, never as a source of facts.
Always follow this structure:
1. Begin with a warm, professional greeting that acknowledges the user's specific question.
2. Provide a thorough, structured answer based on the context. Break down complex concepts into simple explanations and include examples, figures, or data points if available.
3. Maintain a confident yet conversational tone.
4. Organize longer answers with headings, bullet points, or numbered lists.
5. End with a brief summary and invite follow-up questions.

---

IMPORTANT
If the provided context is insufficient to fully answer the question, respond:

\"{fallback}\"
",
        persona = capitalize(domain),
        context = render_context(context),
        history = render_history(history),
        query = query.trim(),
        fallback = fallback_sentence(domain),
    )
}
