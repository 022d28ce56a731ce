//! Grounded prompts for the chat model

/// Shown instead of a prompt when a session has nothing to retrieve from.
pub const NO_KNOWLEDGE: &str = "[RAG] No knowledge yet - try adding files or web-search first.";

/// Wrap a user query and its retrieved context into a prompt that asks the
/// model to answer from that context only.
///
/// Returns `None` when `context` is empty.
pub fn rag_prompt(query: &str, context: &str) -> Option<String> {
    if context.trim().is_empty() {
        return None;
    }
    Some(format!(
        "You are a helpful assistant.\n\
         \n\
         **User query:** {query}\n\
         \n\
         **Relevant knowledge:**\n\
         {context}\n\
         \n\
         Answer the user using only the knowledge above. If you cannot answer, say you don't know."
    ))
}
