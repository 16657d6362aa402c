//! System prompt assembly for the reception assistant.

use frontdesk_kernel::retrieval::CallerContext;
use frontdesk_kernel::store::BusinessIdentity;

pub const BASE_SYSTEM_PROMPT: &str = "\
You are Donna, an AI receptionist assistant. Your name is Donna. Your job is to:
1. Identify who is calling and why
2. Search for relevant context about the caller
3. Provide helpful, professional responses

When a caller introduces themselves or states their purpose:
- Use search_contacts to look up the caller if they give their name
- Use search_emails to find relevant context about their topic
- Use generate_response to deliver your spoken reply once you have what you need

Always introduce yourself as Donna when appropriate. Replies are spoken \
aloud over the phone, so keep them brief. Be professional, warm, concise, \
and helpful.";

/// Compose the system prompt: persona, business identity, retrieved
/// grounding and the recent conversation.
pub fn build_system_prompt(identity: Option<&BusinessIdentity>, context: &CallerContext) -> String {
    let mut prompt = BASE_SYSTEM_PROMPT.to_string();

    if let Some(identity) = identity {
        prompt.push_str(&format!("\n\nYou work for {}.", identity.principal_name));
        if let Some(company) = &identity.company_name {
            prompt.push_str(&format!(" The company is {}.", company));
        }
        if let Some(description) = &identity.company_description {
            prompt.push(' ');
            prompt.push_str(description);
        }
    }

    if !context.contacts.is_empty() {
        prompt.push_str("\n\nKnown contacts:");
        for hit in &context.contacts {
            let name = hit.metadata.get("name").map(String::as_str).unwrap_or("Unknown");
            let email = hit.metadata.get("email").map(String::as_str).unwrap_or("");
            let company = hit.metadata.get("company").map(String::as_str).unwrap_or("");
            prompt.push_str(&format!("\n- {}: {} ({})", name, email, company));
        }
    }

    if !context.emails.is_empty() {
        prompt.push_str("\n\nRelevant emails:");
        for hit in &context.emails {
            let sender = hit.metadata.get("sender").map(String::as_str).unwrap_or("Unknown");
            let subject = hit
                .metadata
                .get("subject")
                .map(String::as_str)
                .unwrap_or("No subject");
            prompt.push_str(&format!("\n- From {}: {}", sender, subject));
        }
    }

    if !context.transcript_tail.is_empty() {
        prompt.push_str("\n\nRecent conversation:");
        for line in &context.transcript_tail {
            prompt.push_str(&format!("\n{}", line));
        }
    }

    prompt
}
