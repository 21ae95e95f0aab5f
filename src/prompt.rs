use crate::core::models::{ChatTranscript, Message};

/// Instruction for the structured-output contract.
pub const SUMMARY_INSTRUCTIONS: &str = "You are a customer service analyst. Summarize the chat transcript you are given.\n\
Respond ONLY with a JSON object with exactly these fields:\n\
{\n\
  \"summary\": \"2-3 sentence summary of the conversation and its outcome\",\n\
  \"key_issues\": [\"main issues or questions raised by the customer\"],\n\
  \"resolution\": \"how the issue was resolved, or null if unresolved\",\n\
  \"action_items\": [\"follow-up actions, may be empty\"],\n\
  \"sentiment\": \"positive|neutral|negative\",\n\
  \"urgency\": \"low|normal|high\"\n\
}\n\
Do not include any text before or after the JSON object.";

/// Hard cap on the transcript text sent to the model.
pub const MAX_TRANSCRIPT_CHARS: usize = 60_000;

/// Render messages as `[HH:MM] Author: text`, preceded by a customer header
/// when the transcript knows who the customer is.
#[must_use]
pub fn format_transcript(transcript: &ChatTranscript, messages: &[Message]) -> String {
    let mut lines = Vec::with_capacity(messages.len() + 2);

    if let Some(customer) = transcript.customer_label() {
        lines.push(format!("Customer: {customer}"));
        lines.push(String::new());
    }

    for msg in messages {
        let author = msg.author_name.as_deref().unwrap_or(msg.role.label());
        lines.push(format!(
            "[{}] {}: {}",
            msg.timestamp.format("%H:%M"),
            author,
            sanitize_message_text(&msg.text)
        ));
    }

    let text = lines.join("\n");
    if text.chars().count() <= MAX_TRANSCRIPT_CHARS {
        return text;
    }

    // Keep the tail: the end of a chat carries the resolution.
    let skip = text.chars().count() - MAX_TRANSCRIPT_CHARS;
    text.chars().skip(skip).collect()
}

/// Follow-up sent once when the model's reply fails validation.
#[must_use]
pub fn corrective_instruction(reason: &str) -> String {
    format!(
        "Your previous reply could not be used: {reason}. \
         Reply again with ONLY the JSON object described earlier. \
         \"summary\" must be a non-empty string, \"key_issues\" and \"action_items\" \
         must be arrays of strings, \"sentiment\" one of positive|neutral|negative \
         and \"urgency\" one of low|normal|high."
    )
}

/// Strip control characters except newlines and tabs.
#[must_use]
pub fn sanitize_message_text(raw: &str) -> String {
    raw.chars()
        .filter(|&c| !c.is_control() || c == '\n' || c == '\t')
        .collect()
}
