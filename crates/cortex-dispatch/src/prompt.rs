//! Prompt formatting: flattens the OpenAI-shaped message list into the flat
//! text prompt the engine plugin expects, extracting and placeholder-ing
//! image parts when the loaded variant declares multimodal support.

use crate::types::{ChatMessage, ChatRole, ContentPart, ImagePart, MessageContent};
use base64::Engine as _;

const DATA_URL_PREFIX: &str = "data:";

/// Builds the flat prompt text and the list of extracted image parts.
///
/// - A leading `system` message is used verbatim; otherwise `preprompt` is
///   prepended.
/// - If `multimodal` is false, image parts are dropped entirely rather than
///   placeholder-ed.
/// - Image references are recognized as already being a `data:` URL (used
///   as-is) or a bare URL/local path (base64-encoded and wrapped).
pub fn format_prompt(messages: &[ChatMessage], multimodal: bool, preprompt: &str, user_turn_marker: &str) -> (String, Vec<ImagePart>) {
    let mut image_parts = Vec::new();
    let mut turns = Vec::new();

    let mut system_text: Option<String> = None;
    for message in messages {
        if message.role == ChatRole::System && system_text.is_none() {
            system_text = Some(content_to_text(&message.content, multimodal, &mut image_parts));
            continue;
        }
        let role_label = match message.role {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::Tool => "tool",
        };
        let text = content_to_text(&message.content, multimodal, &mut image_parts);
        turns.push(format!("{role_label}: {text}"));
    }

    let preamble = system_text.unwrap_or_else(|| preprompt.to_string());
    let mut prompt = String::new();
    if !preamble.is_empty() {
        prompt.push_str(&preamble);
        prompt.push('\n');
    }
    for turn in &turns {
        prompt.push_str(turn);
        prompt.push_str(user_turn_marker);
        prompt.push('\n');
    }

    (prompt, image_parts)
}

fn content_to_text(content: &MessageContent, multimodal: bool, image_parts: &mut Vec<ImagePart>) -> String {
    match content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Parts(parts) => {
            let mut out = String::new();
            for part in parts {
                match part {
                    ContentPart::Text { text } => out.push_str(text),
                    ContentPart::ImageUrl { image_url } => {
                        if !multimodal {
                            continue;
                        }
                        let id = image_parts.len() + 1;
                        let placeholder = format!("[img-{id}]");
                        let data_url = to_data_url(&image_url.url);
                        image_parts.push(ImagePart {
                            id,
                            placeholder: placeholder.clone(),
                            data_url,
                        });
                        out.push_str(&placeholder);
                    }
                }
            }
            out
        }
    }
}

fn to_data_url(reference: &str) -> String {
    if reference.starts_with(DATA_URL_PREFIX) {
        return reference.to_string();
    }
    if let Ok(bytes) = std::fs::read(reference) {
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        return format!("data:application/octet-stream;base64,{encoded}");
    }
    // A remote URL we cannot fetch synchronously during formatting: pass
    // through as a reference the engine itself is expected to resolve.
    reference.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_message(role: ChatRole, text: &str) -> ChatMessage {
        ChatMessage {
            role,
            content: MessageContent::Text(text.to_string()),
        }
    }

    #[test]
    fn system_message_replaces_preprompt() {
        let messages = vec![text_message(ChatRole::System, "be terse"), text_message(ChatRole::User, "hi")];
        let (prompt, images) = format_prompt(&messages, false, "default preprompt", "<|user_end|>");
        assert!(prompt.starts_with("be terse\n"));
        assert!(images.is_empty());
    }

    #[test]
    fn missing_system_message_uses_configured_preprompt() {
        let messages = vec![text_message(ChatRole::User, "hi")];
        let (prompt, _) = format_prompt(&messages, false, "default preprompt", "<|user_end|>");
        assert!(prompt.starts_with("default preprompt\n"));
    }

    #[test]
    fn image_parts_are_dropped_when_not_multimodal() {
        let messages = vec![ChatMessage {
            role: ChatRole::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: "look: ".to_string() },
                ContentPart::ImageUrl {
                    image_url: crate::types::ImageUrlRef {
                        url: "data:image/png;base64,AAAA".to_string(),
                    },
                },
            ]),
        }];
        let (prompt, images) = format_prompt(&messages, false, "", "<|user_end|>");
        assert!(!prompt.contains("[img-"));
        assert!(images.is_empty());
    }

    #[test]
    fn image_parts_get_sequential_placeholders_when_multimodal() {
        let messages = vec![ChatMessage {
            role: ChatRole::User,
            content: MessageContent::Parts(vec![
                ContentPart::ImageUrl {
                    image_url: crate::types::ImageUrlRef {
                        url: "data:image/png;base64,AAAA".to_string(),
                    },
                },
                ContentPart::ImageUrl {
                    image_url: crate::types::ImageUrlRef {
                        url: "data:image/png;base64,BBBB".to_string(),
                    },
                },
            ]),
        }];
        let (prompt, images) = format_prompt(&messages, true, "", "<|user_end|>");
        assert!(prompt.contains("[img-1]"));
        assert!(prompt.contains("[img-2]"));
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].data_url, "data:image/png;base64,AAAA");
    }
}
