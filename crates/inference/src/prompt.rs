//! Prompt assembly for structured extraction.
//!
//! Each window prompt carries the relevant slice of the type catalog, a few
//! worked examples, and the window text, and demands a single JSON document
//! in the fixed output shape. The strict variant is used for the one allowed
//! re-extraction of a borderline window.

use schema::{registry, SchemaRegistry};

use crate::client::ChatMessage;

const SYSTEM_PROMPT: &str = "You extract infrastructure entities and relationships from \
technical text. Respond with exactly one JSON document matching the requested schema. \
No prose, no markdown fences, no explanations.";

const STRICT_SUFFIX: &str = "\nBe conservative: emit only entities and relations stated \
explicitly in the text. If the text supports nothing, return empty arrays. Any deviation \
from the JSON schema is an error.";

/// Worked examples paired as (input text, expected JSON).
const FEW_SHOTS: &[(&str, &str)] = &[
    (
        "The grafana dashboard talks to prometheus on port 9090.",
        r#"{"entities":[{"type":"Service","name":"grafana","props":{}},{"type":"Service","name":"prometheus","props":{"port":9090}}],"relations":[{"type":"CONNECTS_TO","src":"grafana","dst":"prometheus","props":{"port":9090}}],"confidence":0.93}"#,
    ),
    (
        "Caddy forwards requests for cloud.example.com to the nextcloud container.",
        r#"{"entities":[{"type":"Service","name":"caddy","props":{}},{"type":"Service","name":"nextcloud","props":{}},{"type":"Host","name":"cloud.example.com","props":{}}],"relations":[{"type":"ROUTES_TO","src":"caddy","dst":"nextcloud","props":{"host":"cloud.example.com"}}],"confidence":0.9}"#,
    ),
    (
        "We had pizza for lunch and talked about the weather.",
        r#"{"entities":[],"relations":[],"confidence":0.99}"#,
    ),
];

/// Build the message list for one window.
pub fn extraction_messages(window_text: &str, strict: bool) -> Vec<ChatMessage> {
    let mut system = String::with_capacity(2048);
    system.push_str(SYSTEM_PROMPT);
    system.push_str("\n\nOutput schema:\n");
    system.push_str(
        r#"{"entities":[{"type":"<type tag>","name":"<canonical name>","props":{}}],"relations":[{"type":"<edge tag>","src":"<entity name>","dst":"<entity name>","props":{}}],"confidence":<0..1>}"#,
    );
    system.push_str("\n\nKnown entity types: ");
    system.push_str(&node_tag_list(registry()));
    system.push_str("\nKnown relation types: ");
    system.push_str(&edge_tag_list(registry()));
    if strict {
        system.push_str(STRICT_SUFFIX);
    }

    let mut messages = vec![ChatMessage::system(system)];
    for (input, output) in FEW_SHOTS {
        messages.push(ChatMessage::user((*input).to_string()));
        messages.push(ChatMessage {
            role: "assistant".into(),
            content: (*output).to_string(),
        });
    }
    messages.push(ChatMessage::user(window_text.to_string()));
    messages
}

fn node_tag_list(reg: &SchemaRegistry) -> String {
    let mut tags: Vec<&str> = reg.all_node_types().map(|d| d.type_tag).collect();
    tags.sort_unstable();
    tags.join(", ")
}

fn edge_tag_list(reg: &SchemaRegistry) -> String {
    let mut tags: Vec<&str> = reg.all_edge_types().map(|d| d.type_tag).collect();
    tags.sort_unstable();
    tags.join(", ")
}
