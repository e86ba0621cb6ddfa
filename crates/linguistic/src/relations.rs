//! Relation mining over tagged sentences.
//!
//! Canonical verb frames connect the nearest entity to the left of a relation
//! verb with the nearest entity to its right:
//!
//! ```text
//! (Entity) -[subj]- <verb in {depend, require, route, proxy, bind, ...}> -[obj]- (Entity)
//! ```
//!
//! Passives (`api is proxied by traefik`) swap the endpoints. A second frame
//! family attaches location prepositions (`nginx at 10.0.0.1`) as `BINDS`.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use schema::tags::edge;

use crate::tagger::TaggedEntity;
use crate::token::{PosTag, Sentence};

/// Inflected verb form -> edge tag. Explicit forms, no stemmer.
static VERB_FRAMES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    for form in ["depend", "depends", "depended", "depending", "rely", "relies", "relied"] {
        m.insert(form, edge::DEPENDS_ON);
    }
    for form in ["require", "requires", "required", "requiring"] {
        m.insert(form, edge::DEPENDS_ON);
    }
    for form in ["route", "routes", "routed", "routing", "forward", "forwards", "forwarded"] {
        m.insert(form, edge::ROUTES_TO);
    }
    for form in ["proxy", "proxies", "proxied", "proxying"] {
        m.insert(form, edge::ROUTES_TO);
    }
    for form in ["bind", "binds", "bound", "listen", "listens", "listened", "listening"] {
        m.insert(form, edge::BINDS);
    }
    for form in ["expose", "exposes", "exposed", "exposing"] {
        m.insert(form, edge::EXPOSES);
    }
    for form in ["run", "runs", "running", "ran", "host", "hosts", "hosted", "hosting"] {
        m.insert(form, edge::RUNS);
    }
    for form in ["mount", "mounts", "mounted", "mounting"] {
        m.insert(form, edge::MOUNTS);
    }
    for form in ["connect", "connects", "connected", "connecting"] {
        m.insert(form, edge::CONNECTS_TO);
    }
    m
});

/// Look up the edge tag for a lowercased verb form, if it opens a frame.
pub fn verb_tag(lower: &str) -> Option<&'static str> {
    VERB_FRAMES.get(lower).copied()
}

/// A mined relation between two tagged entities of one sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinedRelation {
    pub edge_tag: &'static str,
    pub subject: TaggedEntity,
    pub object: TaggedEntity,
    pub sent_index: usize,
}

/// Window (in tokens) either side of the verb an argument may sit in.
const ARG_WINDOW: usize = 8;

/// Mine relations from one sentence given its tagged entities.
pub fn mine(sentence: &Sentence, entities: &[TaggedEntity]) -> Vec<MinedRelation> {
    let mut relations = Vec::new();
    if entities.len() < 2 {
        return maybe_location_frame(sentence, entities);
    }

    for token in &sentence.tokens {
        let Some(edge_tag) = verb_tag(&token.lower) else {
            continue;
        };
        let verb_idx = token.index;

        // An entity opening a prepositional phrase (`at 10.0.0.1`) is never
        // the grammatical subject; skip those on the left side.
        let subject = entities
            .iter()
            .filter(|e| e.token_range.1 <= verb_idx && verb_idx - e.token_range.1 < ARG_WINDOW)
            .filter(|e| {
                e.token_range.0 == 0
                    || sentence.tokens[e.token_range.0 - 1].pos != PosTag::Preposition
            })
            .max_by_key(|e| e.token_range.1);
        let object = entities
            .iter()
            .filter(|e| e.token_range.0 > verb_idx && e.token_range.0 - verb_idx <= ARG_WINDOW)
            .min_by_key(|e| e.token_range.0);

        let (Some(subject), Some(object)) = (subject, object) else {
            continue;
        };
        if subject.token_range == object.token_range {
            continue;
        }

        // Passive voice: `X is routed by Y` inverts the frame.
        let passive = verb_idx >= 1
            && matches!(
                sentence.tokens[verb_idx - 1].lower.as_str(),
                "is" | "are" | "was" | "were" | "been"
            )
            && sentence
                .tokens
                .get(verb_idx + 1)
                .map_or(false, |t| t.lower == "by");

        let (subject, object) = if passive {
            (object.clone(), subject.clone())
        } else {
            (subject.clone(), object.clone())
        };

        relations.push(MinedRelation {
            edge_tag,
            subject,
            object,
            sent_index: sentence.index,
        });
    }

    relations.extend(maybe_location_frame(sentence, entities));
    relations
}

/// `service at <ip|host:port>` binds the service to the address even with no
/// verb in between.
fn maybe_location_frame(sentence: &Sentence, entities: &[TaggedEntity]) -> Vec<MinedRelation> {
    let mut relations = Vec::new();
    for pair in entities.windows(2) {
        let (left, right) = (&pair[0], &pair[1]);
        if !matches!(right.type_tag, "IpAddress" | "Upstream" | "Host") {
            continue;
        }
        if matches!(left.type_tag, "IpAddress" | "Upstream" | "Host") {
            continue;
        }
        let gap = &sentence.tokens[left.token_range.1..right.token_range.0];
        if gap.len() <= 3
            && gap
                .iter()
                .any(|t| t.pos == PosTag::Preposition && matches!(t.lower.as_str(), "at" | "on"))
        {
            relations.push(MinedRelation {
                edge_tag: edge::BINDS,
                subject: left.clone(),
                object: right.clone(),
                sent_index: sentence.index,
            });
        }
    }
    relations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tagger::tag_sentence;
    use crate::token::split_sentences;

    fn mine_text(text: &str) -> Vec<MinedRelation> {
        let sentences = split_sentences(text);
        let entities = tag_sentence(&sentences[0]);
        mine(&sentences[0], &entities)
    }

    #[test]
    fn depends_frame() {
        let rels = mine_text("The nginx service depends on postgres for caching.");
        let dep = rels.iter().find(|r| r.edge_tag == "DEPENDS_ON").expect("dependency");
        assert_eq!(dep.subject.canonical, "nginx");
        assert_eq!(dep.object.canonical, "postgres");
    }

    #[test]
    fn location_frame_binds_service_to_ip() {
        let rels = mine_text("The nginx service at 10.0.0.1 depends on postgres.");
        let bind = rels.iter().find(|r| r.edge_tag == "BINDS").expect("binds");
        assert_eq!(bind.subject.canonical, "nginx");
        assert_eq!(bind.object.canonical, "10.0.0.1");
        assert!(rels.iter().any(|r| r.edge_tag == "DEPENDS_ON"
            && r.subject.canonical == "nginx"
            && r.object.canonical == "postgres"));
    }

    #[test]
    fn routes_frame() {
        let rels = mine_text("Traefik routes traffic to grafana.");
        let route = rels.iter().find(|r| r.edge_tag == "ROUTES_TO").expect("route");
        assert_eq!(route.subject.canonical, "traefik");
        assert_eq!(route.object.canonical, "grafana");
    }

    #[test]
    fn passive_frame_swaps_arguments() {
        let rels = mine_text("grafana is proxied by traefik.");
        let route = rels.iter().find(|r| r.edge_tag == "ROUTES_TO").expect("route");
        assert_eq!(route.subject.canonical, "traefik");
        assert_eq!(route.object.canonical, "grafana");
    }

    #[test]
    fn no_relation_with_single_entity() {
        assert!(mine_text("Only nginx appears in this sentence.").is_empty());
    }

    #[test]
    fn distant_arguments_rejected() {
        let rels = mine_text(
            "nginx was mentioned once and then much much much later and far away someone said it depends on on on on postgres maybe",
        );
        // subject window is 8 tokens; nginx sits far from the verb.
        assert!(rels.iter().all(|r| r.subject.canonical != "nginx" || r.edge_tag != "DEPENDS_ON"));
    }
}
