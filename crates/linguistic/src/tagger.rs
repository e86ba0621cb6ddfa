//! Rule-based entity tagging over token attributes.
//!
//! Combines the fixed service vocabulary, the validated lexical patterns,
//! and orthographic rules (honorifics for people, legal suffixes for
//! organizations). The tagger only emits the type tags this tier is
//! authorized for; anything subtler is left to the downstream extractor.

use once_cell::sync::Lazy;
use std::collections::HashSet;

use deterministic::{lexicon, patterns};
use schema::tags::node;

use crate::token::{PosTag, Sentence};

/// An entity found in one sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedEntity {
    pub type_tag: &'static str,
    /// Canonicalized surface form (lowercased, alias-collapsed for services).
    pub canonical: String,
    pub sent_index: usize,
    /// Token index range `[start, end)` within the sentence.
    pub token_range: (usize, usize),
}

impl TaggedEntity {
    pub fn anchor(&self) -> usize {
        self.token_range.0
    }
}

static ORG_SUFFIXES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["inc", "labs", "gmbh", "ltd", "corp", "foundation", "software", "systems"]
        .into_iter()
        .collect()
});

static HONORIFICS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["mr", "mrs", "ms", "dr", "prof"].into_iter().collect());

/// Tag all entities in a sentence.
pub fn tag_sentence(sentence: &Sentence) -> Vec<TaggedEntity> {
    let mut entities = Vec::new();
    let mut claimed_tokens: HashSet<usize> = HashSet::new();

    // Vocabulary services and proxies.
    for hit in lexicon::scan(&sentence.text) {
        if let Some(range) = token_range_for_span(sentence, hit.span) {
            claim(&mut claimed_tokens, range);
            entities.push(TaggedEntity {
                type_tag: hit.type_tag,
                canonical: hit.canonical.to_string(),
                sent_index: sentence.index,
                token_range: range,
            });
        }
    }

    // Validated literals: IPs, host:port, FQDNs. host:port outranks the bare
    // FQDN nested inside it, so order hits by specificity first.
    let mut pattern_hits = patterns::scan(&sentence.text);
    pattern_hits.sort_by_key(|h| match h.kind {
        patterns::PatternKind::HostPort { .. } => 0u8,
        patterns::PatternKind::Ipv4 { .. } | patterns::PatternKind::Cidr { .. } => 1,
        _ => 2,
    });
    for hit in pattern_hits {
        let (tag, canonical) = match hit.kind {
            patterns::PatternKind::Ipv4 { address } => (node::IP_ADDRESS, address),
            patterns::PatternKind::HostPort { host, port } => {
                (node::UPSTREAM, format!("{host}:{port}"))
            }
            patterns::PatternKind::Fqdn { name } => (node::HOST, name),
            _ => continue,
        };
        if let Some(range) = token_range_for_span(sentence, hit.span) {
            if overlaps_claimed(&claimed_tokens, range) {
                continue;
            }
            claim(&mut claimed_tokens, range);
            entities.push(TaggedEntity {
                type_tag: tag,
                canonical,
                sent_index: sentence.index,
                token_range: range,
            });
        }
    }

    // People: honorific followed by proper nouns.
    let tokens = &sentence.tokens;
    let mut i = 0;
    while i < tokens.len() {
        if HONORIFICS.contains(tokens[i].lower.trim_end_matches('.')) {
            let mut j = i + 1;
            while j < tokens.len() && tokens[j].pos == PosTag::ProperNoun {
                j += 1;
            }
            if j > i + 1 && !overlaps_claimed(&claimed_tokens, (i, j)) {
                let name = tokens[i + 1..j]
                    .iter()
                    .map(|t| t.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                claim(&mut claimed_tokens, (i, j));
                entities.push(TaggedEntity {
                    type_tag: node::PERSON,
                    canonical: name,
                    sent_index: sentence.index,
                    token_range: (i, j),
                });
                i = j;
                continue;
            }
        }
        i += 1;
    }

    // Organizations: proper-noun run ending in a legal suffix.
    let mut i = 0;
    while i < tokens.len() {
        if tokens[i].pos == PosTag::ProperNoun && !claimed_tokens.contains(&i) {
            let mut j = i + 1;
            while j < tokens.len() && tokens[j].pos == PosTag::ProperNoun {
                j += 1;
            }
            let last = &tokens[j - 1];
            if j > i && ORG_SUFFIXES.contains(last.lower.trim_end_matches('.')) {
                let name = tokens[i..j]
                    .iter()
                    .map(|t| t.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                claim(&mut claimed_tokens, (i, j));
                entities.push(TaggedEntity {
                    type_tag: node::ORGANIZATION,
                    canonical: name,
                    sent_index: sentence.index,
                    token_range: (i, j),
                });
            }
            i = j;
            continue;
        }
        i += 1;
    }

    entities.sort_by_key(|e| e.token_range);
    entities
}

fn token_range_for_span(sentence: &Sentence, span: (usize, usize)) -> Option<(usize, usize)> {
    let mut start = None;
    let mut end = None;
    for token in &sentence.tokens {
        if token.span.1 > span.0 && token.span.0 < span.1 {
            if start.is_none() {
                start = Some(token.index);
            }
            end = Some(token.index + 1);
        }
    }
    match (start, end) {
        (Some(s), Some(e)) => Some((s, e)),
        _ => None,
    }
}

fn claim(claimed: &mut HashSet<usize>, range: (usize, usize)) {
    for i in range.0..range.1 {
        claimed.insert(i);
    }
}

fn overlaps_claimed(claimed: &HashSet<usize>, range: (usize, usize)) -> bool {
    (range.0..range.1).any(|i| claimed.contains(&i))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::split_sentences;

    fn tag(text: &str) -> Vec<TaggedEntity> {
        let sentences = split_sentences(text);
        tag_sentence(&sentences[0])
    }

    #[test]
    fn tags_services_and_ips() {
        let entities = tag("The nginx service at 10.0.0.1 depends on postgres for caching.");
        let tags: Vec<(&str, &str)> = entities
            .iter()
            .map(|e| (e.type_tag, e.canonical.as_str()))
            .collect();
        assert!(tags.contains(&("Service", "nginx")));
        assert!(tags.contains(&("IpAddress", "10.0.0.1")));
        assert!(tags.contains(&("Service", "postgres")));
    }

    #[test]
    fn tags_host_port_as_upstream() {
        let entities = tag("Traefik routes traffic to api.internal:8080 today.");
        assert!(entities
            .iter()
            .any(|e| e.type_tag == "Upstream" && e.canonical == "api.internal:8080"));
        assert!(entities.iter().any(|e| e.type_tag == "ReverseProxy"));
    }

    #[test]
    fn tags_people_after_honorific() {
        let entities = tag("Dr Ada Lovelace maintains the cluster.");
        assert!(entities
            .iter()
            .any(|e| e.type_tag == "Person" && e.canonical == "Ada Lovelace"));
    }

    #[test]
    fn tags_org_with_legal_suffix() {
        let entities = tag("We license the scanner from Initech Labs every year.");
        assert!(entities
            .iter()
            .any(|e| e.type_tag == "Organization" && e.canonical == "Initech Labs"));
    }

    #[test]
    fn plain_prose_has_no_entities() {
        assert!(tag("Nothing interesting happens here today.").is_empty());
    }
}
