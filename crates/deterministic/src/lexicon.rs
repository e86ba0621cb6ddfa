//! Known-entity vocabulary.
//!
//! A fixed dictionary of service, protocol, and vendor tokens compiled into
//! one Aho-Corasick automaton, so scanning stays linear in document length no
//! matter how large the vocabulary grows.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use once_cell::sync::Lazy;

use schema::tags::node;

/// Vocabulary entry: surface form, canonical name, node type tag.
pub struct LexiconEntry {
    pub surface: &'static str,
    pub canonical: &'static str,
    pub type_tag: &'static str,
}

macro_rules! entry {
    ($surface:literal => $canonical:literal, $tag:expr) => {
        LexiconEntry {
            surface: $surface,
            canonical: $canonical,
            type_tag: $tag,
        }
    };
}

/// The fixed vocabulary. Aliases map onto one canonical name so that
/// `postgresql` and `postgres` resolve to the same node.
pub static LEXICON: &[LexiconEntry] = &[
    entry!("nginx" => "nginx", node::SERVICE),
    entry!("apache" => "apache", node::SERVICE),
    entry!("httpd" => "apache", node::SERVICE),
    entry!("caddy" => "caddy", node::SERVICE),
    entry!("haproxy" => "haproxy", node::SERVICE),
    entry!("traefik" => "traefik", node::REVERSE_PROXY),
    entry!("swag" => "swag", node::REVERSE_PROXY),
    entry!("nginx proxy manager" => "nginx-proxy-manager", node::REVERSE_PROXY),
    entry!("envoy" => "envoy", node::REVERSE_PROXY),
    entry!("postgres" => "postgres", node::SERVICE),
    entry!("postgresql" => "postgres", node::SERVICE),
    entry!("mysql" => "mysql", node::SERVICE),
    entry!("mariadb" => "mariadb", node::SERVICE),
    entry!("mongodb" => "mongodb", node::SERVICE),
    entry!("mongo" => "mongodb", node::SERVICE),
    entry!("redis" => "redis", node::SERVICE),
    entry!("valkey" => "valkey", node::SERVICE),
    entry!("memcached" => "memcached", node::SERVICE),
    entry!("rabbitmq" => "rabbitmq", node::SERVICE),
    entry!("kafka" => "kafka", node::SERVICE),
    entry!("nats" => "nats", node::SERVICE),
    entry!("elasticsearch" => "elasticsearch", node::SERVICE),
    entry!("opensearch" => "opensearch", node::SERVICE),
    entry!("qdrant" => "qdrant", node::SERVICE),
    entry!("neo4j" => "neo4j", node::SERVICE),
    entry!("clickhouse" => "clickhouse", node::SERVICE),
    entry!("influxdb" => "influxdb", node::SERVICE),
    entry!("grafana" => "grafana", node::SERVICE),
    entry!("prometheus" => "prometheus", node::SERVICE),
    entry!("loki" => "loki", node::SERVICE),
    entry!("jaeger" => "jaeger", node::SERVICE),
    entry!("minio" => "minio", node::SERVICE),
    entry!("vault" => "vault", node::SERVICE),
    entry!("consul" => "consul", node::SERVICE),
    entry!("etcd" => "etcd", node::SERVICE),
    entry!("keycloak" => "keycloak", node::SERVICE),
    entry!("authelia" => "authelia", node::SERVICE),
    entry!("authentik" => "authentik", node::SERVICE),
    entry!("plex" => "plex", node::SERVICE),
    entry!("jellyfin" => "jellyfin", node::SERVICE),
    entry!("emby" => "emby", node::SERVICE),
    entry!("sonarr" => "sonarr", node::SERVICE),
    entry!("radarr" => "radarr", node::SERVICE),
    entry!("lidarr" => "lidarr", node::SERVICE),
    entry!("prowlarr" => "prowlarr", node::SERVICE),
    entry!("overseerr" => "overseerr", node::SERVICE),
    entry!("tautulli" => "tautulli", node::SERVICE),
    entry!("qbittorrent" => "qbittorrent", node::SERVICE),
    entry!("transmission" => "transmission", node::SERVICE),
    entry!("home assistant" => "home-assistant", node::SERVICE),
    entry!("homeassistant" => "home-assistant", node::SERVICE),
    entry!("pihole" => "pihole", node::SERVICE),
    entry!("pi-hole" => "pihole", node::SERVICE),
    entry!("adguard" => "adguard", node::SERVICE),
    entry!("unbound" => "unbound", node::SERVICE),
    entry!("wireguard" => "wireguard", node::SERVICE),
    entry!("openvpn" => "openvpn", node::SERVICE),
    entry!("tailscale" => "tailscale", node::SERVICE),
    entry!("headscale" => "headscale", node::SERVICE),
    entry!("nextcloud" => "nextcloud", node::SERVICE),
    entry!("syncthing" => "syncthing", node::SERVICE),
    entry!("gitea" => "gitea", node::SERVICE),
    entry!("gitlab" => "gitlab", node::SERVICE),
    entry!("jenkins" => "jenkins", node::SERVICE),
    entry!("drone" => "drone", node::SERVICE),
    entry!("portainer" => "portainer", node::SERVICE),
    entry!("watchtower" => "watchtower", node::SERVICE),
    entry!("docker" => "docker", node::SERVICE),
    entry!("kubernetes" => "kubernetes", node::SERVICE),
    entry!("k8s" => "kubernetes", node::SERVICE),
    entry!("k3s" => "k3s", node::SERVICE),
    entry!("ollama" => "ollama", node::SERVICE),
    entry!("vllm" => "vllm", node::SERVICE),
    entry!("unifi" => "unifi", node::SERVICE),
    entry!("mosquitto" => "mosquitto", node::SERVICE),
    entry!("zigbee2mqtt" => "zigbee2mqtt", node::SERVICE),
    entry!("frigate" => "frigate", node::SERVICE),
    entry!("immich" => "immich", node::SERVICE),
    entry!("paperless" => "paperless", node::SERVICE),
    entry!("vaultwarden" => "vaultwarden", node::SERVICE),
    entry!("uptime kuma" => "uptime-kuma", node::SERVICE),
    entry!("mealie" => "mealie", node::SERVICE),
];

static AUTOMATON: Lazy<AhoCorasick> = Lazy::new(|| {
    let patterns: Vec<&str> = LEXICON.iter().map(|e| e.surface).collect();
    AhoCorasickBuilder::new()
        .ascii_case_insensitive(true)
        .match_kind(MatchKind::LeftmostLongest)
        .build(&patterns)
        .expect("lexicon automaton builds from static patterns")
});

/// A vocabulary hit inside free text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexiconHit {
    pub canonical: &'static str,
    pub type_tag: &'static str,
    pub span: (usize, usize),
}

/// Scan text for vocabulary entries. Matches must sit on word boundaries so
/// `redis` does not fire inside `predispose`.
pub fn scan(text: &str) -> Vec<LexiconHit> {
    let bytes = text.as_bytes();
    AUTOMATON
        .find_iter(text)
        .filter(|m| {
            let before_ok = m.start() == 0
                || !bytes[m.start() - 1].is_ascii_alphanumeric();
            let after_ok = m.end() >= bytes.len()
                || !(bytes[m.end()].is_ascii_alphanumeric() || bytes[m.end()] == b'-');
            before_ok && after_ok
        })
        .map(|m| {
            let entry = &LEXICON[m.pattern().as_usize()];
            LexiconHit {
                canonical: entry.canonical,
                type_tag: entry.type_tag,
                span: (m.start(), m.end()),
            }
        })
        .collect()
}

/// Resolve one surface form to its lexicon entry, if present.
pub fn lookup(surface: &str) -> Option<&'static LexiconEntry> {
    let lowered = surface.to_ascii_lowercase();
    LEXICON.iter().find(|e| e.surface == lowered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_finds_known_services() {
        let hits = scan("We run nginx in front of Postgres and redis.");
        let names: Vec<&str> = hits.iter().map(|h| h.canonical).collect();
        assert_eq!(names, vec!["nginx", "postgres", "redis"]);
    }

    #[test]
    fn aliases_share_a_canonical_name() {
        let a = scan("postgresql is great");
        let b = scan("postgres is great");
        assert_eq!(a[0].canonical, b[0].canonical);
    }

    #[test]
    fn no_match_inside_words() {
        assert!(scan("predispose the redistribution").is_empty());
    }

    #[test]
    fn longest_match_wins() {
        let hits = scan("behind nginx proxy manager today");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].canonical, "nginx-proxy-manager");
    }

    #[test]
    fn case_insensitive() {
        let hits = scan("TRAEFIK routes everything");
        assert_eq!(hits[0].canonical, "traefik");
        assert_eq!(hits[0].type_tag, "ReverseProxy");
    }

    #[test]
    fn lookup_resolves_alias() {
        assert_eq!(lookup("K8S").unwrap().canonical, "kubernetes");
        assert!(lookup("fortran").is_none());
    }
}
