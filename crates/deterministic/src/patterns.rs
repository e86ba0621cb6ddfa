//! High-precision lexical patterns: IP literals, CIDR blocks, host:port
//! pairs, URLs, FQDNs. Every numeric capture is range-validated before a hit
//! is emitted, so `999.1.1.1` and `:70000` never reach the graph.

use once_cell::sync::Lazy;
use regex::Regex;

static IPV4: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})\b").expect("ipv4 regex")
});

static CIDR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})/(\d{1,3})\b").expect("cidr regex")
});

static HOST_PORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([a-zA-Z0-9][a-zA-Z0-9._-]*):(\d{1,5})\b").expect("host:port regex")
});

static URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bhttps?://[^\s<>'\x22)\]]+").expect("url regex")
});

static FQDN: Lazy<Regex> = Lazy::new(|| {
    // Two or more labels ending in an alphabetic TLD. Version strings like
    // `1.2.3` fail the TLD requirement.
    Regex::new(r"\b([a-zA-Z0-9][a-zA-Z0-9-]*\.)+[a-zA-Z]{2,}\b").expect("fqdn regex")
});

/// What a pattern hit denotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternKind {
    Ipv4 { address: String },
    Cidr { network: String, mask: u8 },
    HostPort { host: String, port: u16 },
    Url { url: String },
    Fqdn { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternHit {
    pub kind: PatternKind,
    pub span: (usize, usize),
}

pub fn valid_ipv4(s: &str) -> bool {
    let mut octets = 0;
    for part in s.split('.') {
        match part.parse::<u16>() {
            Ok(v) if v <= 255 && !(part.len() > 1 && part.starts_with('0')) => octets += 1,
            _ => return false,
        }
    }
    octets == 4
}

pub fn valid_port(p: u32) -> bool {
    (1..=65535).contains(&p)
}

pub fn valid_cidr_mask(mask: u32, v6: bool) -> bool {
    if v6 {
        mask <= 128
    } else {
        mask <= 32
    }
}

/// Scan text for all pattern families. CIDR hits suppress the bare IPv4 hit
/// on the same network address; URL hits suppress FQDN hits inside them.
pub fn scan(text: &str) -> Vec<PatternHit> {
    let mut hits: Vec<PatternHit> = Vec::new();
    let mut claimed: Vec<(usize, usize)> = Vec::new();

    for cap in CIDR.captures_iter(text) {
        let whole = cap.get(0).expect("cidr match");
        let network = &cap[1];
        let mask: u32 = cap[2].parse().unwrap_or(u32::MAX);
        if valid_ipv4(network) && valid_cidr_mask(mask, false) {
            claimed.push((whole.start(), whole.end()));
            hits.push(PatternHit {
                kind: PatternKind::Cidr {
                    network: network.to_string(),
                    mask: mask as u8,
                },
                span: (whole.start(), whole.end()),
            });
        }
    }

    for cap in URL.captures_iter(text) {
        let whole = cap.get(0).expect("url match");
        let url = whole.as_str().trim_end_matches(['.', ',', ';']);
        claimed.push((whole.start(), whole.start() + url.len()));
        hits.push(PatternHit {
            kind: PatternKind::Url {
                url: url.to_string(),
            },
            span: (whole.start(), whole.start() + url.len()),
        });
    }

    for cap in IPV4.captures_iter(text) {
        let whole = cap.get(0).expect("ipv4 match");
        if overlaps(&claimed, whole.start(), whole.end()) {
            continue;
        }
        if valid_ipv4(whole.as_str()) {
            hits.push(PatternHit {
                kind: PatternKind::Ipv4 {
                    address: whole.as_str().to_string(),
                },
                span: (whole.start(), whole.end()),
            });
        }
    }

    for cap in HOST_PORT.captures_iter(text) {
        let whole = cap.get(0).expect("host:port match");
        let port: u32 = cap[2].parse().unwrap_or(0);
        if !valid_port(port) {
            continue;
        }
        let host = cap[1].to_string();
        // Skip the scheme half of URLs (`http://...` is not host:port).
        if host.eq_ignore_ascii_case("http") || host.eq_ignore_ascii_case("https") {
            continue;
        }
        if overlaps(&claimed, whole.start(), whole.end()) {
            continue;
        }
        hits.push(PatternHit {
            kind: PatternKind::HostPort {
                host,
                port: port as u16,
            },
            span: (whole.start(), whole.end()),
        });
    }

    for cap in FQDN.captures_iter(text) {
        let whole = cap.get(0).expect("fqdn match");
        if overlaps(&claimed, whole.start(), whole.end()) {
            continue;
        }
        // Bare IPs already matched above; the alpha-TLD rule filters them.
        hits.push(PatternHit {
            kind: PatternKind::Fqdn {
                name: whole.as_str().to_ascii_lowercase(),
            },
            span: (whole.start(), whole.end()),
        });
    }

    hits.sort_by_key(|h| h.span);
    hits
}

fn overlaps(claimed: &[(usize, usize)], start: usize, end: usize) -> bool {
    claimed.iter().any(|&(s, e)| start < e && s < end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_octets_validated() {
        assert!(valid_ipv4("10.0.0.1"));
        assert!(valid_ipv4("255.255.255.255"));
        assert!(!valid_ipv4("256.1.1.1"));
        assert!(!valid_ipv4("10.0.0"));
        assert!(!valid_ipv4("10.00.0.1"));
    }

    #[test]
    fn scan_finds_ip_and_port() {
        let hits = scan("bind nginx to 10.0.0.1 and expose api.internal:8080");
        assert!(hits.iter().any(|h| matches!(
            &h.kind,
            PatternKind::Ipv4 { address } if address == "10.0.0.1"
        )));
        assert!(hits.iter().any(|h| matches!(
            &h.kind,
            PatternKind::HostPort { host, port } if host == "api.internal" && *port == 8080
        )));
    }

    #[test]
    fn invalid_port_dropped() {
        let hits = scan("listen on host:70000 please");
        assert!(!hits
            .iter()
            .any(|h| matches!(h.kind, PatternKind::HostPort { .. })));
    }

    #[test]
    fn cidr_suppresses_bare_ip() {
        let hits = scan("the lan is 192.168.1.0/24 today");
        assert_eq!(
            hits.iter()
                .filter(|h| matches!(h.kind, PatternKind::Cidr { .. }))
                .count(),
            1
        );
        assert!(!hits.iter().any(|h| matches!(h.kind, PatternKind::Ipv4 { .. })));
    }

    #[test]
    fn cidr_mask_validated() {
        assert!(scan("10.0.0.0/33 is nonsense")
            .iter()
            .all(|h| !matches!(h.kind, PatternKind::Cidr { .. })));
    }

    #[test]
    fn url_suppresses_inner_fqdn() {
        let hits = scan("see https://docs.example.com/guide for details");
        assert!(hits.iter().any(|h| matches!(h.kind, PatternKind::Url { .. })));
        assert!(!hits.iter().any(|h| matches!(h.kind, PatternKind::Fqdn { .. })));
    }

    #[test]
    fn fqdn_matches_bare_hostnames() {
        let hits = scan("api.internal.lan answers on the vlan");
        assert!(hits.iter().any(|h| matches!(
            &h.kind,
            PatternKind::Fqdn { name } if name == "api.internal.lan"
        )));
    }
}
