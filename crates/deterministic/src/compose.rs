//! Shape matchers for embedded structured blocks.
//!
//! Two families are recognized today: Docker-Compose documents (top-level
//! `services:`) and reverse-proxy dynamic configs (`http.routers` /
//! `http.services` in the Traefik layout). Anything else is walked for
//! generic host/port literals by the pattern scanner, not here.

use std::collections::BTreeMap;

use serde_yaml::Value;

use schema::tags::{edge, node};
use schema::{EdgeRecord, NodeRecord, NodeRef, PropValue, Tier, TriplePacket};

use crate::patterns::valid_port;
use crate::EXTRACTOR_VERSION;

/// Outcome of one embedded block.
pub enum BlockOutcome {
    /// Block matched a known shape and produced triples.
    Extracted(TriplePacket),
    /// Block parsed but matched no known shape.
    Unrecognized,
    /// Block failed to parse; carries the warning recorded against it.
    Malformed(String),
}

/// Try every known shape against a raw block.
pub fn extract_block(doc_id: &str, language: Option<&str>, raw: &str) -> BlockOutcome {
    let parsed: Result<Value, _> = match language {
        Some("json") => serde_json::from_str::<serde_json::Value>(raw)
            .map(|v| serde_yaml::to_value(v).unwrap_or(Value::Null))
            .map_err(|e| e.to_string()),
        _ => serde_yaml::from_str(raw).map_err(|e| e.to_string()),
    };

    let value = match parsed {
        Ok(v) => v,
        Err(e) => return BlockOutcome::Malformed(e),
    };

    if let Some(services) = value.get("services").and_then(Value::as_mapping) {
        if value.get("http").is_none() {
            return BlockOutcome::Extracted(extract_compose(doc_id, services, &value));
        }
    }
    if let Some(http) = value.get("http") {
        if http.get("routers").is_some() || http.get("services").is_some() {
            return BlockOutcome::Extracted(extract_proxy(doc_id, http));
        }
    }
    BlockOutcome::Unrecognized
}

fn str_of(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn service_node(name: &str) -> NodeRecord {
    NodeRecord::new(node::SERVICE, vec![name.to_string()], Tier::A, 1.0)
        .with_prop("name", name)
}

fn edge_a(tag: &str, src: NodeRef, dst: NodeRef, doc_id: &str) -> EdgeRecord {
    EdgeRecord::new(tag, src, dst, doc_id, EXTRACTOR_VERSION, Tier::A, 1.0)
}

/// Walk a compose `services` mapping: image, ports, environment, volumes,
/// networks, depends_on.
fn extract_compose(
    doc_id: &str,
    services: &serde_yaml::Mapping,
    root: &Value,
) -> TriplePacket {
    let mut packet = TriplePacket::default();

    for (raw_name, body) in services {
        let Some(name) = str_of(raw_name) else { continue };
        let service_ref = NodeRef::new(node::SERVICE, vec![name.clone()]);
        let mut svc = service_node(&name);

        if let Some(image) = body.get("image").and_then(str_of) {
            svc = svc.with_prop("image", image.clone());
            let container_ref = NodeRef::new(node::CONTAINER, vec![name.clone()]);
            packet.push_node(
                NodeRecord::new(node::CONTAINER, vec![name.clone()], Tier::A, 1.0)
                    .with_prop("name", name.as_str())
                    .with_prop("image", image),
            );
            packet.push_edge(edge_a(edge::RUNS, service_ref.clone(), container_ref, doc_id));
        }

        if let Some(ports) = body.get("ports").and_then(Value::as_sequence) {
            for port_spec in ports.iter().filter_map(str_of) {
                if let Some((host_port, container_port)) = split_port_mapping(&port_spec) {
                    let upstream_ref =
                        NodeRef::new(node::UPSTREAM, vec![format!("{name}:{container_port}")]);
                    packet.push_node(
                        NodeRecord::new(
                            node::UPSTREAM,
                            vec![format!("{name}:{container_port}")],
                            Tier::A,
                            1.0,
                        )
                        .with_prop("address", format!("{name}:{container_port}"))
                        .with_prop("port", i64::from(container_port)),
                    );
                    packet.push_edge(
                        edge_a(edge::EXPOSES, service_ref.clone(), upstream_ref, doc_id)
                            .with_prop("port", i64::from(host_port)),
                    );
                }
            }
        }

        if let Some(env) = body.get("environment") {
            let vars = collect_env(env);
            if !vars.is_empty() {
                svc = svc.with_prop("env", PropValue::StrList(vars));
            }
        }

        if let Some(volumes) = body.get("volumes").and_then(Value::as_sequence) {
            for volume_spec in volumes.iter().filter_map(str_of) {
                let (vol_name, target) = split_volume_mapping(&volume_spec);
                // Bind mounts (paths) are files, not named volumes.
                if vol_name.starts_with('/') || vol_name.starts_with('.') {
                    continue;
                }
                let vol_ref = NodeRef::new(node::VOLUME, vec![vol_name.clone()]);
                packet.push_node(
                    NodeRecord::new(node::VOLUME, vec![vol_name.clone()], Tier::A, 1.0)
                        .with_prop("name", vol_name),
                );
                let mut e = edge_a(edge::MOUNTS, service_ref.clone(), vol_ref, doc_id);
                if let Some(target) = target {
                    e = e.with_prop("target", target);
                }
                packet.push_edge(e);
            }
        }

        if let Some(networks) = body.get("networks") {
            for net in network_names(networks) {
                let net_ref = NodeRef::new(node::COMPOSE_NETWORK, vec![net.clone()]);
                packet.push_node(
                    NodeRecord::new(node::COMPOSE_NETWORK, vec![net.clone()], Tier::A, 1.0)
                        .with_prop("name", net),
                );
                packet.push_edge(edge_a(edge::ATTACHED_TO, service_ref.clone(), net_ref, doc_id));
            }
        }

        match body.get("depends_on") {
            Some(Value::Sequence(deps)) => {
                for dep in deps.iter().filter_map(str_of) {
                    let dep_ref = NodeRef::new(node::SERVICE, vec![dep.clone()]);
                    packet.push_node(service_node(&dep));
                    packet.push_edge(edge_a(
                        edge::DEPENDS_ON,
                        service_ref.clone(),
                        dep_ref,
                        doc_id,
                    ));
                }
            }
            Some(Value::Mapping(deps)) => {
                // Long form: `depends_on: {db: {condition: service_healthy}}`.
                for (dep, spec) in deps {
                    let Some(dep) = str_of(dep) else { continue };
                    let dep_ref = NodeRef::new(node::SERVICE, vec![dep.clone()]);
                    packet.push_node(service_node(&dep));
                    let mut e = edge_a(edge::DEPENDS_ON, service_ref.clone(), dep_ref, doc_id);
                    if let Some(cond) = spec.get("condition").and_then(str_of) {
                        e = e.with_prop("condition", cond);
                    }
                    packet.push_edge(e);
                }
            }
            _ => {}
        }

        packet.push_node(svc);
    }

    // Top-level network and volume declarations.
    if let Some(networks) = root.get("networks").and_then(Value::as_mapping) {
        for (net, body) in networks {
            let Some(net) = str_of(net) else { continue };
            let mut n = NodeRecord::new(node::COMPOSE_NETWORK, vec![net.clone()], Tier::A, 1.0)
                .with_prop("name", net);
            if let Some(driver) = body.get("driver").and_then(str_of) {
                n = n.with_prop("driver", driver);
            }
            packet.push_node(n);
        }
    }
    if let Some(volumes) = root.get("volumes").and_then(Value::as_mapping) {
        for (vol, _) in volumes {
            let Some(vol) = str_of(vol) else { continue };
            packet.push_node(
                NodeRecord::new(node::VOLUME, vec![vol.clone()], Tier::A, 1.0)
                    .with_prop("name", vol),
            );
        }
    }

    packet
}

/// Walk a Traefik-layout dynamic config: routers bind rules to services,
/// services carry load-balancer server URLs.
fn extract_proxy(doc_id: &str, http: &Value) -> TriplePacket {
    let mut packet = TriplePacket::default();
    let proxy_name = "traefik";
    let proxy_ref = NodeRef::new(node::REVERSE_PROXY, vec![proxy_name.to_string()]);
    packet.push_node(
        NodeRecord::new(node::REVERSE_PROXY, vec![proxy_name.to_string()], Tier::A, 1.0)
            .with_prop("name", proxy_name)
            .with_prop("kind", "traefik"),
    );

    // Map router -> backend service name so routes connect to upstreams.
    let mut router_targets: BTreeMap<String, String> = BTreeMap::new();

    if let Some(routers) = http.get("routers").and_then(Value::as_mapping) {
        for (router, body) in routers {
            let Some(router) = str_of(router) else { continue };
            let rule = body.get("rule").and_then(str_of).unwrap_or_default();
            let route_ref =
                NodeRef::new(node::ROUTE, vec![proxy_name.to_string(), rule.clone()]);
            let mut route =
                NodeRecord::new(node::ROUTE, vec![proxy_name.to_string(), rule.clone()], Tier::A, 1.0)
                    .with_prop("proxy", proxy_name)
                    .with_prop("rule", rule.clone());
            if let Some(entrypoints) = body.get("entryPoints").and_then(Value::as_sequence) {
                let eps: Vec<String> = entrypoints.iter().filter_map(str_of).collect();
                route = route.with_prop("entrypoints", PropValue::StrList(eps));
            }
            packet.push_node(route);
            packet.push_edge(edge_a(edge::PROXIES, proxy_ref.clone(), route_ref, doc_id));

            if let Some(target) = body.get("service").and_then(str_of) {
                router_targets.insert(router, target);
            }
        }
    }

    let mut declared: Vec<String> = Vec::new();
    if let Some(services) = http.get("services").and_then(Value::as_mapping) {
        for (svc, body) in services {
            let Some(svc) = str_of(svc) else { continue };
            declared.push(svc.clone());
            let svc_ref = NodeRef::new(node::SERVICE, vec![svc.clone()]);
            packet.push_node(service_node(&svc));

            let servers = body
                .get("loadBalancer")
                .and_then(|lb| lb.get("servers"))
                .and_then(Value::as_sequence);
            if let Some(servers) = servers {
                for server in servers {
                    let Some(url) = server.get("url").and_then(str_of) else { continue };
                    let (host, port) = host_port_of_url(&url);
                    let address = match port {
                        Some(p) => format!("{host}:{p}"),
                        None => host.clone(),
                    };
                    let upstream_ref = NodeRef::new(node::UPSTREAM, vec![address.clone()]);
                    let mut upstream =
                        NodeRecord::new(node::UPSTREAM, vec![address.clone()], Tier::A, 1.0)
                            .with_prop("address", address);
                    if let Some(p) = port {
                        upstream = upstream.with_prop("port", i64::from(p));
                    }
                    packet.push_node(upstream);

                    let mut e =
                        edge_a(edge::ROUTES_TO, proxy_ref.clone(), svc_ref.clone(), doc_id)
                            .with_prop("host", host);
                    if let Some(p) = port {
                        e = e.with_prop("port", i64::from(p));
                    }
                    packet.push_edge(e);
                }
            }
        }
    }

    // Routers pointing at services this block never declares still yield a
    // route; the writer will stub the missing endpoint.
    for target in router_targets.values() {
        if declared.contains(target) {
            continue;
        }
        let svc_ref = NodeRef::new(node::SERVICE, vec![target.clone()]);
        packet.push_node(service_node(target));
        packet.push_edge(edge_a(edge::ROUTES_TO, proxy_ref.clone(), svc_ref, doc_id));
    }

    packet
}

/// `"8080:80"` -> (8080, 80); `"80"` -> (80, 80). Protocol suffixes and
/// bind addresses are tolerated.
fn split_port_mapping(spec: &str) -> Option<(u16, u16)> {
    let spec = spec.split('/').next().unwrap_or(spec);
    let parts: Vec<&str> = spec.split(':').collect();
    let (host, container) = match parts.as_slice() {
        [one] => (*one, *one),
        [host, container] => (*host, *container),
        // `ip:host:container` form
        [_, host, container] => (*host, *container),
        _ => return None,
    };
    let host: u32 = host.parse().ok()?;
    let container: u32 = container.parse().ok()?;
    (valid_port(host) && valid_port(container)).then_some((host as u16, container as u16))
}

/// `"data:/var/lib/data:ro"` -> ("data", Some("/var/lib/data")).
fn split_volume_mapping(spec: &str) -> (String, Option<String>) {
    let mut parts = spec.splitn(3, ':');
    let name = parts.next().unwrap_or(spec).to_string();
    (name, parts.next().map(|s| s.to_string()))
}

fn collect_env(env: &Value) -> Vec<String> {
    match env {
        Value::Sequence(items) => items
            .iter()
            .filter_map(str_of)
            .map(|kv| kv.split('=').next().unwrap_or(&kv).to_string())
            .collect(),
        Value::Mapping(map) => map.keys().filter_map(str_of).collect(),
        _ => Vec::new(),
    }
}

fn network_names(networks: &Value) -> Vec<String> {
    match networks {
        Value::Sequence(items) => items.iter().filter_map(str_of).collect(),
        Value::Mapping(map) => map.keys().filter_map(str_of).collect(),
        _ => Vec::new(),
    }
}

fn host_port_of_url(url: &str) -> (String, Option<u16>) {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .unwrap_or(url);
    let authority = rest.split('/').next().unwrap_or(rest);
    match authority.rsplit_once(':') {
        Some((host, port)) => match port.parse::<u32>() {
            Ok(p) if valid_port(p) => (host.to_string(), Some(p as u16)),
            _ => (authority.to_string(), None),
        },
        None => (authority.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPOSE: &str = r#"
services:
  api:
    image: registry.local/api:1.4
    ports:
      - "8080:3000"
    environment:
      - DATABASE_URL=postgres://db/app
    depends_on:
      - db
    networks:
      - backend
  db:
    image: postgres:16
    volumes:
      - pgdata:/var/lib/postgresql/data
networks:
  backend:
    driver: bridge
volumes:
  pgdata: {}
"#;

    #[test]
    fn compose_yields_depends_on() {
        let BlockOutcome::Extracted(packet) = extract_block("doc-1", Some("yaml"), COMPOSE)
        else {
            panic!("compose should extract");
        };

        let dep = packet
            .edges
            .iter()
            .find(|e| e.type_tag == "DEPENDS_ON")
            .expect("dependency edge");
        assert_eq!(dep.src.uid(), "Service:api");
        assert_eq!(dep.dst.uid(), "Service:db");
        assert_eq!(dep.tier, Tier::A);
        assert_eq!(dep.confidence, 1.0);
    }

    #[test]
    fn compose_yields_containers_and_volumes() {
        let BlockOutcome::Extracted(packet) = extract_block("doc-1", Some("yaml"), COMPOSE)
        else {
            panic!("compose should extract");
        };

        assert!(packet.nodes.iter().any(|n| n.type_tag == "Container"));
        assert!(packet
            .nodes
            .iter()
            .any(|n| n.type_tag == "Volume" && n.natural_key == vec!["pgdata".to_string()]));
        assert!(packet.edges.iter().any(|e| e.type_tag == "MOUNTS"));
        assert!(packet.edges.iter().any(|e| e.type_tag == "EXPOSES"
            && e.props.get("port") == Some(&PropValue::Int(8080))));
    }

    #[test]
    fn long_form_depends_on_carries_condition() {
        let yaml = r#"
services:
  api:
    depends_on:
      db:
        condition: service_healthy
"#;
        let BlockOutcome::Extracted(packet) = extract_block("doc-2", None, yaml) else {
            panic!("should extract");
        };
        let dep = packet.edges.iter().find(|e| e.type_tag == "DEPENDS_ON").unwrap();
        assert_eq!(
            dep.props.get("condition"),
            Some(&PropValue::Str("service_healthy".into()))
        );
    }

    #[test]
    fn traefik_routers_yield_routes() {
        let yaml = r#"
http:
  routers:
    api-router:
      rule: "Host(`api.internal`)"
      entryPoints: [websecure]
      service: backend-api
  services:
    backend-api:
      loadBalancer:
        servers:
          - url: "http://api.internal:8080"
"#;
        let BlockOutcome::Extracted(packet) = extract_block("doc-3", Some("yaml"), yaml) else {
            panic!("should extract");
        };
        let route = packet
            .edges
            .iter()
            .find(|e| e.type_tag == "ROUTES_TO")
            .expect("route edge");
        assert_eq!(route.src.uid(), "ReverseProxy:traefik");
        assert_eq!(route.props.get("host"), Some(&PropValue::Str("api.internal".into())));
        assert_eq!(route.props.get("port"), Some(&PropValue::Int(8080)));
    }

    #[test]
    fn malformed_block_reports_not_panics() {
        let out = extract_block("doc-4", Some("yaml"), "services:\n  - [unclosed");
        assert!(matches!(out, BlockOutcome::Malformed(_)));
    }

    #[test]
    fn unknown_shape_is_unrecognized() {
        let out = extract_block("doc-5", Some("yaml"), "just: a\nrandom: map");
        assert!(matches!(out, BlockOutcome::Unrecognized));
    }

    #[test]
    fn port_mapping_forms() {
        assert_eq!(split_port_mapping("8080:80"), Some((8080, 80)));
        assert_eq!(split_port_mapping("80"), Some((80, 80)));
        assert_eq!(split_port_mapping("127.0.0.1:8080:80"), Some((8080, 80)));
        assert_eq!(split_port_mapping("8080:80/tcp"), Some((8080, 80)));
        assert_eq!(split_port_mapping("0:80"), None);
    }
}
