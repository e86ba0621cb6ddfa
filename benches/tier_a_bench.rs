//! Deterministic-extraction throughput. The contract is >=50 documents per
//! second on one core for typical documentation pages; run with
//! `cargo bench --bench tier_a_bench`.

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use tessera::deterministic::{self, DeterministicConfig};
use tessera::ingest::{hash::content_hash, NormalizedDocument, SourceType, SubStructure};

const COMPOSE: &str = r#"
services:
  api:
    image: registry.lan/api:4.2
    ports: ["8080:3000"]
    environment:
      - DATABASE_URL=postgres://db/app
      - REDIS_URL=redis://cache:6379
    depends_on: [db, cache]
    networks: [backend]
  db:
    image: postgres:16
    volumes: ["pgdata:/var/lib/postgresql/data"]
  cache:
    image: redis:7
networks:
  backend: {driver: bridge}
volumes:
  pgdata: {}
"#;

fn typical_page() -> NormalizedDocument {
    let prose = "The nginx service at 10.0.0.1 depends on postgres for caching. \
                 Traefik routes traffic to grafana on grafana.internal:3000. \
                 prometheus exposes metrics on 9090 and the whole lan is 192.168.1.0/24. "
        .repeat(20);
    NormalizedDocument {
        doc_id: "bench-doc".into(),
        source_type: SourceType::Web,
        source_url: Some("https://wiki.lan/bench".into()),
        ingested_at: Utc::now(),
        content_hash: content_hash(&prose),
        text: prose,
        sub_structures: vec![SubStructure {
            language: Some("yaml".into()),
            text: COMPOSE.into(),
            span: (0, COMPOSE.len()),
        }],
    }
}

fn bench_tier_a(c: &mut Criterion) {
    let doc = typical_page();
    let cfg = DeterministicConfig::default();
    c.bench_function("tier_a_typical_page", |b| {
        b.iter(|| deterministic::extract(black_box(&doc), black_box(&cfg)).unwrap())
    });
}

criterion_group!(benches, bench_tier_a);
criterion_main!(benches);
