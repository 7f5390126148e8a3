//! Benchmarks for the per-turn hot path: content normalization, validation
//! and wire encoding.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

use gemini_live_relay::config::ConversationConfig;
use gemini_live_relay::conversation::{normalize, prepare, ConversationTurn, Role, TurnContent};
use gemini_live_relay::upstream::wire::encode_turn;
use gemini_live_relay::upstream::OutgoingTurn;

fn mixed_content() -> TurnContent {
    serde_json::from_value(json!([
        { "type": "text", "text": "Describe both pictures." },
        { "type": "image_url", "image_url": { "url": "https://example.com/a.png", "mimeType": "image/png" } },
        { "type": "image_url", "image_url": { "data": "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk" } },
        { "type": "text", "text": "Which one is brighter?" }
    ]))
    .unwrap()
}

fn bench_normalize(c: &mut Criterion) {
    let content = mixed_content();

    c.bench_function("normalize_mixed_4_parts", |b| {
        b.iter(|| black_box(normalize(black_box(&content))))
    });
}

fn bench_prepare_long_history(c: &mut Criterion) {
    // 255 history turns plus the final user turn.
    let turns: Vec<ConversationTurn> = (0..256)
        .map(|i| {
            if i % 2 == 0 {
                ConversationTurn::user(format!("question {i}"))
            } else {
                ConversationTurn::model(format!("answer {i}"))
            }
        })
        .collect();
    let rules = ConversationConfig::default();

    c.bench_function("prepare_256_turns", |b| {
        b.iter(|| black_box(prepare(black_box(&turns), &rules).unwrap()))
    });
}

fn bench_encode_turn(c: &mut Criterion) {
    let parts = normalize(&mixed_content());

    c.bench_function("encode_turn_mixed_4_parts", |b| {
        b.iter(|| {
            let outgoing = OutgoingTurn {
                role: Role::User,
                parts: &parts,
                end_of_turn: true,
            };
            black_box(encode_turn(black_box(&outgoing)).unwrap())
        })
    });
}

criterion_group!(
    benches,
    bench_normalize,
    bench_prepare_long_history,
    bench_encode_turn,
);
criterion_main!(benches);
