//! Ranking and tagging throughput on synthetic search batches
//!
//! Batch sizes mirror a few result pages (15 items each) up to a merged
//! multi-query run.

use chrono::Utc;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use market_scout::application::{RankingEngine, TagEnricher};
use market_scout::domain::{Condition, ProductRecord, QueryInput};

const TITLES: &[&str] = &[
    "iPhone 14 Pro 128GB スペースブラック",
    "Nintendo Switch 有機ELモデル ホワイト",
    "AirPods Pro 第2世代 MagSafe",
    "MacBook Air M2 8GB 256GB",
    "PlayStation 5 デジタルエディション",
    "Pokemon cards ポケモンカード まとめ売り",
    "Supreme Box Logo Hooded Sweatshirt XL black",
    "Louis Vuitton ネヴァーフル MM",
];

const CONDITIONS: &[Condition] = &[
    Condition::New,
    Condition::LikeNew,
    Condition::VeryGood,
    Condition::Good,
    Condition::Acceptable,
];

fn synthetic_batch(size: usize) -> Vec<ProductRecord> {
    (0..size)
        .map(|i| ProductRecord {
            id: format!("m{i:011}"),
            title: format!("{} #{}", TITLES[i % TITLES.len()], i / TITLES.len()),
            price: 3_000 + (i as u64 * 7_919) % 150_000,
            condition: CONDITIONS[i % CONDITIONS.len()],
            seller_rating: (i % 4 != 0).then(|| 3.5 + (i % 15) as f32 / 10.0),
            category: "Electronics".to_string(),
            brand: Some(["Apple", "Nintendo", "Sony", "Supreme"][i % 4].to_string()),
            image_url: format!("https://static.mercdn.net/thumb/item/webp/m{i:011}_1.jpg"),
            source_url: Some(format!("https://jp.mercari.com/item/m{i:011}")),
            description: None,
            tags: Vec::new(),
            score: None,
            scraped_at: Utc::now(),
        })
        .collect()
}

fn bench_ranking(c: &mut Criterion) {
    let engine = RankingEngine::default();
    let query = QueryInput::new(["iphone", "128gb"]);
    let mut group = c.benchmark_group("rank_batch");

    for size in [15, 60, 300] {
        let batch = synthetic_batch(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &batch, |b, batch| {
            b.iter(|| engine.rank_batch(black_box(batch), black_box(&query)));
        });
    }
    group.finish();
}

fn bench_tagging(c: &mut Criterion) {
    let enricher = TagEnricher::default();
    let mut group = c.benchmark_group("enrich_batch");

    for size in [15, 60, 300] {
        let batch = synthetic_batch(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &batch, |b, batch| {
            b.iter(|| enricher.enrich_batch(black_box(batch)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_ranking, bench_tagging);
criterion_main!(benches);
