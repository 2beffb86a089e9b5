//! Resolution Benchmarks
//!
//! Benchmarks for URL pattern matching and registry lookups, the work done
//! after every click.
//!
//! Run with: `cargo bench --bench resolve_ops`

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pageflow::prelude::*;

#[derive(Page)]
#[page(url = "https://site.test/")]
struct Home(Page);

#[derive(Page)]
#[page(url = "https://site.test/users/:id")]
struct User(Page);

#[derive(Page)]
#[page(url = "https://site.test/users/:id/posts/:post")]
struct Post(Page);

#[derive(Page)]
#[page(url = "/settings")]
struct Settings(Page);

#[derive(Component)]
#[component(selector = "#modal-id")]
struct Modal(Component);

fn registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .register_page::<Home>()
        .register_page::<User>()
        .register_page::<Post>()
        .register_page::<Settings>()
        .register_component::<Modal>();
    registry
}

fn bench_url_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("url_matching");

    let cases = vec![
        ("literal", "https://site.test/", "https://site.test/"),
        ("one_param", "https://site.test/users/:id", "https://site.test/users/42"),
        (
            "two_params",
            "https://site.test/users/:id/posts/:post",
            "https://site.test/users/42/posts/7?ref=feed#top",
        ),
        ("miss", "https://site.test/users/:id", "https://other.test/users/42"),
    ];

    for (name, pattern, url) in cases {
        let matcher = UrlMatcher::new(pattern);
        group.bench_with_input(BenchmarkId::from_parameter(name), &url, |bench, url| {
            bench.iter(|| black_box(matcher.matches(black_box(url))));
        });
    }

    group.finish();
}

fn bench_registry_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_lookup");
    let registry = registry();

    group.bench_function("exact_url", |bench| {
        bench.iter(|| black_box(registry.resolve_url(black_box("https://site.test/"))));
    });
    group.bench_function("pattern_url", |bench| {
        bench.iter(|| {
            black_box(registry.resolve_url(black_box("https://site.test/users/42/posts/7")))
        });
    });
    group.bench_function("unknown_url", |bench| {
        bench.iter(|| black_box(registry.resolve_url(black_box("https://site.test/about"))));
    });
    group.bench_function("selector", |bench| {
        bench.iter(|| black_box(registry.resolve_selector(black_box("#modal-id"))));
    });

    group.finish();
}

fn bench_param_extraction(c: &mut Criterion) {
    let matcher = UrlMatcher::new("https://site.test/users/:id/posts/:post");
    c.bench_function("extract_params", |bench| {
        bench.iter(|| black_box(matcher.extract_params(black_box("https://site.test/users/42/posts/7"))));
    });
}

criterion_group!(
    benches,
    bench_url_matching,
    bench_registry_lookup,
    bench_param_extraction
);
criterion_main!(benches);
