use criterion::{black_box, criterion_group, criterion_main, Criterion};

use um_core::index::RuleIndex;
use um_core::pattern::SitePattern;
use um_core::registry::ActionKind;
use um_core::types::{ActionSpec, CompiledPatternEntry, Rule};

fn synthetic_index(sites: usize) -> RuleIndex {
    let mut entries = Vec::with_capacity(sites + 1);
    let mut wildcard = CompiledPatternEntry::new(SitePattern::compile("*").expect("wildcard compiles"));
    wildcard.rules.push(remove_rule("consent", "#cookie-banner"));
    entries.push(wildcard);

    for i in 0..sites {
        let pattern = format!("site{i}.example *.news{i}.example.org/articles");
        let mut entry = CompiledPatternEntry::new(SitePattern::compile(&pattern).expect("pattern compiles"));
        entry.rules.push(remove_rule("paywall", ".paywall"));
        entry.rules.push(remove_rule("email", ".newsletter"));
        entries.push(entry);
    }
    RuleIndex::new(entries)
}

fn remove_rule(category: &str, selector: &str) -> Rule {
    Rule::new(
        category,
        Vec::new(),
        vec![ActionSpec {
            selector: selector.to_string(),
            function: "remove".to_string(),
            args: Vec::new(),
            kind: ActionKind::Remove,
        }],
    )
}

fn bench_select(c: &mut Criterion) {
    let index = synthetic_index(500);
    let urls = [
        "https://site250.example/story/1",
        "https://www.site499.example/",
        "https://live.news42.example.org/articles/today",
        "https://unrelated.example.net/page",
    ];

    c.bench_function("select_500_sites", |b| {
        b.iter(|| {
            for url in &urls {
                black_box(index.select(black_box(url)));
            }
        })
    });
}

fn bench_compile(c: &mut Criterion) {
    c.bench_function("compile_pattern", |b| {
        b.iter(|| SitePattern::compile(black_box("example.com *.example.org/news subscribe.example.net")))
    });
}

criterion_group!(benches, bench_select, bench_compile);
criterion_main!(benches);
