//! Benchmarks the dep-spec tokeniser/parser (spec.md §4.B–C) across a
//! handful of representative `DEPEND`-shaped strings.
//!
//! ```bash
//! cargo bench --bench parsing
//! ```

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use paludis_dep_core::eapi::EapiOptions;
use paludis_dep_core::parser::parse_tree;
use paludis_dep_core::spec_tree::TreeKind;

const FLAT: &str = "dev-lang/rust >=dev-lib/openssl-3 dev-libs/libxml2:2";

const CONDITIONAL: &str = "ssl? ( dev-lib/openssl ) !ssl? ( dev-lib/libressl ) build: dev-util/cmake";

const ANY_OF: &str = "|| ( dev-lang/rust dev-lang/go ) || ( dev-lib/openssl dev-lib/libressl dev-lib/gnutls )";

fn wide_sequence(n: usize) -> String {
    (0..n).map(|i| format!("dev-libs/dep{i}")).collect::<Vec<_>>().join(" ")
}

fn bench_parse(c: &mut Criterion) {
    let eapi = EapiOptions::paludis1();
    let mut group = c.benchmark_group("parse_tree");

    for (label, text) in [("flat", FLAT), ("conditional", CONDITIONAL), ("any_of", ANY_OF)] {
        group.bench_with_input(BenchmarkId::from_parameter(label), text, |b, text| {
            b.iter(|| parse_tree(text, TreeKind::Dependency, &eapi).unwrap());
        });
    }

    let wide = wide_sequence(200);
    group.bench_with_input(BenchmarkId::from_parameter("wide_200"), &wide, |b, text| {
        b.iter(|| parse_tree(text, TreeKind::Dependency, &eapi).unwrap());
    });

    group.finish();
}

criterion_group!(benches, bench_parse);
criterion_main!(benches);
