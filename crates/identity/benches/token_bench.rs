use common::Role;
use criterion::{Criterion, criterion_group, criterion_main};
use doc_store::InMemoryExpiringCache;
use identity::{TokenAuthority, TokenConfig};

fn authority() -> TokenAuthority<InMemoryExpiringCache> {
    TokenAuthority::new(TokenConfig::new("bench-secret"), InMemoryExpiringCache::new())
}

fn bench_issue_pair(c: &mut Criterion) {
    let tokens = authority();

    c.bench_function("identity/issue_pair", |b| {
        b.iter(|| tokens.issue_pair("user-bench", Role::Customer).unwrap());
    });
}

fn bench_verify(c: &mut Criterion) {
    let tokens = authority();
    let pair = tokens.issue_pair("user-bench", Role::Admin).unwrap();

    c.bench_function("identity/verify", |b| {
        b.iter(|| tokens.verify(&pair.access_token).unwrap());
    });
}

fn bench_authenticate(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let tokens = authority();
    let pair = tokens.issue_pair("user-bench", Role::Admin).unwrap();

    c.bench_function("identity/authenticate_with_revocation_check", |b| {
        b.iter(|| {
            rt.block_on(async { tokens.authenticate(&pair.access_token).await.unwrap() });
        });
    });
}

criterion_group!(benches, bench_issue_pair, bench_verify, bench_authenticate);
criterion_main!(benches);
