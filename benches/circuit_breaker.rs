use criterion::{black_box, criterion_group, criterion_main, Criterion};
use paywire::gateway::{Gateway, JsonHttpGateway, RetryConfig, TransactionRequest};
use paywire::transport::{SimulatedFormat, SimulatedSender};
use paywire::{CircuitBreakerBank, CircuitBreakerConfig, DispatchContext, Registry, Router};
use rust_decimal::Decimal;

use std::sync::Arc;
use std::time::Duration;

fn config(failure_threshold: u32) -> CircuitBreakerConfig {
    CircuitBreakerConfig::new(1, Duration::ZERO, Duration::from_secs(30), failure_threshold)
        .unwrap()
}

fn breaker_admission_success(c: &mut Criterion) {
    let bank = CircuitBreakerBank::new(config(10));

    c.bench_function("breaker_bank_allow_record_success", |b| {
        b.iter(|| {
            let recorder = bank.allow(black_box("Gateway-A")).unwrap();
            recorder.record(true);
        });
    });
}

fn breaker_admission_open(c: &mut Criterion) {
    let bank = CircuitBreakerBank::new(config(0));
    bank.allow("Gateway-A").unwrap().record(false);

    c.bench_function("breaker_bank_allow_denied", |b| {
        b.iter(|| black_box(bank.allow(black_box("Gateway-A")).is_err()));
    });
}

fn router_simulated_dispatch(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let router = Router::new(Arc::new(Registry::new()), CircuitBreakerBank::new(config(5)));
    for name in ["Gateway-A", "Gateway-B"] {
        router
            .register(Arc::new(JsonHttpGateway::new(
                name,
                SimulatedSender::new(SimulatedFormat::Json),
                RetryConfig::no_retries(),
            )))
            .unwrap();
    }
    let request =
        TransactionRequest::deposit(Decimal::new(1999, 2), "USD").with_preferred_gateway("Gateway-B");
    let ctx = DispatchContext::background();

    c.bench_function("router_simulated_deposit", |b| {
        b.to_async(&rt).iter(|| async {
            let routed = router
                .send_message(&ctx, &request.preferred_gateway, |gateway| {
                    let (ctx, request) = (&ctx, &request);
                    async move { gateway.transact(ctx, request).await }
                })
                .await;
            let _ = black_box(routed);
        });
    });
}

criterion_group!(benches, breaker_admission_success, breaker_admission_open, router_simulated_dispatch);
criterion_main!(benches);
