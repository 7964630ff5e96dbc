use chrono::{Duration, Utc};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    CheckoutProduct, CustomerIdentity, GameAccount, GameRef, Money, NewOrder, NewPayment,
    OrderAggregate, OrderNumber, OrderStatus, PaymentChannel, PaymentStatus, ProductId,
    TransactionCode, TransactionStatus,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;

fn new_order(rng: &mut StdRng) -> NewOrder {
    NewOrder {
        order_number: OrderNumber::generate("TU", Utc::now(), rng),
        customer: CustomerIdentity::Guest {
            email: "bench@example.com".to_string(),
            name: None,
            phone: None,
        },
        game_account: GameAccount::new("12345678", Some("2001".to_string())),
        product: CheckoutProduct {
            id: ProductId::new("ml-86"),
            name: "86 Diamonds".to_string(),
            price: Money::new(16000),
            discount_price: Some(Money::new(14000)),
            is_active: true,
            provider_code: "ML86".to_string(),
            game: GameRef {
                slug: "mobile-legends".to_string(),
                name: "Mobile Legends".to_string(),
                code: "mobilelegends".to_string(),
            },
        },
        quantity: 1,
        payment_channel: PaymentChannel::BcaVa,
        admin_fee: Money::new(4000),
    }
}

fn new_payment() -> NewPayment {
    NewPayment {
        payment_provider: "snap".to_string(),
        transaction_id: None,
        payment_url: None,
        payment_code: None,
        payment_data: json!({}),
        ttl: Duration::hours(24),
    }
}

fn bench_create_order(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);

    c.bench_function("domain/create_order", |b| {
        b.iter(|| {
            OrderAggregate::create(new_order(&mut rng), Utc::now()).unwrap();
        });
    });
}

fn bench_full_lifecycle(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);

    c.bench_function("domain/checkout_to_completed", |b| {
        b.iter(|| {
            let now = Utc::now();
            let mut agg = OrderAggregate::create(new_order(&mut rng), now).unwrap();
            agg.attach_payment(new_payment(), now);
            agg.attach_transaction(
                TransactionStatus::Pending,
                TransactionCode::generate(now, &mut rng),
                now,
            )
            .unwrap();
            agg.settle_payment(PaymentStatus::Success, None, None, now)
                .unwrap();
            agg.transition_order(OrderStatus::Processing, now).unwrap();
            agg.record_provider_order("DF1", json!({}), now).unwrap();
            agg.update_transaction(TransactionStatus::Success, now)
                .unwrap();
            agg.transition_order(OrderStatus::Completed, now).unwrap();
            agg.check_invariants().unwrap();
        });
    });
}

fn bench_json_round_trip(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let now = Utc::now();
    let mut agg = OrderAggregate::create(new_order(&mut rng), now).unwrap();
    agg.attach_payment(new_payment(), now);

    c.bench_function("domain/aggregate_json_round_trip", |b| {
        b.iter(|| {
            let value = serde_json::to_value(&agg).unwrap();
            let _: OrderAggregate = serde_json::from_value(value).unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_create_order,
    bench_full_lifecycle,
    bench_json_round_trip,
);
criterion_main!(benches);
