use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::{TimeZone, Utc};
use tally_accounting::{AccountCode, AccountTag, NewAccount, NormalBalance};
use tally_infra::{Book, NewPurchase, NewPurchaseLine, NewSale, NewSaleLine, NewSalePayment};
use tally_inventory::InventoryId;
use tally_purchasing::SupplierId;
use tally_sales::PaymentMethodId;

struct Fixture {
    book: Book,
    inventory: InventoryId,
    cash: PaymentMethodId,
    supplier: SupplierId,
}

fn fixture() -> Fixture {
    use AccountTag::*;
    use NormalBalance::{Credit, Debit};

    let book = Book::in_memory();
    let (inventory, cash, supplier) = book
        .transaction("bench setup", |tx| {
            let accounts = [
                NewAccount::posting(11100, "Cash", Debit).tagged(PosPaymentMethod),
                NewAccount::posting(11400, "Inventory", Debit).tagged(PosInventory),
                NewAccount::posting(21000, "Payable", Credit).tagged(PosAccountsPayable),
                NewAccount::posting(41000, "Sales", Credit).tagged(PosSalesRevenue),
                NewAccount::posting(41100, "Discounts", Debit).tagged(PosSalesDiscount),
                NewAccount::posting(51000, "COGS", Debit).tagged(PosCostOfGoodsSold),
                NewAccount::posting(52000, "Fees", Debit).tagged(PosBankFees),
            ];
            for account in accounts {
                tx.create_account(account)?;
            }
            let inventory = tx.create_inventory("Espresso", 3_500, AccountCode(11400))?;
            let cash = tx.create_payment_method("Cash", AccountCode(11100), 0, 0, 0)?;
            let supplier = tx.create_supplier("Roaster", None)?;
            Ok((inventory, cash, supplier))
        })
        .unwrap();
    Fixture {
        book,
        inventory,
        cash,
        supplier,
    }
}

impl Fixture {
    fn purchase(&self, quantity: i64) {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap();
        self.book
            .transaction("bench purchase", |tx| {
                let id = tx.record_purchase(NewPurchase {
                    supplier_id: self.supplier,
                    purchase_time: at,
                    lines: vec![NewPurchaseLine {
                        inventory_id: self.inventory,
                        supplier_quantity: quantity,
                        price: quantity * 2_000,
                    }],
                })?;
                tx.post_purchase(id, at)
            })
            .unwrap();
    }

    fn sale(&self) {
        let at = Utc.with_ymd_and_hms(2025, 1, 2, 9, 0, 0).unwrap();
        self.book
            .transaction("bench sale", |tx| {
                let id = tx.record_sale(NewSale {
                    sale_time: at,
                    lines: vec![NewSaleLine {
                        inventory_id: self.inventory,
                        quantity: 2,
                        price: None,
                        discounts: vec![],
                    }],
                    payments: vec![NewSalePayment {
                        payment_method_id: self.cash,
                        amount: 7_000,
                    }],
                })?;
                tx.post_sale(id, at)
            })
            .unwrap();
    }
}

fn bench_sale_posting(c: &mut Criterion) {
    let mut group = c.benchmark_group("sale_posting");
    group.throughput(Throughput::Elements(1));

    group.bench_function("record_and_post_sale", |b| {
        let fixture = fixture();
        fixture.purchase(1_000_000);
        b.iter(|| fixture.sale());
    });

    group.finish();
}

fn bench_state_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("state_size");

    for sales in [100usize, 1_000].iter() {
        let fixture = fixture();
        fixture.purchase(*sales as i64 * 2);
        for _ in 0..*sales {
            fixture.sale();
        }

        group.bench_with_input(BenchmarkId::new("trial_balance", sales), sales, |b, _| {
            b.iter(|| {
                fixture
                    .book
                    .read(|s| black_box(s.chart.trial_balance()))
                    .unwrap()
            });
        });

        group.bench_with_input(BenchmarkId::new("snapshot_json", sales), sales, |b, _| {
            let state = fixture.book.snapshot().unwrap();
            b.iter(|| black_box(serde_json::to_vec(&state).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_sale_posting, bench_state_size);
criterion_main!(benches);
