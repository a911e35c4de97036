use chrono::Duration;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use wholesale_orders::clock::{Clock, SystemClock};
use wholesale_orders::config::AppConfig;
use wholesale_orders::directory::{CatalogEntry, PartyProfile, StaticDirectory};
use wholesale_orders::domain::order::{
    Actor, BuyerId, NewOrder, OrderCommand, OrderLifecycle, RawAdditional, RequestedLine, SellerId,
};
use wholesale_orders::domain::pricing::{ItemId, PriceBook, Tier, TierResolver};
use wholesale_orders::ledger::LineItemLedger;
use wholesale_orders::metrics::{self, Metrics};
use wholesale_orders::query::{OrderAssembler, OrderQueries};
use wholesale_orders::repository::{
    LineItemRepository, MemoryStore, OrderRepository, Page, PartyScope, PgStore, PriceRepository,
    RelationRepository, TimeWindow,
};
use wholesale_orders::utils::{retry_on_transient, RetryConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,wholesale_orders=debug")),
        )
        .init();

    tracing::info!("🚀 Starting wholesale ordering demo");

    let config = AppConfig::from_env()?;

    // === 1. Initialize Prometheus metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    // Start metrics HTTP server in background thread
    let registry = metrics.registry().clone();
    let metrics_port = config.metrics_port;
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(e) => {
                tracing::error!("Metrics runtime error: {}", e);
                return;
            }
        };
        rt.block_on(async {
            if let Err(e) = metrics::start_metrics_server(registry, metrics_port).await {
                tracing::error!("Metrics server error: {}", e);
            }
        });
    });

    // === 2. Pick a store ===
    match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to PostgreSQL...");
            let url = url.as_str();
            let max_connections = config.database_max_connections;
            let store = retry_on_transient(RetryConfig::startup(config.db_connect_attempts), move |_attempt| {
                PgStore::connect(url, max_connections)
            })
            .await
            .into_result()?;
            store.migrate().await?;
            run(Arc::new(store), &config, metrics).await
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory store");
            run(Arc::new(MemoryStore::new()), &config, metrics).await
        }
    }
}

async fn run<S>(store: Arc<S>, config: &AppConfig, metrics: Arc<Metrics>) -> anyhow::Result<()>
where
    S: OrderRepository + LineItemRepository + PriceRepository + RelationRepository + 'static,
{
    let buyer = BuyerId(101);
    let seller = SellerId(201);

    // === 3. Seed prices and the buyer relation ===
    let book = PriceBook::new(store.clone(), store.clone());
    let rice = book
        .replace_slot(seller, ItemId(1), "sak", &[62_000, 61_000, 60_000, 58_500], 1)
        .await?;
    let oil = book.replace_slot(seller, ItemId(2), "dus", &[180_000, 0, 175_000, 0], 12).await?;
    let sugar = book.replace_slot(seller, ItemId(3), "bal", &[0, 0, 0, 0], 1).await?;
    let (Some(rice), Some(oil)) = (rice, oil) else {
        anyhow::bail!("seed prices did not produce active slots");
    };
    tracing::info!(sugar_listed = sugar.is_some(), "Seeded price slots");

    book.activate_relation(seller, buyer).await?;
    book.change_tier(seller, buyer, Tier::Silver).await?;

    let directory = Arc::new(
        StaticDirectory::new()
            .with_buyer(PartyProfile::new(buyer.0, "Toko Sumber Rejeki"))
            .with_seller(PartyProfile::new(seller.0, "CV Grosir Nusantara"))
            .with_item(CatalogEntry {
                item_id: ItemId(1),
                name: "Beras Pandan Wangi 25kg".to_string(),
                category: Some("sembako".to_string()),
                image: Some("uploads/beras-pandan-wangi.jpg".to_string()),
            })
            .with_item(CatalogEntry {
                item_id: ItemId(2),
                name: "Minyak Goreng 2L".to_string(),
                category: Some("sembako".to_string()),
                image: Some("uploads/minyak-goreng.png".to_string()),
            }),
    );

    // === 4. Wire the services ===
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ledger = LineItemLedger::new(store.clone(), store.clone(), TierResolver::new(store.clone()));
    let assembler = OrderAssembler::new(
        store.clone(),
        directory.clone(),
        directory,
        config.image_cdn_prefix.clone(),
    );
    let lifecycle = OrderLifecycle::new(
        store.clone(),
        ledger,
        assembler.clone(),
        clock.clone(),
        metrics.clone(),
    );
    let queries = OrderQueries::new(store, assembler, metrics);

    // === 5. Demonstrate the order lifecycle ===
    tracing::info!("📝 Demonstrating order lifecycle");

    let additionals: Vec<RawAdditional> = serde_json::from_value(serde_json::json!([
        { "name": "Ongkos bongkar", "unit": "trip", "quantity": 1, "price": 25000 },
        { "name": "Palet", "unit": "pcs", "quantity": -1, "price": 5000 }
    ]))?;
    let created = lifecycle
        .create(
            NewOrder {
                buyer_id: buyer,
                seller_id: seller,
                address: Some("Jl. Pasar Baru 12, Bandung".to_string()),
                is_cod: true,
                delivery_fee: 15_000,
                notes: Some("Kirim pagi".to_string()),
                lines: vec![
                    RequestedLine { price_id: rice.id, quantity: 4 },
                    RequestedLine { price_id: oil.id, quantity: 2 },
                    RequestedLine { price_id: oil.id, quantity: 0 },
                ],
                additionals: Some(additionals),
            },
            Uuid::new_v4(),
        )
        .await?;
    let order_id = created.details.id;
    tracing::info!(
        order_id = %order_id,
        items = created.current.items.len(),
        total = created.items_total,
        "✅ Order created"
    );

    let unread = queries.count_unread(seller).await?;
    tracing::info!(unread, "Seller inbox");
    queries.detail(Actor::Seller(seller), order_id).await?;

    let accepted = lifecycle
        .handle(
            Actor::Seller(seller),
            order_id,
            OrderCommand::Accept {
                lines: vec![RequestedLine { price_id: rice.id, quantity: 3 }],
                additionals: None,
                notes: Some("Minyak kosong, beras dikurangi".to_string()),
            },
            Uuid::new_v4(),
        )
        .await?;
    tracing::info!(
        order_id = %order_id,
        revisions = accepted.version.len(),
        total = accepted.items_total,
        "✅ Order accepted"
    );

    let delivered = lifecycle
        .handle(Actor::Seller(seller), order_id, OrderCommand::Deliver, Uuid::new_v4())
        .await?;
    tracing::info!(order_id = %order_id, status = %delivered.status, "✅ Order delivered");

    let history = queries
        .list(PartyScope::buyer_or_all(buyer.0), None, Page::new(10, 0))
        .await?;
    tracing::info!(buyer_id = %buyer, orders = history.count, "Buyer order history");

    // === 6. Dashboard ===
    let now = clock.now();
    let window = TimeWindow::new(now - Duration::days(30), now + Duration::minutes(1));
    let report = queries.dashboard(PartyScope::seller_or_all(seller.0), window).await?;
    tracing::info!("📈 Dashboard: {}", serde_json::to_string_pretty(&report)?);

    tracing::info!("🎉 Demo complete! Metrics stay available until Ctrl+C");
    tokio::signal::ctrl_c().await?;

    Ok(())
}
