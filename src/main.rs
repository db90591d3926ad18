use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use storefront_orders::support::SupportLink;
use storefront_orders::{
    load_from_file, save_to_file, ConnectionState, CreateOrderData, Order, OrderStatus,
    OrderSync, OrdersExport, OrdersSnapshot, RealtimeFeed, RestApi, StoreConfig, SyncConfig,
};

fn print_usage(bin: &str) {
    eprintln!("Usage:");
    eprintln!("  {} <command> [args]", bin);
    eprintln!();
    eprintln!("  list [--export <file>]     → print all orders, newest first");
    eprintln!("  get <id>                   → print one order");
    eprintln!("  create <file.json>         → submit an order draft (CreateOrderData JSON)");
    eprintln!("  set-status <id> <status>   → pending | processing | approved | rejected");
    eprintln!("  watch                      → follow orders live until Ctrl-C");
    eprintln!("  settings                   → print site settings");
    eprintln!();
    eprintln!("  Reads STOREFRONT_URL and STOREFRONT_ANON_KEY (a .env file is honoured).");
    eprintln!("  Log level via RUST_LOG (default: info).");
}

fn setup_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();

    let args: Vec<String> = std::env::args().collect();
    let bin = args.first().map(String::as_str).unwrap_or("storefront-orders");
    let Some(command) = args.get(1) else {
        print_usage(bin);
        std::process::exit(1);
    };
    let rest = &args[2..];

    let config = StoreConfig::from_env()?;
    let api = Arc::new(RestApi::new(&config)?);

    match command.as_str() {
        "list" => {
            let export = match rest {
                [] => None,
                [flag, path] if flag == "--export" => Some(path.as_str()),
                _ => {
                    print_usage(bin);
                    std::process::exit(1);
                }
            };
            list(api, export).await
        }
        "get" => {
            let [id] = rest else {
                print_usage(bin);
                std::process::exit(1);
            };
            let sync = OrderSync::new(api, SyncConfig::default());
            let order = sync
                .fetch_order_by_id(id)
                .await
                .ok_or_else(|| anyhow!("order {} not found", id))?;
            println!("{}", serde_json::to_string_pretty(&order)?);
            Ok(())
        }
        "create" => {
            let [path] = rest else {
                print_usage(bin);
                std::process::exit(1);
            };
            let draft: CreateOrderData = load_from_file(path)?;
            let sync = OrderSync::new(api, SyncConfig::default());
            let order = sync.create_order(&draft).await.context("order was not created")?;
            eprintln!("Created order {} ({})", order.id, order.status);
            println!("{}", serde_json::to_string_pretty(&order)?);
            Ok(())
        }
        "set-status" => {
            let [id, status] = rest else {
                print_usage(bin);
                std::process::exit(1);
            };
            let status: OrderStatus = status.parse().map_err(|e: String| anyhow!(e))?;
            let sync = OrderSync::new(api, SyncConfig::default());
            if !sync.update_order_status(id, status).await {
                bail!("failed to update order {}", id);
            }
            eprintln!("Order {} is now {}", id, status);
            Ok(())
        }
        "watch" => watch(api, &config).await,
        "settings" => {
            let settings = api.site_settings().await?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
            match SupportLink::from_settings(Some(&settings)) {
                SupportLink::Configured(url) => eprintln!("Support link: {}", url),
                SupportLink::Unconfigured => eprintln!("Support link: not configured"),
            }
            Ok(())
        }
        other => {
            eprintln!("Unknown command: '{}'.", other);
            print_usage(bin);
            std::process::exit(1);
        }
    }
}

async fn list(api: Arc<RestApi>, export: Option<&str>) -> Result<()> {
    let sync = OrderSync::new(api, SyncConfig::default());
    sync.fetch_orders(true).await;
    let snapshot = sync.snapshot();
    if let Some(error) = snapshot.error {
        bail!("could not fetch orders: {}", error);
    }

    for order in &snapshot.orders {
        println!("{}", order_line(order));
    }
    eprintln!("{} order(s)", snapshot.orders.len());

    if let Some(path) = export {
        save_to_file(&OrdersExport::new(snapshot.orders), path)?;
        eprintln!("Exported to {}", path);
    }
    Ok(())
}

async fn watch(api: Arc<RestApi>, config: &StoreConfig) -> Result<()> {
    let sync_config = SyncConfig::default();
    let feed = Arc::new(RealtimeFeed::new(config, &sync_config));
    let sync = OrderSync::new(api, sync_config);
    let handle = sync.start(feed);

    let mut snapshots = sync.subscribe();
    let mut connection = sync.watch_connection();
    let mut last = OrdersSnapshot::default();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = snapshots.borrow_and_update().clone();
                report_changes(&last, &current);
                last = current;
            }
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *connection.borrow_and_update();
                match state {
                    ConnectionState::Subscribed => eprintln!("live updates active"),
                    ConnectionState::Reconnecting { cause } => {
                        eprintln!("live updates {} (polling continues)", cause.as_str())
                    }
                    _ => {}
                }
            }
        }
    }

    eprintln!("Stopping...");
    handle.shutdown().await;
    Ok(())
}

fn report_changes(previous: &OrdersSnapshot, current: &OrdersSnapshot) {
    if current.error != previous.error {
        if let Some(error) = &current.error {
            eprintln!("refresh failed: {}", error);
        }
    }
    for order in &current.orders {
        match previous.find(&order.id) {
            None => println!("+ {}", order_line(order)),
            Some(old) if old.status != order.status => {
                println!("~ {} ({} → {})", order.id, old.status, order.status)
            }
            _ => {}
        }
    }
    for order in &previous.orders {
        if current.find(&order.id).is_none() {
            println!("- {}", order.id);
        }
    }
}

fn order_line(order: &Order) -> String {
    format!(
        "{}  {:<10}  {:>10.2}  {:>3} item(s)  {}",
        order.id,
        order.status.as_str(),
        order.total_price,
        order.item_count(),
        order.created_at.format("%Y-%m-%d %H:%M"),
    )
}
