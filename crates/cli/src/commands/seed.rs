use cassie_db::repositories::{SqlFaqStore, SqlSupportGateway};

use crate::commands::{block_on_with_pool, CommandResult};

const DEMO_ORDERS: &[(&str, &str)] = &[
    ("ORDL12345", "DELIVERED"),
    ("ORDL23456", "SHIPPED"),
    ("ORDL34567", "PACKING"),
    ("ORDL45678", "ORDER_PLACED"),
    ("ORDL56789", "CANCELLED"),
];

pub fn run() -> CommandResult {
    block_on_with_pool("seed", |_config, pool| async move {
        let faqs = SqlFaqStore::new(pool.clone());
        let faq_count = faqs
            .seed_defaults()
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let gateway = SqlSupportGateway::new(pool);
        for (order_id, status) in DEMO_ORDERS {
            gateway
                .upsert_order(order_id, status)
                .await
                .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        }

        Ok(CommandResult::success(
            "seed",
            format!("seeded {faq_count} FAQ entries and {} demo orders", DEMO_ORDERS.len()),
        ))
    })
}
