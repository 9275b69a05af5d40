use rust_decimal::Decimal;
use uuid::Uuid;

use axum_storefront_api::{
    config::AppConfig,
    db::{create_pool, run_migrations},
    services::auth_service::ensure_admin_account,
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    if config.admin.is_none() {
        println!("ADMIN_USERNAME/ADMIN_PASSWORD not set, skipping admin account");
    }

    let pool = create_pool(&config.database_url).await?;
    let state = AppState::new(pool, config);
    run_migrations(&state.orm).await?;

    ensure_admin_account(&state).await?;
    seed_products(&state.pool).await?;

    println!("Seed completed");
    Ok(())
}

async fn seed_products(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let products = vec![
        ("Chandler Bags", "Leather travel bag", "bags", Decimal::new(4999, 2), 216348_i64, None),
        ("Ferris Mug", "Coffee tastes better with Ferris", "kitchen", Decimal::new(1200, 2), 100, None),
        ("Rust Sticker Pack", "Decorate your laptop", "stationery", Decimal::new(500, 2), 200, Some(3_i64)),
        ("Axum Hoodie", "Warm hoodie for Rustaceans", "clothing", Decimal::new(5500, 2), 50, None),
    ];

    for (name, desc, category, price, quantity, minimum_order) in products {
        // Names are display attributes, not keys; skip ones already seeded.
        let inserted = sqlx::query(
            r#"
            INSERT INTO products (id, name, description, category, price, quantity, minimum_order)
            SELECT $1, $2, $3, $4, $5, $6, $7
            WHERE NOT EXISTS (SELECT 1 FROM products WHERE name = $2)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(desc)
        .bind(category)
        .bind(price)
        .bind(quantity)
        .bind(minimum_order)
        .execute(pool)
        .await?;

        if inserted.rows_affected() > 0 {
            println!("Seeded product {name}");
        }
    }

    Ok(())
}
