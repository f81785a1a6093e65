use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum_delivery_api::{
    config::AppConfig,
    db::{create_orm_conn, create_pool, run_migrations},
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;

    let pool = create_pool(&config.database_url).await?;

    let customer_id = ensure_user(&pool, "customer@example.com", "customer123", "customer").await?;
    let rider_id = ensure_user(&pool, "rider@example.com", "rider123", "rider").await?;
    let merchant_id = ensure_user(&pool, "merchant@example.com", "merchant123", "merchant").await?;

    let store_id = ensure_store(&pool, merchant_id, "Demo Noodle House", "No.1 Demo Street", 500).await?;
    seed_products(&pool, store_id).await?;

    println!(
        "Seed completed. Customer: {customer_id}, Rider: {rider_id}, Merchant: {merchant_id}, Store: {store_id}"
    );
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    email: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();

    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, password_hash, role)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .fetch_optional(pool)
    .await?;

    let user_id = match row {
        Some((id,)) => id,
        None => {
            let existing: (Uuid,) = sqlx::query_as("SELECT id FROM users WHERE email = $1")
                .bind(email)
                .fetch_one(pool)
                .await?;
            existing.0
        }
    };

    println!("Ensured user {email} (role={role})");
    Ok(user_id)
}

async fn ensure_store(
    pool: &sqlx::PgPool,
    merchant_id: Uuid,
    name: &str,
    location: &str,
    delivery_price: i64,
) -> anyhow::Result<Uuid> {
    let existing: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM stores WHERE merchant_id = $1 AND name = $2")
            .bind(merchant_id)
            .bind(name)
            .fetch_optional(pool)
            .await?;
    if let Some((id,)) = existing {
        return Ok(id);
    }

    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO stores (id, merchant_id, name, location, delivery_price) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(id)
    .bind(merchant_id)
    .bind(name)
    .bind(location)
    .bind(delivery_price)
    .execute(pool)
    .await?;

    println!("Ensured store {name}");
    Ok(id)
}

async fn seed_products(pool: &sqlx::PgPool, store_id: Uuid) -> anyhow::Result<()> {
    let menu: [(&str, i64); 3] = [
        ("Beef Noodles", 2800),
        ("Dumplings (12pc)", 2200),
        ("Jasmine Tea", 600),
    ];

    for (name, price) in menu {
        let existing: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM products WHERE store_id = $1 AND name = $2")
                .bind(store_id)
                .bind(name)
                .fetch_optional(pool)
                .await?;
        if existing.is_some() {
            continue;
        }
        sqlx::query("INSERT INTO products (id, store_id, name, price) VALUES ($1, $2, $3, $4)")
            .bind(Uuid::new_v4())
            .bind(store_id)
            .bind(name)
            .bind(price)
            .execute(pool)
            .await?;
    }

    println!("Seeded products");
    Ok(())
}
