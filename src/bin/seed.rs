use chrono::Utc;
use clap::Parser;
use fake::{
    faker::company::en::CompanyName,
    Fake,
};
use gymsettle::{
    auth::{generate_api_key, hash_api_key},
    domain::{
        generate_access_code, Activation, CapturedPayment, CreateGymRequest, CreatePlanRequest,
        DurationUnit, Payment, Subscription, SubscriptionStatus,
    },
    repository::{
        GymRepository, PaymentRepository, SqliteGymRepository, SqlitePaymentRepository,
        SqliteSubscriptionRepository, SubscriptionRepository,
    },
};
use sqlx::sqlite::SqlitePoolOptions;
use uuid::Uuid;

/// Seed a local database with gyms, plans and paid subscriptions.
#[derive(Debug, Parser)]
struct Args {
    /// Database URL; falls back to DATABASE_URL, then a local file.
    #[arg(long)]
    database_url: Option<String>,

    /// Number of gyms to create.
    #[arg(long, default_value_t = 3)]
    gyms: usize,

    /// Paid monthly subscriptions to create per gym, left unsettled.
    #[arg(long, default_value_t = 5)]
    members: usize,

    /// Currency for all plans.
    #[arg(long, default_value = "INR")]
    currency: String,
}

const PLANS: &[(&str, i64, u32, DurationUnit)] = &[
    ("Day Pass", 200_00, 1, DurationUnit::Day),
    ("Monthly", 1500_00, 1, DurationUnit::Month),
    ("Quarterly", 4000_00, 3, DurationUnit::Month),
    ("Annual", 15000_00, 1, DurationUnit::Year),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    println!("🌱 Starting database seeding...");

    let database_url = args
        .database_url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .unwrap_or_else(|| "sqlite://gymsettle.db?mode=rwc".to_string());

    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    // Run migrations first
    println!("📋 Running migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await?;

    let gym_repo = SqliteGymRepository::new(db_pool.clone());
    let subscription_repo = SqliteSubscriptionRepository::new(db_pool.clone());
    let payment_repo = SqlitePaymentRepository::new(db_pool.clone());

    println!("🏋️ Creating {} gyms...", args.gyms);

    let mut total_unsettled = 0i64;
    for _ in 0..args.gyms {
        let name: String = CompanyName().fake();
        let gym = gym_repo
            .create_gym(CreateGymRequest {
                owner_id: Uuid::new_v4(),
                name: format!("{} Fitness", name),
            })
            .await?;

        let mut monthly = None;
        for (plan_name, price, duration_value, duration_unit) in PLANS {
            let plan = gym_repo
                .create_plan(CreatePlanRequest {
                    gym_id: gym.id,
                    name: plan_name.to_string(),
                    price: *price,
                    currency: args.currency.clone(),
                    duration_value: *duration_value,
                    duration_unit: *duration_unit,
                })
                .await?;
            if *duration_unit == DurationUnit::Month && *duration_value == 1 {
                monthly = Some(plan);
            }
        }

        let Some(plan) = monthly else {
            continue;
        };

        for n in 0..args.members {
            let now = Utc::now();
            let order_id = format!("order_seed_{}", Uuid::new_v4().simple());
            let subscription = subscription_repo
                .create(Subscription {
                    id: Uuid::new_v4(),
                    user_id: Uuid::new_v4(),
                    gym_id: gym.id,
                    plan_id: plan.id,
                    status: SubscriptionStatus::Pending,
                    start_date: None,
                    end_date: None,
                    access_code: None,
                    payment_id: None,
                    provider_order_id: Some(order_id.clone()),
                    order_amount: plan.price,
                    currency: plan.currency.clone(),
                    created_at: now,
                    updated_at: now,
                })
                .await?;

            let capture = CapturedPayment {
                provider_order_id: order_id,
                provider_payment_id: format!("pay_seed_{}", n),
                amount: plan.price,
                currency: plan.currency.clone(),
                method: "upi".to_string(),
                subscription_id: Some(subscription.id),
            };
            let payment = Payment::captured(&capture, &subscription);
            let end_date = plan
                .end_date_from(now)
                .ok_or_else(|| anyhow::anyhow!("plan duration overflows"))?;
            let activation = Activation {
                subscription_id: subscription.id,
                start_date: now,
                end_date,
                access_code: generate_access_code(),
                payment_id: Some(payment.id),
            };

            payment_repo.record_capture(payment, Some(activation)).await?;
            total_unsettled += plan.price;
        }

        println!("  ✅ {} with {} plans and {} paid members", gym.name, PLANS.len(), args.members);
    }

    println!("💰 Unsettled total across gyms: {}", total_unsettled);

    let admin_key = generate_api_key();
    println!();
    println!("🔑 Admin API key (store only the hash in config):");
    println!("   key:        {}", admin_key);
    println!("   key_sha256: {}", hash_api_key(&admin_key));
    println!();
    println!("✨ Database seeding complete!");

    Ok(())
}
