mod common;

use common::TestApp;
use gymsettle::{
    domain::{
        Activation, CancelSubscriptionRequest, CreatePlanRequest, CreateSubscriptionRequest, DurationUnit,
        SubscriptionStatus,
    },
    error::AppError,
    repository::{GymRepository, SubscriptionRepository},
};
use uuid::Uuid;

#[tokio::test]
async fn test_request_creates_pending_subscription_and_order() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let (gym, plan) = app.gym_with_plan(1500).await?;
    let user_id = Uuid::new_v4();

    let checkout = app
        .ctx
        .subscription_service
        .request_subscription(
            CreateSubscriptionRequest {
                user_id,
                gym_id: gym.id,
                plan_id: plan.id,
            },
            Some(user_id),
        )
        .await?;

    let subscription = &checkout.subscription;
    assert_eq!(subscription.status, SubscriptionStatus::Pending);
    assert_eq!(subscription.order_amount, 1500);
    assert_eq!(subscription.currency, "INR");
    assert_eq!(subscription.provider_order_id.as_deref(), Some(checkout.order.id.as_str()));
    assert!(subscription.access_code.is_none());
    assert!(subscription.start_date.is_none());

    let orders = app.gateway.orders.lock().unwrap().clone();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].amount, 1500);
    assert_eq!(orders[0].notes.get("subscription_id"), Some(&subscription.id.to_string()));
    assert_eq!(orders[0].notes.get("gym_id"), Some(&gym.id.to_string()));

    let stored = app
        .ctx
        .subscription_repo
        .find_by_provider_order_id(&checkout.order.id)
        .await?
        .expect("subscription by order");
    assert_eq!(stored.id, subscription.id);

    Ok(())
}

#[tokio::test]
async fn test_request_rejects_unknown_foreign_or_inactive_plan() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let (gym, plan) = app.gym_with_plan(1500).await?;
    let (other_gym, _) = app.gym_with_plan(900).await?;

    let unknown = app
        .ctx
        .subscription_service
        .request_subscription(
            CreateSubscriptionRequest {
                user_id: Uuid::new_v4(),
                gym_id: gym.id,
                plan_id: Uuid::new_v4(),
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(unknown, AppError::NotFound(_)));

    let foreign = app
        .ctx
        .subscription_service
        .request_subscription(
            CreateSubscriptionRequest {
                user_id: Uuid::new_v4(),
                gym_id: other_gym.id,
                plan_id: plan.id,
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(foreign, AppError::NotFound(_)));

    sqlx::query("UPDATE plans SET is_active = 0 WHERE id = ?")
        .bind(plan.id.to_string())
        .execute(&app.pool)
        .await?;
    let inactive = app
        .ctx
        .subscription_service
        .request_subscription(
            CreateSubscriptionRequest {
                user_id: Uuid::new_v4(),
                gym_id: gym.id,
                plan_id: plan.id,
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(inactive, AppError::NotFound(_)));

    // No order is opened for a rejected request
    assert!(app.gateway.orders.lock().unwrap().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_plan_rejects_negative_price_or_zero_duration() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let (gym, _) = app.gym_with_plan(1500).await?;

    for (price, duration_value) in [(-5, 1), (1500, 0)] {
        let err = app
            .ctx
            .gym_repo
            .create_plan(CreatePlanRequest {
                gym_id: gym.id,
                name: "Broken".to_string(),
                price,
                currency: "INR".to_string(),
                duration_value,
                duration_unit: DurationUnit::Week,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "price {} duration {}", price, duration_value);
    }

    Ok(())
}

#[tokio::test]
async fn test_manual_activation_and_single_active_per_gym() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let (gym, plan) = app.gym_with_plan(1500).await?;
    let user_id = Uuid::new_v4();
    let staff = Uuid::new_v4();
    let request = CreateSubscriptionRequest {
        user_id,
        gym_id: gym.id,
        plan_id: plan.id,
    };

    let first = app.ctx.subscription_service.request_subscription(request.clone(), None).await?;
    let second = app.ctx.subscription_service.request_subscription(request.clone(), None).await?;

    let active = app
        .ctx
        .subscription_service
        .activate_manually(first.subscription.id, staff)
        .await?;
    assert_eq!(active.status, SubscriptionStatus::Active);
    assert!(active.payment_id.is_none());
    assert!(active.access_code.is_some());
    assert!(active.end_date > active.start_date);

    let err = app
        .ctx
        .subscription_service
        .activate_manually(second.subscription.id, staff)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let err = app
        .ctx
        .subscription_service
        .request_subscription(request, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    // The database refuses a second active row even if the service check is bypassed
    let err = app
        .ctx
        .subscription_repo
        .activate(&Activation {
            subscription_id: second.subscription.id,
            start_date: chrono::Utc::now(),
            end_date: chrono::Utc::now() + chrono::Duration::days(30),
            access_code: "ABCDEFGH".to_string(),
            payment_id: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(&err, AppError::Conflict(msg) if msg == "User already has an active subscription at this gym"));

    Ok(())
}

#[tokio::test]
async fn test_taken_access_code_is_redrawn() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let (gym, plan) = app.gym_with_plan(1500).await?;
    let staff = Uuid::new_v4();

    let mut pending = Vec::new();
    for _ in 0..2 {
        let checkout = app
            .ctx
            .subscription_service
            .request_subscription(
                CreateSubscriptionRequest {
                    user_id: Uuid::new_v4(),
                    gym_id: gym.id,
                    plan_id: plan.id,
                },
                None,
            )
            .await?;
        pending.push(checkout.subscription);
    }

    let first = app.ctx.subscription_service.activate_manually(pending[0].id, staff).await?;
    let taken = first.access_code.expect("access code");

    // A different member whose drawn code happens to match an existing one
    let activated = app
        .ctx
        .subscription_repo
        .activate(&Activation {
            subscription_id: pending[1].id,
            start_date: chrono::Utc::now(),
            end_date: chrono::Utc::now() + chrono::Duration::days(30),
            access_code: taken.clone(),
            payment_id: None,
        })
        .await?
        .expect("activated");

    assert_eq!(activated.status, SubscriptionStatus::Active);
    let code = activated.access_code.expect("access code");
    assert_ne!(code, taken);
    assert_eq!(code.len(), 8);

    Ok(())
}

#[tokio::test]
async fn test_cancel_and_invalid_transitions() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let (gym, plan) = app.gym_with_plan(1500).await?;
    let staff = Uuid::new_v4();

    let checkout = app
        .ctx
        .subscription_service
        .request_subscription(
            CreateSubscriptionRequest {
                user_id: Uuid::new_v4(),
                gym_id: gym.id,
                plan_id: plan.id,
            },
            None,
        )
        .await?;
    let id = checkout.subscription.id;

    app.ctx.subscription_service.activate_manually(id, staff).await?;
    let cancelled = app
        .ctx
        .subscription_service
        .cancel(
            id,
            staff,
            CancelSubscriptionRequest {
                reason: Some("moved away".to_string()),
            },
        )
        .await?;
    assert_eq!(cancelled.status, SubscriptionStatus::Cancelled);

    // Cancelled is terminal
    let err = app.ctx.subscription_service.activate_manually(id, staff).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    let err = app
        .ctx
        .subscription_service
        .cancel(id, staff, CancelSubscriptionRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let err = app
        .ctx
        .subscription_service
        .cancel(Uuid::new_v4(), staff, CancelSubscriptionRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    Ok(())
}
