mod common;

use chrono::{Months, Utc};
use common::{captured_body, TestApp};
use gymsettle::{
    domain::{
        AuditQuery, CreateSubscriptionRequest, NotificationJob, SettlementStatus, SubscriptionStatus,
        WebhookEvent,
    },
    error::AppError,
    queue::{JobQueue, JobStatus, TOPIC_AUDIT, TOPIC_INVOICES, TOPIC_NOTIFICATIONS},
    repository::{AuditRepository, PaymentRepository, SubscriptionRepository},
    service::{ProcessOutcome, SubscriptionCheckout},
};
use uuid::Uuid;

fn event(body: Vec<u8>) -> WebhookEvent {
    WebhookEvent {
        event_type: "payment.captured".to_string(),
        raw_payload: String::from_utf8(body).unwrap(),
        verified: true,
        received_at: Utc::now(),
    }
}

async fn checkout(app: &TestApp, price: i64) -> anyhow::Result<SubscriptionCheckout> {
    let (gym, plan) = app.gym_with_plan(price).await?;
    Ok(app
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
        .await?)
}

#[tokio::test]
async fn test_capture_activates_subscription() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let checkout = checkout(&app, 1500).await?;
    let subscription = checkout.subscription;

    let before = Utc::now();
    let outcome = app
        .ctx
        .payment_processor
        .process(&event(captured_body(Some(subscription.id), &checkout.order.id, "pay_1", 1500)))
        .await?;

    let ProcessOutcome::Activated { payment_id, subscription_id } = outcome else {
        panic!("expected activation, got {:?}", outcome);
    };
    assert_eq!(subscription_id, subscription.id);

    let active = app.ctx.subscription_repo.find_by_id(subscription.id).await?.expect("subscription");
    assert_eq!(active.status, SubscriptionStatus::Active);
    assert_eq!(active.payment_id, Some(payment_id));
    assert_eq!(active.access_code.as_deref().map(str::len), Some(8));

    let start = active.start_date.expect("start date");
    let end = active.end_date.expect("end date");
    assert!(start >= before);
    assert_eq!(end, start.checked_add_months(Months::new(1)).unwrap());

    let payment = app.ctx.payment_repo.find_by_id(payment_id).await?.expect("payment");
    assert_eq!(payment.amount, 1500);
    assert_eq!(payment.settlement_status, SettlementStatus::Unsettled);
    assert_eq!(payment.gym_id, subscription.gym_id);
    assert_eq!(payment.method, "upi");

    // Side effects were queued, not executed inline
    assert_eq!(app.count_jobs(TOPIC_NOTIFICATIONS).await?, 1);
    assert_eq!(app.count_jobs(TOPIC_INVOICES).await?, 1);
    assert!(app.count_jobs(TOPIC_AUDIT).await? >= 2);

    Ok(())
}

#[tokio::test]
async fn test_redelivered_capture_is_a_no_op() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let checkout = checkout(&app, 1500).await?;
    let body = captured_body(Some(checkout.subscription.id), &checkout.order.id, "pay_1", 1500);

    let first = app.ctx.payment_processor.process(&event(body.clone())).await?;
    assert!(matches!(first, ProcessOutcome::Activated { .. }));
    let activated = app
        .ctx
        .subscription_repo
        .find_by_id(checkout.subscription.id)
        .await?
        .expect("subscription");
    let jobs_after_first = app.count_jobs(TOPIC_NOTIFICATIONS).await?;

    let second = app.ctx.payment_processor.process(&event(body)).await?;
    assert_eq!(second, ProcessOutcome::Duplicate);

    let payments = app.ctx.payment_repo.list_by_gym(checkout.subscription.gym_id).await?;
    assert_eq!(payments.len(), 1);

    let unchanged = app
        .ctx
        .subscription_repo
        .find_by_id(checkout.subscription.id)
        .await?
        .expect("subscription");
    assert_eq!(unchanged.access_code, activated.access_code);
    assert_eq!(unchanged.end_date, activated.end_date);
    assert_eq!(app.count_jobs(TOPIC_NOTIFICATIONS).await?, jobs_after_first);

    Ok(())
}

#[tokio::test]
async fn test_subscription_resolved_by_order_when_notes_empty() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let checkout = checkout(&app, 999).await?;

    let outcome = app
        .ctx
        .payment_processor
        .process(&event(captured_body(None, &checkout.order.id, "pay_9", 999)))
        .await?;

    assert!(matches!(outcome, ProcessOutcome::Activated { subscription_id, .. } if subscription_id == checkout.subscription.id));

    Ok(())
}

#[tokio::test]
async fn test_unknown_subscription_is_permanent() -> anyhow::Result<()> {
    let app = TestApp::new().await?;

    let err = app
        .ctx
        .payment_processor
        .process(&event(captured_body(Some(Uuid::new_v4()), "order_unknown", "pay_1", 1500)))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));
    assert!(!err.is_retryable());

    Ok(())
}

#[tokio::test]
async fn test_amount_mismatch_records_nothing() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let checkout = checkout(&app, 1500).await?;

    let err = app
        .ctx
        .payment_processor
        .process(&event(captured_body(Some(checkout.subscription.id), &checkout.order.id, "pay_1", 100)))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::PermanentProcessing(_)));
    assert!(app.ctx.payment_repo.list_by_gym(checkout.subscription.gym_id).await?.is_empty());

    let subscription = app
        .ctx
        .subscription_repo
        .find_by_id(checkout.subscription.id)
        .await?
        .expect("subscription");
    assert_eq!(subscription.status, SubscriptionStatus::Pending);

    Ok(())
}

#[tokio::test]
async fn test_capture_for_cancelled_subscription_records_payment_only() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let checkout = checkout(&app, 1500).await?;

    app.ctx
        .subscription_service
        .cancel(checkout.subscription.id, Uuid::new_v4(), Default::default())
        .await?;

    let outcome = app
        .ctx
        .payment_processor
        .process(&event(captured_body(Some(checkout.subscription.id), &checkout.order.id, "pay_1", 1500)))
        .await?;
    assert!(matches!(outcome, ProcessOutcome::Recorded { .. }));

    let subscription = app
        .ctx
        .subscription_repo
        .find_by_id(checkout.subscription.id)
        .await?
        .expect("subscription");
    assert_eq!(subscription.status, SubscriptionStatus::Cancelled);
    assert_eq!(app.count_jobs(TOPIC_NOTIFICATIONS).await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_second_activation_for_user_conflicts() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let (gym, plan) = app.gym_with_plan(1500).await?;
    let user_id = Uuid::new_v4();
    let request = CreateSubscriptionRequest {
        user_id,
        gym_id: gym.id,
        plan_id: plan.id,
    };

    // Two checkouts opened before either is paid
    let first = app.ctx.subscription_service.request_subscription(request.clone(), None).await?;
    let second = app.ctx.subscription_service.request_subscription(request, None).await?;

    app.ctx
        .payment_processor
        .process(&event(captured_body(Some(first.subscription.id), &first.order.id, "pay_1", 1500)))
        .await?;

    let err = app
        .ctx
        .payment_processor
        .process(&event(captured_body(Some(second.subscription.id), &second.order.id, "pay_2", 1500)))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    // Rolled back with the failed activation
    assert!(app
        .ctx
        .payment_repo
        .find_by_provider_ids(&second.order.id, "pay_2")
        .await?
        .is_none());

    Ok(())
}

#[tokio::test]
async fn test_failed_and_unknown_events_are_acknowledged() -> anyhow::Result<()> {
    let app = TestApp::new().await?;

    let failed = serde_json::json!({
        "event": "payment.failed",
        "payload": {
            "payment": {
                "entity": {
                    "id": "pay_x",
                    "order_id": "order_x",
                    "amount": 1500,
                    "currency": "INR",
                    "error_description": "Card declined",
                    "notes": []
                }
            }
        }
    });
    let outcome = app
        .ctx
        .payment_processor
        .process(&event(serde_json::to_vec(&failed)?))
        .await?;
    assert_eq!(outcome, ProcessOutcome::FailureRecorded);

    let refund = serde_json::json!({ "event": "refund.created", "payload": {} });
    let outcome = app
        .ctx
        .payment_processor
        .process(&event(serde_json::to_vec(&refund)?))
        .await?;
    assert_eq!(
        outcome,
        ProcessOutcome::Ignored {
            event_type: "refund.created".to_string()
        }
    );

    app.drain_all().await?;
    let audit = app
        .ctx
        .audit_repo
        .list(&AuditQuery {
            entity: Some("payment".to_string()),
            entity_id: Some("pay_x".to_string()),
            limit: None,
        })
        .await?;
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, "PAYMENT_FAILED");
    assert!(audit[0].actor_id.is_none());

    Ok(())
}

#[tokio::test]
async fn test_worker_parks_permanent_failures_and_runs_side_jobs() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let checkout = checkout(&app, 1500).await?;

    let good = captured_body(Some(checkout.subscription.id), &checkout.order.id, "pay_1", 1500);
    let bad = captured_body(Some(Uuid::new_v4()), "order_missing", "pay_2", 1500);

    let good_job = app
        .ctx
        .webhook_receiver
        .handle_webhook(&good, Some(&common::sign(&good)))
        .await?
        .job_id;
    let bad_job = app
        .ctx
        .webhook_receiver
        .handle_webhook(&bad, Some(&common::sign(&bad)))
        .await?
        .job_id;

    app.drain_all().await?;

    let job = app.ctx.queue.find_by_id(good_job).await?.expect("job");
    assert_eq!(job.status, JobStatus::Completed);

    let job = app.ctx.queue.find_by_id(bad_job).await?.expect("job");
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 1);
    assert!(job.last_error.as_deref().unwrap_or_default().starts_with("not_found"));

    // Access code, then the invoice link once the invoice rendered
    let sent = app.dispatcher.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 2);
    assert!(matches!(&sent[0], NotificationJob::WhatsAppAccessCode(n) if n.subscription_id == checkout.subscription.id));
    assert!(matches!(&sent[1], NotificationJob::WhatsAppInvoice(n) if n.invoice_url.starts_with("https://invoices.test/")));

    let invoices = app.invoices.requests.lock().unwrap().clone();
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0].plan_duration, "1 month");
    assert_eq!(invoices[0].gym_name, "Iron Temple");

    let audit = app
        .ctx
        .audit_repo
        .list(&AuditQuery {
            entity: Some("subscription".to_string()),
            entity_id: Some(checkout.subscription.id.to_string()),
            limit: None,
        })
        .await?;
    let actions: Vec<&str> = audit.iter().map(|e| e.action.as_str()).collect();
    assert!(actions.contains(&"SUBSCRIPTION_REQUESTED"));
    assert!(actions.contains(&"SUBSCRIPTION_ACTIVATED"));

    Ok(())
}

#[tokio::test]
async fn test_invoice_job_renders_and_sends_link() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let checkout = checkout(&app, 2400).await?;
    let subscription = checkout.subscription;

    let outcome = app
        .ctx
        .payment_processor
        .process(&event(captured_body(Some(subscription.id), &checkout.order.id, "pay_inv", 2400)))
        .await?;
    let ProcessOutcome::Activated { payment_id, .. } = outcome else {
        panic!("expected activation, got {:?}", outcome);
    };

    app.drain_all().await?;

    let active = app.ctx.subscription_repo.find_by_id(subscription.id).await?.expect("subscription");
    let invoices = app.invoices.requests.lock().unwrap().clone();
    assert_eq!(invoices.len(), 1);
    let request = &invoices[0];
    assert_eq!(request.subscription_id, subscription.id);
    assert_eq!(request.user_id, subscription.user_id);
    assert_eq!(request.payment_id, payment_id);
    assert_eq!(request.provider_payment_id, "pay_inv");
    assert_eq!(request.amount, 2400);
    assert_eq!(request.currency, "INR");
    assert_eq!(request.access_code, active.access_code);
    assert_eq!(request.end_date, active.end_date);
    assert_eq!(request.plan_name, "Monthly");
    assert_eq!(request.plan_duration, "1 month");

    let sent = app.dispatcher.sent.lock().unwrap().clone();
    let notice = sent
        .iter()
        .find_map(|job| match job {
            NotificationJob::WhatsAppInvoice(notice) => Some(notice.clone()),
            _ => None,
        })
        .expect("invoice notice");
    assert_eq!(notice.user_id, subscription.user_id);
    assert_eq!(notice.subscription_id, subscription.id);
    assert_eq!(notice.payment_id, payment_id);
    assert_eq!(notice.invoice_url, format!("https://invoices.test/{}.pdf", payment_id));

    Ok(())
}
