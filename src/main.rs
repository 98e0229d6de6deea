//! # Recurring Billing server
//!
//! Serves the PayPal IPN endpoint and the purchase API, and runs the
//! reminder job on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use recurring_billing::adapters::http::{app, BillingAppState};
use recurring_billing::adapters::{
    LoggingEmailSender, PayPalApiConfig, PayPalClient, PayPalNotificationVerifier,
    PostgresPurchaseStore, ResendEmailSender, SystemClock,
};
use recurring_billing::application::{
    BeginCheckoutHandler, CheckAccessHandler, HandleNotificationHandler, NotificationSettings,
    ReminderSettings, RunRemindersHandler, SubscriptionLifecycle, UnsubscribeHandler,
};
use recurring_billing::config::{AppConfig, LogFormat};
use recurring_billing::domain::billing::TokenCodec;
use recurring_billing::domain::ipn::CheckoutSettings;
use recurring_billing::ports::{Clock, EmailSender, NoopCallback, PurchaseStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    init_tracing(&config.server.log_filter, config.server.log_format);
    config.validate()?;

    tracing::info!(
        environment = ?config.server.environment,
        sandbox = config.paypal.sandbox,
        realm = %config.billing.realm,
        "Configuration loaded"
    );

    // Database
    let pool = config
        .database
        .pool_options()
        .connect(&config.database.url)
        .await?;
    tracing::info!("Connected to PostgreSQL");

    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database migrations complete");
    }

    // Adapters
    let store: Arc<dyn PurchaseStore> = Arc::new(PostgresPurchaseStore::new(pool));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let paypal_timeout = config.paypal.request_timeout();
    let processor = Arc::new(PayPalClient::new(PayPalApiConfig::new(
        config.paypal.client_id.clone(),
        config.paypal.client_secret.clone(),
        config.paypal.sandbox,
        paypal_timeout,
    ))?);
    let verifier = Arc::new(PayPalNotificationVerifier::for_environment(
        config.paypal.sandbox,
        paypal_timeout,
    )?);
    let email_sender: Arc<dyn EmailSender> = match &config.email.resend_api_key {
        Some(key) => Arc::new(ResendEmailSender::new(
            key.clone(),
            config.email.sender.clone(),
            config.email.send_timeout(),
        )?),
        None => {
            tracing::warn!("No Resend API key configured, emails are only logged");
            Arc::new(LoggingEmailSender)
        }
    };
    let tokens = TokenCodec::new(&config.billing.realm, &config.billing.secret_key)?;

    // Application
    let lifecycle = Arc::new(SubscriptionLifecycle::new(
        store.clone(),
        processor.clone(),
        email_sender.clone(),
        clock.clone(),
    ));

    let state = BillingAppState {
        notifications: Arc::new(HandleNotificationHandler::new(
            store.clone(),
            verifier,
            processor,
            Arc::new(NoopCallback),
            lifecycle.clone(),
            clock.clone(),
            tokens.clone(),
            NotificationSettings {
                business_email: config.paypal.business_email.clone(),
                auto_refund: config.billing.auto_refund,
            },
        )),
        unsubscribe: Arc::new(UnsubscribeHandler::new(lifecycle)),
        checkout: Arc::new(BeginCheckoutHandler::new(
            store.clone(),
            clock.clone(),
            tokens,
            CheckoutSettings {
                business: config.paypal.checkout_business().to_string(),
                notify_url: config.billing.notify_url(),
                sandbox: config.paypal.sandbox,
            },
        )),
        access: Arc::new(CheckAccessHandler::new(store.clone(), clock.clone())),
    };

    let reminders = RunRemindersHandler::new(
        store,
        email_sender,
        clock,
        ReminderSettings {
            days_before_due: config.billing.days_before_due_remind,
            days_before_trial_end: config.billing.days_before_trial_end_remind,
        },
    );
    match config.billing.reminder_interval() {
        Some(period) => {
            tokio::spawn(run_reminder_loop(reminders, period));
        }
        None => tracing::info!("Reminder scheduler disabled"),
    }

    // Server
    let addr = config.server.listen_addr()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Starting HTTP server");

    axum::serve(listener, app(state, config.server.request_timeout()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(log_filter: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_filter));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init(),
    }
}

/// Runs the reminder job every `period`. A failed run is logged and retried
/// on the next tick.
async fn run_reminder_loop(handler: RunRemindersHandler, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        if let Err(e) = handler.handle().await {
            tracing::error!(error = %e, "Reminder run failed");
        }
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
