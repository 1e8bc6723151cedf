//! SubscriptionEngine - caller-facing API over the subscription handlers.
//!
//! Holds the shared ports and the per-owner locks, and builds handlers on
//! demand for each call.

use std::sync::Arc;

use thiserror::Error;

use super::handlers::subscription::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionResult,
    ConsumeQuotaCommand, ConsumeQuotaHandler, ConsumeQuotaResult, CreateOrChangePlanCommand,
    CreateOrChangePlanHandler, CreateOrChangePlanResult, GetSubscriptionHandler,
    GetSubscriptionQuery, GetSubscriptionResult, HandlePaymentWebhookCommand,
    HandlePaymentWebhookHandler, HandlePaymentWebhookResult, ReactivateSubscriptionCommand,
    ReactivateSubscriptionHandler, ReactivateSubscriptionResult, RolloverSweepCommand,
    RolloverSweepHandler, RolloverSweepResult,
};
use super::OwnerLocks;
use crate::adapters::events::InMemoryEventBus;
use crate::adapters::memory::{
    InMemoryFounderAllocator, InMemorySubscriptionRepository, InMemoryWebhookEventRepository,
};
use crate::adapters::payment::{HttpPaymentGateway, MockPaymentGateway};
use crate::adapters::postgres::{
    self, PostgresFounderAllocator, PostgresSubscriptionRepository, PostgresWebhookEventRepository,
};
use crate::config::{AppConfig, BillingConfig, ConfigValidationError};
use crate::domain::foundation::{DomainError, OwnerId};
use crate::domain::subscription::{
    AccountKind, CancellationMode, FounderSnapshot, PlanTier, SubscriptionError,
};
use crate::ports::{
    Clock, EventPublisher, FounderAllocator, PaymentGateway, SubscriptionRepository, SystemClock,
    WebhookEventRepository,
};

/// Errors while wiring the engine from configuration.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigValidationError),

    #[error("Storage initialization failed: {0}")]
    Storage(#[from] DomainError),
}

/// Adapters the engine runs on.
#[derive(Clone)]
pub struct EnginePorts {
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub founders: Arc<dyn FounderAllocator>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub webhook_events: Arc<dyn WebhookEventRepository>,
    pub event_publisher: Arc<dyn EventPublisher>,
    pub clock: Arc<dyn Clock>,
}

impl EnginePorts {
    /// In-memory storage, the given gateway, and the wall clock.
    pub fn in_memory(billing: &BillingConfig, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            subscriptions: Arc::new(InMemorySubscriptionRepository::new()),
            founders: Arc::new(InMemoryFounderAllocator::new(
                billing.professional_founder_limit,
                billing.business_founder_limit,
            )),
            gateway,
            webhook_events: Arc::new(InMemoryWebhookEventRepository::new()),
            event_publisher: Arc::new(InMemoryEventBus::new()),
            clock: Arc::new(SystemClock),
        }
    }
}

/// The subscription and billing lifecycle engine.
#[derive(Clone)]
pub struct SubscriptionEngine {
    ports: EnginePorts,
    billing: BillingConfig,
    locks: Arc<OwnerLocks>,
}

impl SubscriptionEngine {
    pub fn new(ports: EnginePorts, billing: BillingConfig) -> Self {
        Self {
            ports,
            billing,
            locks: Arc::new(OwnerLocks::new()),
        }
    }

    /// Wires adapters from configuration.
    ///
    /// PostgreSQL when `database` is set, in-memory otherwise. The HTTP
    /// gateway when `payment` is set, the mock gateway otherwise.
    pub async fn from_config(config: &AppConfig) -> Result<Self, BootstrapError> {
        config.validate()?;
        let billing = config.billing.clone();

        let gateway: Arc<dyn PaymentGateway> = match &config.payment {
            Some(payment) => Arc::new(HttpPaymentGateway::new(payment.gateway_config())),
            None => {
                tracing::warn!("No payment gateway configured, using the mock gateway");
                Arc::new(MockPaymentGateway::new())
            }
        };

        let ports = match &config.database {
            Some(database) => {
                let pool = postgres::connect(database).await?;
                if database.run_migrations {
                    postgres::run_migrations(&pool).await?;
                }
                let founders = PostgresFounderAllocator::new(pool.clone());
                founders
                    .initialize(billing.professional_founder_limit, billing.business_founder_limit)
                    .await?;
                EnginePorts {
                    subscriptions: Arc::new(PostgresSubscriptionRepository::new(pool.clone())),
                    founders: Arc::new(founders),
                    gateway,
                    webhook_events: Arc::new(PostgresWebhookEventRepository::new(pool)),
                    event_publisher: Arc::new(InMemoryEventBus::new()),
                    clock: Arc::new(SystemClock),
                }
            }
            None => EnginePorts::in_memory(&billing, gateway),
        };

        tracing::info!(
            postgres = config.database.is_some(),
            http_gateway = config.payment.is_some(),
            founder_discount_percent = billing.founder_discount_percent,
            "Subscription engine ready"
        );
        Ok(Self::new(ports, billing))
    }

    pub fn ports(&self) -> &EnginePorts {
        &self.ports
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Handlers
    // ════════════════════════════════════════════════════════════════════════════

    fn create_or_change_plan_handler(&self) -> CreateOrChangePlanHandler {
        CreateOrChangePlanHandler::new(
            self.ports.subscriptions.clone(),
            self.ports.founders.clone(),
            self.ports.event_publisher.clone(),
            self.ports.clock.clone(),
            self.locks.clone(),
            self.billing.founder_pricing(),
        )
    }

    fn cancel_handler(&self) -> CancelSubscriptionHandler {
        CancelSubscriptionHandler::new(
            self.ports.subscriptions.clone(),
            self.ports.gateway.clone(),
            self.ports.event_publisher.clone(),
            self.ports.clock.clone(),
            self.locks.clone(),
        )
    }

    fn reactivate_handler(&self) -> ReactivateSubscriptionHandler {
        ReactivateSubscriptionHandler::new(
            self.ports.subscriptions.clone(),
            self.ports.event_publisher.clone(),
            self.ports.clock.clone(),
            self.locks.clone(),
        )
    }

    fn consume_quota_handler(&self) -> ConsumeQuotaHandler {
        ConsumeQuotaHandler::new(
            self.ports.subscriptions.clone(),
            self.ports.event_publisher.clone(),
            self.ports.clock.clone(),
            self.locks.clone(),
        )
    }

    fn get_subscription_handler(&self) -> GetSubscriptionHandler {
        GetSubscriptionHandler::new(
            self.ports.subscriptions.clone(),
            self.ports.event_publisher.clone(),
            self.ports.clock.clone(),
            self.locks.clone(),
        )
    }

    fn webhook_handler(&self) -> HandlePaymentWebhookHandler {
        HandlePaymentWebhookHandler::new(
            self.ports.subscriptions.clone(),
            self.ports.gateway.clone(),
            self.ports.webhook_events.clone(),
            self.ports.event_publisher.clone(),
            self.ports.clock.clone(),
            self.locks.clone(),
        )
    }

    fn rollover_sweep_handler(&self) -> RolloverSweepHandler {
        RolloverSweepHandler::new(
            self.ports.subscriptions.clone(),
            self.ports.event_publisher.clone(),
            self.ports.clock.clone(),
            self.locks.clone(),
            self.billing.rollover_concurrency,
        )
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Operations
    // ════════════════════════════════════════════════════════════════════════════

    pub async fn create_or_change_plan(
        &self,
        owner_id: OwnerId,
        account_kind: AccountKind,
        tier: PlanTier,
    ) -> Result<CreateOrChangePlanResult, SubscriptionError> {
        self.create_or_change_plan_handler()
            .handle(CreateOrChangePlanCommand {
                owner_id,
                account_kind,
                tier,
            })
            .await
    }

    pub async fn cancel(
        &self,
        owner_id: OwnerId,
        account_kind: AccountKind,
        mode: CancellationMode,
    ) -> Result<CancelSubscriptionResult, SubscriptionError> {
        self.cancel_handler()
            .handle(CancelSubscriptionCommand {
                owner_id,
                account_kind,
                mode,
            })
            .await
    }

    pub async fn reactivate(
        &self,
        owner_id: OwnerId,
        account_kind: AccountKind,
    ) -> Result<ReactivateSubscriptionResult, SubscriptionError> {
        self.reactivate_handler()
            .handle(ReactivateSubscriptionCommand {
                owner_id,
                account_kind,
            })
            .await
    }

    pub async fn consume_unit(
        &self,
        owner_id: OwnerId,
        account_kind: AccountKind,
    ) -> Result<ConsumeQuotaResult, SubscriptionError> {
        self.consume_quota_handler()
            .handle(ConsumeQuotaCommand {
                owner_id,
                account_kind,
            })
            .await
    }

    pub async fn get_subscription(
        &self,
        owner_id: OwnerId,
        account_kind: AccountKind,
    ) -> Result<GetSubscriptionResult, SubscriptionError> {
        self.get_subscription_handler()
            .handle(GetSubscriptionQuery {
                owner_id,
                account_kind,
            })
            .await
    }

    pub async fn handle_payment_webhook(
        &self,
        payload: Vec<u8>,
        signature: impl Into<String>,
    ) -> Result<HandlePaymentWebhookResult, SubscriptionError> {
        self.webhook_handler()
            .handle(HandlePaymentWebhookCommand {
                payload,
                signature: signature.into(),
            })
            .await
    }

    /// Applies due rollovers; `batch_size` defaults to the configured one.
    pub async fn rollover_sweep(
        &self,
        batch_size: Option<usize>,
    ) -> Result<RolloverSweepResult, SubscriptionError> {
        self.rollover_sweep_handler()
            .handle(RolloverSweepCommand {
                batch_size: batch_size.unwrap_or(self.billing.rollover_batch_size),
            })
            .await
    }

    pub async fn founder_snapshot(&self, account_kind: AccountKind) -> Result<FounderSnapshot, SubscriptionError> {
        Ok(self.ports.founders.snapshot(account_kind).await?)
    }

    /// Drops webhook ledger entries older than the retention window.
    pub async fn prune_webhook_events(&self) -> Result<u64, SubscriptionError> {
        let cutoff = self
            .ports
            .clock
            .now()
            .minus_days(self.billing.webhook_retention_days);
        let removed = self.ports.webhook_events.delete_before(cutoff).await?;
        if removed > 0 {
            tracing::info!(removed, "Pruned webhook ledger");
        }
        Ok(removed)
    }
}
