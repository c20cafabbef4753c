use std::any::Any;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use common::{
    Component, Config, Error, Exchange, ExchangeSummary, Result, RunState, TaskOutcome, TaskState,
    TickSource, TransactionSink,
};
use paper::ExchangeSettings;
use strategy::{Strategy, StrategyRegistry, StrategyRunner};

use crate::executor::ExchangeExecutor;
use crate::feed::TickFeed;
use crate::registry::{DataSourceRegistry, ExchangeRegistry};

/// What happens to the strategy and exchange once the feed has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownPolicy {
    /// Abort both consumers as soon as the feed joins. Ticks and transactions
    /// still queued at that moment are dropped.
    #[default]
    Cancel,
    /// Close the channels and let both consumers finish what is queued.
    Drain,
}

/// Names and parameters of the three components for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacktestRequest {
    pub strategy: String,
    #[serde(default)]
    pub strategy_params: String,
    pub exchange: String,
    pub datasource: String,
    #[serde(default)]
    pub datasource_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub run_id: Uuid,
    pub ticks_published: u64,
    pub outcomes: Vec<TaskOutcome>,
    /// Account state after the last fill the exchange applied.
    pub exchange: ExchangeSummary,
    pub transitions: Vec<RunState>,
}

impl BacktestReport {
    /// True unless some task failed.
    pub fn is_success(&self) -> bool {
        !self.outcomes.iter().any(|o| o.state.is_failed())
    }

    pub fn outcome(&self, component: Component) -> Option<&TaskState> {
        self.outcomes
            .iter()
            .find(|o| o.component == component)
            .map(|o| &o.state)
    }
}

/// Wires one tick source, one strategy and one exchange together and runs a
/// single backtest to completion.
///
/// A `Backtest` is consumed by `run`, so `Terminated` is reached exactly once
/// per instance. Use a fresh one per run.
pub struct Backtest {
    config: Config,
    shutdown: ShutdownPolicy,
    strategies: StrategyRegistry,
    exchanges: ExchangeRegistry,
    datasources: DataSourceRegistry,
    state: RunState,
    transitions: Vec<RunState>,
}

impl Backtest {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            shutdown: ShutdownPolicy::default(),
            strategies: StrategyRegistry::default(),
            exchanges: ExchangeRegistry::default(),
            datasources: DataSourceRegistry::default(),
            state: RunState::Created,
            transitions: vec![RunState::Created],
        }
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownPolicy) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Resolve and build the components named in `request`, then run them.
    ///
    /// Any setup failure (unknown name, unloadable data, bad strategy
    /// parameters) terminates the run before a task is spawned and is
    /// returned as the error.
    pub async fn run(self, request: &BacktestRequest) -> Result<BacktestReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("backtest", %run_id);
        self.execute(run_id, request).instrument(span).await
    }

    /// Run already-built components. Used when the caller constructs the
    /// pieces itself.
    pub async fn run_components(
        mut self,
        source: Box<dyn TickSource>,
        strategy: Box<dyn Strategy>,
        exchange: Box<dyn Exchange>,
    ) -> Result<BacktestReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("backtest", %run_id);
        async move {
            self.transition(RunState::Wiring);
            Ok(self.launch(run_id, source, strategy, exchange).await)
        }
        .instrument(span)
        .await
    }

    async fn execute(mut self, run_id: Uuid, request: &BacktestRequest) -> Result<BacktestReport> {
        info!(
            strategy = %request.strategy,
            strategy_params = %request.strategy_params,
            exchange = %request.exchange,
            datasource = %request.datasource,
            datasource_path = %request.datasource_path,
            shutdown = ?self.shutdown,
            "Starting backtest"
        );
        self.transition(RunState::Wiring);

        match self.wire(request).await {
            Ok((source, strategy, exchange)) => {
                Ok(self.launch(run_id, source, strategy, exchange).await)
            }
            Err((component, e)) => {
                error!(%component, error = %e, "Backtest setup failed");
                self.transition(RunState::Terminated);
                Err(e)
            }
        }
    }

    /// Resolve every name first so a typo never costs a download, then load
    /// the data, open the account and configure the strategy.
    async fn wire(
        &self,
        request: &BacktestRequest,
    ) -> std::result::Result<
        (Box<dyn TickSource>, Box<dyn Strategy>, Box<dyn Exchange>),
        (Component, Error),
    > {
        let kind = self
            .datasources
            .resolve(&request.datasource)
            .map_err(|e| (Component::TickSource, e))?;
        let open_account = self
            .exchanges
            .resolve(&request.exchange)
            .map_err(|e| (Component::Exchange, e))?;
        let mut strategy = self
            .strategies
            .create(&request.strategy)
            .map_err(|e| (Component::Strategy, e))?;

        let source = kind
            .load(&request.datasource_path, &self.config)
            .await
            .map_err(|e| (Component::TickSource, e))?;

        let exchange = open_account(ExchangeSettings::from_config(&self.config));

        strategy
            .configure(&request.strategy_params)
            .map_err(|e| (Component::Strategy, e))?;
        info!(strategy = %strategy.name(), params = %request.strategy_params, "Strategy configured");

        Ok((source, strategy, exchange))
    }

    async fn launch(
        mut self,
        run_id: Uuid,
        source: Box<dyn TickSource>,
        strategy: Box<dyn Strategy>,
        exchange: Box<dyn Exchange>,
    ) -> BacktestReport {
        let capacity = self.config.channel_capacity;
        let (tick_tx, tick_rx) = mpsc::channel(capacity);
        let (transaction_tx, transaction_rx) = mpsc::channel(capacity);

        let (executor, summary_rx) = ExchangeExecutor::new(exchange);
        let runner = StrategyRunner::new(strategy, TransactionSink::new(transaction_tx.clone()));
        let feed = TickFeed::new(source, tick_tx.clone());

        // Kept to prevent channel close: under `Cancel` the consumers must
        // never see their input end.
        let held_senders = (tick_tx, transaction_tx);

        self.transition(RunState::Running);
        let exchange_task = tokio::spawn(executor.run(transaction_rx).in_current_span());
        let strategy_task = tokio::spawn(runner.run(tick_rx).in_current_span());
        let feed_task = tokio::spawn(feed.run().in_current_span());

        let feed_state = task_state(feed_task.await);
        let ticks_published = match feed_state {
            TaskState::Completed { processed } => processed,
            _ => 0,
        };

        self.transition(RunState::Draining);
        let (strategy_state, exchange_state) = match self.shutdown {
            ShutdownPolicy::Cancel => {
                strategy_task.abort();
                exchange_task.abort();
                let states = (
                    task_state(strategy_task.await),
                    task_state(exchange_task.await),
                );
                drop(held_senders);
                states
            }
            ShutdownPolicy::Drain => {
                drop(held_senders);
                // The strategy owns the last transaction sender, so the
                // exchange sees closure only after the strategy is done.
                let strategy_state = task_state(strategy_task.await);
                let exchange_state = task_state(exchange_task.await);
                (strategy_state, exchange_state)
            }
        };

        let outcomes = vec![
            TaskOutcome {
                component: Component::TickSource,
                state: feed_state,
            },
            TaskOutcome {
                component: Component::Strategy,
                state: strategy_state,
            },
            TaskOutcome {
                component: Component::Exchange,
                state: exchange_state,
            },
        ];
        for outcome in &outcomes {
            log_outcome(outcome);
        }

        let summary = *summary_rx.borrow();
        info!(
            ticks_published,
            position = summary.current_balance,
            cash = summary.currency_held,
            purchases = summary.num_purchases,
            sales = summary.num_sales,
            pnl = ?summary.profit_loss,
            "Trading summary"
        );

        self.transition(RunState::Terminated);
        BacktestReport {
            run_id,
            ticks_published,
            outcomes,
            exchange: summary,
            transitions: self.transitions,
        }
    }

    fn transition(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        info!(from = %self.state, to = %next, "Run state changed");
        self.state = next;
        self.transitions.push(next);
    }
}

/// Classify how a pipeline task ended.
fn task_state(joined: std::result::Result<Result<u64>, JoinError>) -> TaskState {
    match joined {
        Ok(Ok(processed)) => TaskState::Completed { processed },
        // Forced unblock because the other end went away.
        Ok(Err(Error::ChannelClosed(_))) => TaskState::Cancelled,
        Ok(Err(e)) => TaskState::Failed {
            error: e.to_string(),
        },
        Err(e) if e.is_cancelled() => TaskState::Cancelled,
        Err(e) => match e.try_into_panic() {
            Ok(payload) => TaskState::Failed {
                error: format!("panicked: {}", panic_message(payload.as_ref())),
            },
            Err(e) => TaskState::Failed {
                error: e.to_string(),
            },
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    }
}

fn log_outcome(outcome: &TaskOutcome) {
    let component = outcome.component;
    match &outcome.state {
        TaskState::Completed { processed } => {
            info!(%component, processed, "Task completed")
        }
        TaskState::Cancelled => info!(%component, "Task cancelled"),
        TaskState::Failed { error } => error!(%component, %error, "Task failed"),
    }
}
