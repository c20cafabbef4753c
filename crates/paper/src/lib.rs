use async_trait::async_trait;
use tracing::info;

use common::{Config, Error, Exchange, ExchangeSummary, Result};

/// Account settings for a simulated exchange.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExchangeSettings {
    /// Cash charged on every fill, buy or sell.
    pub fixed_cost: f64,
    /// Units of the security held when the account is opened.
    pub initial_investment: f64,
}

impl ExchangeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            fixed_cost: config.fixed_cost,
            initial_investment: config.initial_investment,
        }
    }
}

/// Simulated exchange for backtesting.
///
/// Every transaction fills instantly and completely at the requested price.
/// No partial fills, no slippage, no rejection. Nothing is ever sent to a
/// real venue.
#[derive(Debug)]
pub struct FakeExchange {
    fixed_cost: f64,
    /// Units of BTC held. Positive = long, negative = short.
    current_balance: f64,
    /// USD spent (negative) or received (positive) since the account opened.
    currency_held: f64,
    num_purchases: u64,
    num_sales: u64,
    last_price: Option<f64>,
}

impl FakeExchange {
    pub const NAME: &'static str = "fake_exchange";

    /// Security being traded.
    pub const BASE: &'static str = "BTC";
    /// Currency it is priced in.
    pub const QUOTE: &'static str = "USD";

    pub fn new(settings: ExchangeSettings) -> Self {
        info!(
            initial_investment = settings.initial_investment,
            fixed_cost = settings.fixed_cost,
            "Opened an account with the fake exchange"
        );
        Self {
            fixed_cost: settings.fixed_cost,
            current_balance: settings.initial_investment,
            currency_held: 0.0,
            num_purchases: 0,
            num_sales: 0,
            last_price: None,
        }
    }

    pub fn currency_held(&self) -> f64 {
        self.currency_held
    }

    pub fn num_purchases(&self) -> u64 {
        self.num_purchases
    }

    pub fn num_sales(&self) -> u64 {
        self.num_sales
    }

    /// Mark-to-market standing at `price`.
    pub fn profit_loss(&self, price: f64) -> f64 {
        self.current_balance * price + self.currency_held
    }

    fn check_fill(qty: f64, price: f64) -> Result<()> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if valid(qty) && valid(price) {
            Ok(())
        } else {
            Err(Error::InvalidTransaction { amount: qty, price })
        }
    }
}

#[async_trait]
impl Exchange for FakeExchange {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn buy(&mut self, qty: f64, price: f64) -> Result<()> {
        Self::check_fill(qty, price)?;

        let cost = qty * price + self.fixed_cost;
        self.currency_held -= cost;
        self.current_balance += qty;
        self.num_purchases += 1;
        self.last_price = Some(price);

        info!(
            qty,
            price,
            cost,
            usd = self.currency_held,
            btc = self.current_balance,
            pnl = self.profit_loss(price),
            "Exch: BUY {qty}x{} for {cost}",
            Self::BASE
        );
        Ok(())
    }

    async fn sell(&mut self, qty: f64, price: f64) -> Result<()> {
        Self::check_fill(qty, price)?;

        let proceeds = qty * price - self.fixed_cost;
        self.currency_held += proceeds;
        self.current_balance -= qty;
        self.num_sales += 1;
        self.last_price = Some(price);

        info!(
            qty,
            price,
            proceeds,
            usd = self.currency_held,
            btc = self.current_balance,
            pnl = self.profit_loss(price),
            "Exch: SELL {qty}x{} for {proceeds}",
            Self::BASE
        );
        Ok(())
    }

    fn current_balance(&self) -> f64 {
        self.current_balance
    }

    fn summary(&self) -> ExchangeSummary {
        ExchangeSummary {
            current_balance: self.current_balance,
            currency_held: self.currency_held,
            num_purchases: self.num_purchases,
            num_sales: self.num_sales,
            last_price: self.last_price,
            profit_loss: self.last_price.map(|p| self.profit_loss(p)),
        }
    }
}
