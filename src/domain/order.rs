use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{SwapResult, Venue};
use crate::error::{Result, SwapError};

/// Slippage tolerance applied when the client does not send one
pub const DEFAULT_SLIPPAGE: Decimal = dec!(0.01);

/// Order lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Accepted at ingress, waiting for a worker
    Pending,
    /// Collecting quotes from venues
    Routing,
    /// Venue chosen, assembling the transaction
    Building,
    /// Handed to the venue for execution
    Submitted,
    /// Swap executed
    Confirmed,
    /// Gave up on the order
    Failed,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Routing,
        OrderStatus::Building,
        OrderStatus::Submitted,
        OrderStatus::Confirmed,
        OrderStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Routing => "routing",
            OrderStatus::Building => "building",
            OrderStatus::Submitted => "submitted",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Confirmed | OrderStatus::Failed)
    }

    /// Check if this state can transition to another state
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        use OrderStatus::*;

        match (self, target) {
            (Pending, Routing) => true,
            (Routing, Building) => true,
            (Building, Submitted) => true,
            (Submitted, Confirmed) => true,

            // Any error before a terminal state
            (Pending | Routing | Building | Submitted, Failed) => true,

            _ => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for OrderStatus {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "routing" => Ok(OrderStatus::Routing),
            "building" => Ok(OrderStatus::Building),
            "submitted" => Ok(OrderStatus::Submitted),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "failed" => Ok(OrderStatus::Failed),
            _ => Err(format!("Unknown order status: {}", s)),
        }
    }
}

/// A swap order and its progression through the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: Decimal,
    pub slippage: Decimal,
    pub status: OrderStatus,
    pub selected_venue: Option<Venue>,
    pub executed_price: Option<Decimal>,
    pub tx_hash: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a new pending order with a fresh id
    pub fn new(
        token_in: impl Into<String>,
        token_out: impl Into<String>,
        amount_in: Decimal,
        slippage: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            token_in: token_in.into(),
            token_out: token_out.into(),
            amount_in,
            slippage,
            status: OrderStatus::Pending,
            selected_venue: None,
            executed_price: None,
            tx_hash: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `target`, refusing anything the state machine does not allow.
    pub fn transition(&mut self, target: OrderStatus) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(SwapError::InvalidStateTransition {
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }
        if target == OrderStatus::Building && self.selected_venue.is_none() {
            return Err(SwapError::Build(
                "cannot enter building without a selected venue".to_string(),
            ));
        }

        self.status = target;
        self.touch();
        Ok(())
    }

    /// Record the venue chosen by the router. The choice is fixed once made.
    pub fn select_venue(&mut self, venue: Venue) -> Result<()> {
        match self.selected_venue {
            Some(existing) if existing != venue => Err(SwapError::Build(format!(
                "order already routed to {}, cannot switch to {}",
                existing, venue
            ))),
            _ => {
                self.selected_venue = Some(venue);
                Ok(())
            }
        }
    }

    pub fn confirm(&mut self, swap: &SwapResult) -> Result<()> {
        self.transition(OrderStatus::Confirmed)?;
        self.tx_hash = Some(swap.tx_hash.clone());
        self.executed_price = Some(swap.executed_price);
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        self.transition(OrderStatus::Failed)?;
        self.error = Some(message.into());
        Ok(())
    }

    // updated_at never moves backwards, even if the wall clock does
    fn touch(&mut self) {
        let now = Utc::now();
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// Check the row-level invariants before the order is written anywhere
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.updated_at < self.created_at {
            errors.push("updated_at precedes created_at".to_string());
        }
        if self.amount_in <= Decimal::ZERO {
            errors.push(format!("amount_in must be positive: {}", self.amount_in));
        }
        if self.slippage < Decimal::ZERO {
            errors.push(format!("slippage cannot be negative: {}", self.slippage));
        }

        let confirmed = self.status == OrderStatus::Confirmed;
        if confirmed != self.tx_hash.is_some() || confirmed != self.executed_price.is_some() {
            errors.push("tx_hash and executed_price must be set exactly when confirmed".to_string());
        }
        if (self.status == OrderStatus::Failed) != self.error.is_some() {
            errors.push("error must be set exactly when failed".to_string());
        }
        if matches!(
            self.status,
            OrderStatus::Building | OrderStatus::Submitted | OrderStatus::Confirmed
        ) && self.selected_venue.is_none()
        {
            errors.push(format!("{} order has no selected venue", self.status));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
