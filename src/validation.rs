/// Input validation for order requests
///
/// Every check returns `SwapError::InvalidRequest` with a message that can be
/// shown to the client as-is. Nothing here touches the store: a request that
/// fails validation never becomes an order row.
use crate::domain::{Order, DEFAULT_SLIPPAGE};
use crate::error::{Result, SwapError};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Longest symbol the `orders` table can hold
pub const MAX_SYMBOL_LEN: usize = 50;

/// Validate a token symbol or mint address
///
/// Accepts ASCII letters, digits, `-`, `_` and `.`, up to [`MAX_SYMBOL_LEN`]
/// characters. Surrounding whitespace is trimmed.
pub fn validate_token_symbol(raw: Option<&str>, field_name: &str) -> Result<String> {
    let symbol = raw.map(str::trim).unwrap_or_default();

    if symbol.is_empty() {
        return Err(SwapError::InvalidRequest(format!("{} is required", field_name)));
    }

    if symbol.len() > MAX_SYMBOL_LEN {
        return Err(SwapError::InvalidRequest(format!(
            "{} exceeds {} characters",
            field_name, MAX_SYMBOL_LEN
        )));
    }

    if !symbol
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(SwapError::InvalidRequest(format!(
            "{} contains invalid characters: {}",
            field_name, symbol
        )));
    }

    Ok(symbol.to_string())
}

/// Validate the input amount (positive decimal)
pub fn validate_amount(raw: Option<&str>) -> Result<Decimal> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(SwapError::InvalidRequest("amount_in is required".to_string()));
    }

    let amount = Decimal::from_str(raw).map_err(|_| {
        SwapError::InvalidRequest(format!("amount_in is not a decimal number: {}", raw))
    })?;

    if amount <= Decimal::ZERO {
        return Err(SwapError::InvalidRequest(format!(
            "amount_in must be positive: {}",
            amount
        )));
    }

    Ok(amount)
}

/// Validate slippage tolerance, defaulting when absent
///
/// Must lie in `[0, 1)`: a tolerance of 100% would accept any fill.
pub fn validate_slippage(raw: Option<&str>) -> Result<Decimal> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(DEFAULT_SLIPPAGE),
        Some(raw) => raw,
    };

    let slippage = Decimal::from_str(raw).map_err(|_| {
        SwapError::InvalidRequest(format!("slippage is not a decimal number: {}", raw))
    })?;

    if slippage < Decimal::ZERO || slippage >= Decimal::ONE {
        return Err(SwapError::InvalidRequest(format!(
            "slippage must be at least 0 and below 1: {}",
            slippage
        )));
    }

    Ok(slippage)
}

/// Build a new pending order from raw request parameters
pub fn order_from_params(
    token_in: Option<&str>,
    token_out: Option<&str>,
    amount_in: Option<&str>,
    slippage: Option<&str>,
) -> Result<Order> {
    let token_in = validate_token_symbol(token_in, "token_in")?;
    let token_out = validate_token_symbol(token_out, "token_out")?;
    if token_in.eq_ignore_ascii_case(&token_out) {
        return Err(SwapError::InvalidRequest(format!(
            "token_in and token_out must differ: {}",
            token_in
        )));
    }

    let amount_in = validate_amount(amount_in)?;
    let slippage = validate_slippage(slippage)?;

    Ok(Order::new(token_in, token_out, amount_in, slippage))
}
