use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::models::SeatType;

/// Fixed rate table, in the gateway currency's smallest unit.
pub fn ticket_price(seat_type: SeatType) -> Decimal {
    match seat_type {
        SeatType::Regular => Decimal::from(50_000),
        SeatType::Vip => Decimal::from(75_000),
        SeatType::Premium => Decimal::from(100_000),
    }
}

/// The integer amount the gateway charges for `price`. `None` for
/// fractional or out-of-range prices.
pub fn charge_amount(price: Decimal) -> Option<i64> {
    if price.fract() != Decimal::ZERO || price.is_sign_negative() {
        return None;
    }
    price.to_i64()
}
