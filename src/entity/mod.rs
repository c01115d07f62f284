//! Entity values
//!
//! - `Value`: one logical field value
//! - `Decimal`: arbitrary-precision decimal with explicit scale
//! - `EntityBox`: one versioned record with block provenance

mod decimal;
mod entity_box;
mod value;

pub use decimal::{Decimal, ParseDecimalError};
pub use entity_box::EntityBox;
pub use value::Value;
