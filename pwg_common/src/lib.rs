mod currency;
mod minor_units;

pub mod op;
mod secret;

pub use currency::{currency_decimals, sanitize};
pub use minor_units::{MinorUnits, MinorUnitsConversionError};
pub use secret::Secret;
