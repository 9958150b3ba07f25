mod balance;
mod coin;

pub use balance::{GroupedBalance, RawBalanceRecord};
pub use coin::{CoinInfo, CoinQuote, MISSING_NUMBER, MISSING_RANK};
