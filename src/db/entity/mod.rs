pub mod wallet;
pub mod transaction;
pub mod token_balance;

pub use wallet::Entity as Wallet;
pub use transaction::Entity as Transaction;
pub use token_balance::Entity as TokenBalance;
