pub mod wallet;

pub use wallet::{WalletGateway, WalletServiceClient};
