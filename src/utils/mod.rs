pub mod code_generator;
pub mod functional_date;
pub mod signer;

pub use code_generator::generate_token_id;
pub use functional_date::{derive_functional_date, parse_functional_date};
pub use signer::TokenSigner;
