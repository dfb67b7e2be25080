pub mod admin;
pub mod batch;
pub mod reservation;
pub mod token;

pub use admin::admin_config;
pub use batch::batch_config;
pub use reservation::reservation_config;
pub use token::token_config;
