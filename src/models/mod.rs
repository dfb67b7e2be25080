pub mod batch;
pub mod common;
pub mod reservation;
pub mod token;

pub use batch::*;
pub use common::*;
pub use reservation::*;
pub use token::*;
