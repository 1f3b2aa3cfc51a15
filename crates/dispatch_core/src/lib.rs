pub mod clock;
pub mod error;
pub mod lifecycle;
pub mod matching;
pub mod pricing;
pub mod spatial;
pub mod store;
pub mod trip;
pub mod views;
