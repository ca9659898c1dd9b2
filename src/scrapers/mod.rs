pub mod base;
pub mod finnhub;
pub mod rapidapi;
