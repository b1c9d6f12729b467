//! Site profiles for the shopping sites the scraper understands

pub mod google_shopping;
