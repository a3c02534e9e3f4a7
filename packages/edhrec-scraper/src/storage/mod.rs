pub mod postgres;

pub use postgres::PostgresScraperStorage;
