pub mod sqlite;

pub use sqlite::{EntityRow, FoodPreference, ListFilter, SqliteStructuredStore};
