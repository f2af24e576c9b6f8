pub mod accounts;
pub mod blog;
pub mod category;
pub mod favorite;
pub mod rating;
