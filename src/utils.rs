pub mod media;
pub mod pagination;
pub mod password;
pub mod slug;
pub mod token;
