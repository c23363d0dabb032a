pub mod auth;
pub mod device;
pub mod fulltext;
pub mod sync;
