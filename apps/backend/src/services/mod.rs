pub mod fulltext;
pub mod revisions;
