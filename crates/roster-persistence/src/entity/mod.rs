//! `SeaORM` entities for the source-of-truth tables

pub mod prelude;

pub mod group_info;
pub mod group_member;
pub mod user_info;
