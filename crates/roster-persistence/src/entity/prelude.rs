//! `SeaORM` entity prelude

pub use super::group_info::Entity as GroupInfo;
pub use super::group_member::Entity as GroupMember;
pub use super::user_info::Entity as UserInfo;
