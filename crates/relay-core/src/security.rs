//! Allow-list checks. Both lists are plain membership tests on configured ids.

use std::collections::HashSet;

use crate::domain::{ChatId, UserId};

/// An empty user allow-list admits everyone.
pub fn is_user_allowed(user_id: UserId, allowed_users: &HashSet<i64>) -> bool {
    allowed_users.is_empty() || allowed_users.contains(&user_id.0)
}

/// An empty group allow-list means groups are not filtered.
pub fn is_group_allowed(chat_id: ChatId, allowed_groups: &HashSet<i64>) -> bool {
    allowed_groups.is_empty() || allowed_groups.contains(&chat_id.0)
}
