//! Item markers: bypass, no-shrink, unbreakable and record stamps.
//!
//! Granted difficulty items carry these so that they are never counted as
//! collected, never run out, and (optionally) only work for the record they
//! were handed out for.

use speedrun_goals::ItemStack;

use crate::types::RecordId;

/// Stack is excluded from collection checks.
pub const BYPASSES_ITEM_CHECK: &str = "speedabc:bypasses_item_check";

/// Stack is not consumed on use.
pub const NO_SHRINKING: &str = "speedabc:no_shrinking";

/// Stack does not take damage.
pub const UNBREAKABLE: &str = "Unbreakable";

/// Record the stack is bound to.
pub const RECORD_STAMP: &str = "speedabc:record_stamp";

/// Whether the stack is excluded from collection checks.
pub fn bypasses_item_check(stack: &ItemStack) -> bool {
    stack.metadata.flag(BYPASSES_ITEM_CHECK)
}

/// Mark the stack as excluded from collection checks.
pub fn mark_bypassing(stack: &mut ItemStack) {
    stack.metadata.set_flag(BYPASSES_ITEM_CHECK);
}

/// Whether the stack is not consumed on use.
pub fn is_no_shrinking(stack: &ItemStack) -> bool {
    stack.metadata.flag(NO_SHRINKING)
}

/// Mark the stack as not consumed on use.
pub fn mark_no_shrinking(stack: &mut ItemStack) {
    stack.metadata.set_flag(NO_SHRINKING);
}

/// Whether the stack does not take damage.
pub fn is_unbreakable(stack: &ItemStack) -> bool {
    stack.metadata.flag(UNBREAKABLE)
}

/// Mark the stack as not taking damage.
pub fn mark_unbreakable(stack: &mut ItemStack) {
    stack.metadata.set_flag(UNBREAKABLE);
}

/// Bind the stack to a record.
pub fn put_record_stamp(stack: &mut ItemStack, record: RecordId) {
    stack.metadata.set_string(RECORD_STAMP, record.to_string());
}

/// Record the stack is bound to, if any.
pub fn record_stamp(stack: &ItemStack) -> Option<RecordId> {
    stack
        .metadata
        .string(RECORD_STAMP)
        .and_then(|s| RecordId::parse_str(s).ok())
}

/// Whether the stack may be used while `current` is running.
///
/// Unstamped stacks are always usable; stamped ones only with their record.
pub fn stamps_record(stack: &ItemStack, current: Option<RecordId>) -> bool {
    if stack.metadata.get(RECORD_STAMP).is_none() {
        return true;
    }
    match (record_stamp(stack), current) {
        (Some(stamp), Some(current)) => stamp == current,
        _ => false,
    }
}

/// Consume `amount` items from the stack unless it is marked no-shrink.
pub fn consume(stack: &mut ItemStack, amount: u32) {
    if !is_no_shrinking(stack) {
        stack.count = stack.count.saturating_sub(amount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use speedrun_goals::ResourceId;
    use uuid::Uuid;

    fn rocket() -> ItemStack {
        ItemStack::new(ResourceId::minecraft("firework_rocket"), 64)
    }

    #[test]
    fn test_stamps_record() {
        let record = Uuid::new_v4();
        let mut stack = rocket();
        assert!(stamps_record(&stack, None));

        put_record_stamp(&mut stack, record);
        assert_eq!(record_stamp(&stack), Some(record));
        assert!(stamps_record(&stack, Some(record)));
        assert!(!stamps_record(&stack, Some(Uuid::new_v4())));
        assert!(!stamps_record(&stack, None));
    }

    #[test]
    fn test_consume_respects_no_shrinking() {
        let mut plain = rocket();
        consume(&mut plain, 1);
        assert_eq!(plain.count, 63);

        let mut infinite = rocket();
        mark_no_shrinking(&mut infinite);
        consume(&mut infinite, 1);
        assert_eq!(infinite.count, 64);
    }

    #[test]
    fn test_bypass_flag() {
        let mut stack = rocket();
        assert!(!bypasses_item_check(&stack));
        mark_bypassing(&mut stack);
        assert!(bypasses_item_check(&stack));
    }
}
