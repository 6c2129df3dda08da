//! Operand stack shared by consecutive edits.

use super::error::EditError;
use crate::dom::NodeHandle;

#[derive(Clone, Copy, Debug)]
struct Slot {
    node: NodeHandle,
    /// Left in place as the parent of an `AppendChildren`.
    parent_context: bool,
}

#[derive(Clone, Debug, Default)]
pub struct OperandStack {
    items: Vec<Slot>,
    max_depth: usize,
}

impl OperandStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: NodeHandle) {
        self.items.push(Slot {
            node,
            parent_context: false,
        });
        self.max_depth = self.max_depth.max(self.items.len());
    }

    pub fn pop_one(&mut self) -> Result<NodeHandle, EditError> {
        self.items.pop().map(|slot| slot.node).ok_or(EditError::StackUnderflow {
            requested: 1,
            available: 0,
        })
    }

    /// Pops `count` entries, returned in the order they were pushed.
    pub fn pop_many(&mut self, count: usize) -> Result<Vec<NodeHandle>, EditError> {
        let available = self.items.len();
        if count > available {
            return Err(EditError::StackUnderflow {
                requested: count,
                available,
            });
        }
        Ok(self
            .items
            .split_off(available - count)
            .into_iter()
            .map(|slot| slot.node)
            .collect())
    }

    pub fn top(&self) -> Result<NodeHandle, EditError> {
        self.items.last().map(|slot| slot.node).ok_or(EditError::StackUnderflow {
            requested: 1,
            available: 0,
        })
    }

    /// Marks the top entry as a parent that received children.
    pub fn mark_parent_context(&mut self) {
        if let Some(slot) = self.items.last_mut() {
            slot.parent_context = true;
        }
    }

    /// Entries that were pushed and never used as a parent or consumed.
    pub fn unconsumed(&self) -> usize {
        self.items.iter().filter(|slot| !slot.parent_context).count()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_many_preserves_push_order() {
        let mut stack = OperandStack::new();
        for raw in 0..5 {
            stack.push(NodeHandle(raw));
        }
        let popped = stack.pop_many(3).unwrap();
        assert_eq!(popped, vec![NodeHandle(2), NodeHandle(3), NodeHandle(4)]);
        assert_eq!(stack.top(), Ok(NodeHandle(1)));
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.max_depth(), 5);
    }

    #[test]
    fn underflow_reports_depth() {
        let mut stack = OperandStack::new();
        stack.push(NodeHandle(1));
        assert_eq!(
            stack.pop_many(2),
            Err(EditError::StackUnderflow {
                requested: 2,
                available: 1
            })
        );
        // A failed pop leaves the stack untouched.
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.pop_one(), Ok(NodeHandle(1)));
        assert!(stack.pop_one().is_err());
        assert!(stack.top().is_err());
    }

    #[test]
    fn parent_contexts_are_not_unconsumed() {
        let mut stack = OperandStack::new();
        stack.push(NodeHandle(1));
        stack.mark_parent_context();
        stack.push(NodeHandle(2));
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.unconsumed(), 1);
        assert_eq!(stack.pop_one(), Ok(NodeHandle(2)));
        assert_eq!(stack.unconsumed(), 0);
    }

    #[test]
    fn pop_zero_is_empty() {
        let mut stack = OperandStack::new();
        assert_eq!(stack.pop_many(0), Ok(Vec::new()));
    }
}
