/// Transaction isolation requested when opening a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    /// Mutating paths and inserts; rows that will be modified are locked explicitly.
    ReadCommitted,
    /// Multi-step reads that must observe a single snapshot.
    RepeatableRead,
}

impl Isolation {
    pub fn statement(&self) -> &'static str {
        match self {
            Isolation::ReadCommitted => "SET TRANSACTION ISOLATION LEVEL READ COMMITTED",
            Isolation::RepeatableRead => "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ",
        }
    }
}

/// Orders two wallet ids ascending so row locks are always taken in the same order.
#[inline]
pub fn lock_order(a: i64, b: i64) -> (i64, i64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
