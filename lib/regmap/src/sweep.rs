//! Recursive read, write, verify and check passes over a device subtree.
//!
//! A pass at a device whose effective enable is not true does nothing for the whole subtree.
//! With a target variable only the block hosting that variable is touched and there is no
//! recursion. Otherwise every bulk-enabled block takes part and child devices follow in
//! declaration order. The first error aborts a write, read or verify pass. A check pass still
//! completes every pending block of the subtree and then reports the first error.

use crate::{
    block::Block,
    debug_ex,
    device::EnableState,
    error::{RegError, RegResult},
    node::Node,
    transport::TransactionKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sweep {
    Write { force: bool },
    Read,
    Verify,
    Check,
}

impl Sweep {
    fn apply(self, block: &Block) -> RegResult<()> {
        match self {
            Sweep::Write { .. } => block.background_transaction(TransactionKind::Write),
            Sweep::Read => block.background_transaction(TransactionKind::Read),
            Sweep::Verify => block.background_transaction(TransactionKind::Verify),
            Sweep::Check => block.check_transaction(),
        }
    }

    fn selects(self, block: &Block) -> bool {
        match self {
            Sweep::Write { force } => block.bulk_enable() && (force || block.stale()),
            _ => block.bulk_enable(),
        }
    }
}

impl Node {
    fn sweep(&self, sweep: Sweep, recurse: bool, variable: Option<&Node>) -> RegResult<()> {
        self.device_or_err()?;
        if self.enable_state() != EnableState::True {
            return Ok(());
        }
        debug_ex!("{:?} sweep of '{}'", sweep, self.path());
        if let Some(variable) = variable {
            if let Some(block) = variable.variable_or_err()?.block() {
                sweep.apply(&block)?;
            }
            return Ok(());
        }
        let mut first: Option<RegError> = None;
        let mut keep = |res: RegResult<()>| -> RegResult<()> {
            match res {
                Err(err) if sweep != Sweep::Check => Err(err),
                Err(err) => {
                    first.get_or_insert(err);
                    Ok(())
                }
                Ok(()) => Ok(()),
            }
        };
        for block in self.blocks() {
            if sweep.selects(&block) {
                keep(sweep.apply(&block))?;
            }
        }
        if recurse {
            for child in self.devices() {
                keep(child.sweep(sweep, true, None))?;
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Start writes of stale bulk blocks, or of all bulk blocks with `force`.
    pub fn write_blocks(
        &self,
        force: bool,
        recurse: bool,
        variable: Option<&Node>,
    ) -> RegResult<()> {
        self.sweep(Sweep::Write { force }, recurse, variable)
    }

    /// Start reads of bulk blocks.
    pub fn read_blocks(&self, recurse: bool, variable: Option<&Node>) -> RegResult<()> {
        self.sweep(Sweep::Read, recurse, variable)
    }

    /// Start verify reads of bulk blocks.
    pub fn verify_blocks(&self, recurse: bool, variable: Option<&Node>) -> RegResult<()> {
        self.sweep(Sweep::Verify, recurse, variable)
    }

    /// Complete the transactions started by the other passes and notify listeners.
    pub fn check_blocks(&self, recurse: bool, variable: Option<&Node>) -> RegResult<()> {
        self.sweep(Sweep::Check, recurse, variable)
    }
}
