//! # Transaction Driver
//!
//! Wraps a connection operation as a cluster-wide transaction. The
//! operation runs locally inside a consensus proposal; once every party
//! reports its result code, the codes are reduced to one *global*
//! outcome. A party whose local execution succeeded while the global
//! outcome is a failure rolls its local effects back before the driver
//! returns.
//!
//! ## Proposal protocol
//!
//! 1. the driver obtains the process identity bytes — identical across
//!    all parties of one logical operation — and submits them as the
//!    proposal body;
//! 2. the facility matches proposals of the same operation by byte
//!    equality ([`proposals_equivalent`]);
//! 3. the *execute* hook runs the operation locally and reports its
//!    wire code;
//! 4. the *commit* hook reduces all parties' codes
//!    ([`reduce_global_result`]) and triggers the local rollback when
//!    local success disagrees with global failure.
//!
//! ## Degenerate mode
//!
//! Without a consensus facility or a process identity, the operation
//! executes locally and its local result is the global result.

use eyre::{Result, WrapErr};
use tracing::debug;

use crate::error::{code_result, result_code, TdbError, TdbResult, TDB_OK};
use crate::facility::{ConsensusFacility, ProposalCallback};

/// Consensus operation type under which all table transactions run.
pub const OPERATION_NAME: &str = "TdbHdf5Transaction";

/// A local operation with a compensating action.
pub trait Transaction {
    /// Runs the operation locally.
    fn execute(&mut self) -> TdbResult<()>;

    /// Undoes a locally successful execution after a global failure.
    fn rollback(&mut self);
}

/// A [`Transaction`] from a pair of closures.
pub struct TdbTransaction<'a> {
    execute: Box<dyn FnMut() -> TdbResult<()> + 'a>,
    rollback: Box<dyn FnMut() + 'a>,
}

impl<'a> TdbTransaction<'a> {
    /// A transaction whose operation needs no compensating action
    /// beyond what the operation itself guarantees (table operations
    /// roll back their own partial effects).
    pub fn new(execute: impl FnMut() -> TdbResult<()> + 'a) -> Self {
        Self {
            execute: Box::new(execute),
            rollback: Box::new(|| {}),
        }
    }

    pub fn with_rollback(
        execute: impl FnMut() -> TdbResult<()> + 'a,
        rollback: impl FnMut() + 'a,
    ) -> Self {
        Self {
            execute: Box::new(execute),
            rollback: Box::new(rollback),
        }
    }
}

impl Transaction for TdbTransaction<'_> {
    fn execute(&mut self) -> TdbResult<()> {
        (self.execute)()
    }

    fn rollback(&mut self) {
        (self.rollback)()
    }
}

/// Two proposals are equivalent iff their identity bytes are equal.
pub fn proposals_equivalent(proposals: &[&[u8]]) -> bool {
    match proposals.split_first() {
        None => true,
        Some((first, rest)) => rest.iter().all(|p| p == first),
    }
}

/// Reduces all parties' wire codes to the global outcome: success if
/// every party succeeded, the common failure if all failures agree, and
/// a consensus error otherwise.
pub fn reduce_global_result(results: &[i64]) -> i64 {
    let mut global = TDB_OK;
    for &result in results {
        if result != TDB_OK {
            if global == TDB_OK {
                global = result;
            } else if global != result {
                return TdbError::ConsensusError.code();
            }
        }
    }
    global
}

/// Callback state threaded through one proposal.
struct TransactionData<'t, 'a> {
    transaction: &'t mut TdbTransaction<'a>,
    local: i64,
    global: i64,
}

impl<'t, 'a> TransactionData<'t, 'a> {
    fn new(transaction: &'t mut TdbTransaction<'a>) -> Self {
        Self {
            transaction,
            local: TdbError::UnknownError.code(),
            global: TdbError::UnknownError.code(),
        }
    }
}

impl ProposalCallback for TransactionData<'_, '_> {
    fn execute(&mut self) -> i64 {
        self.local = result_code(&self.transaction.execute());
        self.local
    }

    fn commit(&mut self, results: &[i64]) {
        self.global = reduce_global_result(results);

        // The operation succeeded here but not everywhere.
        if self.local == TDB_OK && self.global != TDB_OK {
            debug!("local result disagrees with global result, rolling back");
            self.transaction.rollback();
        }
    }
}

/// Runs a transaction through the consensus facility, or locally in
/// degenerate mode.
///
/// The outer `Result` is a facility malfunction (the operation's outcome
/// is unknown); the inner result is the agreed global outcome.
pub fn execute_transaction(
    consensus: Option<&dyn ConsensusFacility>,
    process_id: Option<&[u8]>,
    transaction: &mut TdbTransaction<'_>,
) -> Result<TdbResult<()>> {
    match (consensus, process_id) {
        (Some(facility), Some(process_id)) => {
            let mut data = TransactionData::new(transaction);
            facility
                .blocking_propose(OPERATION_NAME, process_id, &mut data)
                .wrap_err("consensus proposal failed")?;
            Ok(code_result(data.global))
        }
        _ => Ok(transaction.execute()),
    }
}
