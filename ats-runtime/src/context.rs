//! Execution environment handed to mutating token calls

use ats_core::address::Address;
use ats_core::event::Log;

/// What a mutating call can see of and do to its surroundings
pub trait CallEnvironment {
    /// The effective sender of the call, acting as token holder
    fn caller(&self) -> Address;

    /// Record a log for the call's receipt
    fn emit(&mut self, log: Log);
}

/// Standard environment: a resolved caller and the logs emitted so far
#[derive(Debug, Clone)]
pub struct CallContext {
    caller: Address,
    logs: Vec<Log>,
}

impl CallContext {
    pub fn new(caller: Address) -> Self {
        Self {
            caller,
            logs: Vec::new(),
        }
    }

    pub fn logs(&self) -> &[Log] {
        &self.logs
    }

    pub fn into_logs(self) -> Vec<Log> {
        self.logs
    }
}

impl CallEnvironment for CallContext {
    fn caller(&self) -> Address {
        self.caller
    }

    fn emit(&mut self, log: Log) {
        log::debug!(
            "Call from {} emitted log with {} topics",
            self.caller,
            log.topics.len()
        );
        self.logs.push(log);
    }
}
