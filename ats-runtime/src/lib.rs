pub mod context;
pub mod contract;
pub mod runtime;

// Re-export the main types for convenience
pub use context::{CallContext, CallEnvironment};
pub use contract::AtsToken;
pub use runtime::{
    Call, CallHash, CallReceipt, CallStatus, InMemoryReceiptIterator, InMemoryReceiptStorage,
    Method, ReceiptIterator, ReceiptStorage, ReturnValue, TokenRuntime,
};
