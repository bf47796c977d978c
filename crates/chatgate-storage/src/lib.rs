pub mod bus;
pub mod kv;
pub mod ledger;
pub mod sink;
pub mod store;
pub mod stream;
pub mod transaction;

pub use bus::{EventWriter, QueuedEventSink, TracingWriter};
pub use kv::RestKv;
pub use ledger::{Enforcement, MemoryLedger, QuotaKey, QuotaLedger, ResourceKind};
pub use sink::{EventSink, MemoryEventSink};
pub use store::{MemoryStore, StoreError, UserStore};
pub use stream::RestStreamWriter;
pub use transaction::{FILES_TOPIC, TRANSACTIONS_TOPIC, TransactionRecord};
