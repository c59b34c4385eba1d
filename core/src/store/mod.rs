//! Object store contracts and the segmented upload that sits on top of them.
//!
//! ```text
//!   script ──► ObjectStore ──► SegmentedStore ──► Connector ──► ObjectClient
//!                  ▲                                             (swift, memory)
//!                  └── FilesystemStore (single-shot writes)
//! ```

pub mod checksum;
pub mod memory;
pub mod segmented;
pub mod traits;

pub use checksum::Checksum;
pub use memory::MemoryObjectClient;
pub use segmented::{segment_name, SegmentOptions, SegmentedStore};
pub use traits::{Connector, ObjectClient, ObjectStore, StoredObject};
