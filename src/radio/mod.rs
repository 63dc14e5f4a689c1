/// Radio ownership tracking
pub mod arbiter;
/// Radio driver interface
pub mod traits;

pub use arbiter::{ArbiterError, PendingOp, RadioArbiter, RadioOpKind, RxWindow};
pub use traits::{ModulationParams, PacketParams, PacketStatus, Radio, RadioEvent, RxStats};
