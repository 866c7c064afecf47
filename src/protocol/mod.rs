//! VE.Bus wire protocol: frame model, incremental assembler and typed
//! message codecs.

pub mod assembler;
pub mod constants;
pub mod frame;
pub mod messages;

pub use assembler::{AssemblerEvent, FrameAssembler};
pub use frame::{Frame, FrameVariant};
pub use messages::{
    AcInfo, DcInfo, DeviceStatus, DeviceStatusInfo, ErrorInfo, LedDetail, LedState, SwitchState,
    VeBusCodec, VersionInfo, WarningInfo,
};
