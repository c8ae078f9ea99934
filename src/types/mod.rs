pub mod conversions;
pub mod extensions;
pub mod token;

pub type ChainId = u64;

pub use extensions::{AcrossInfo, Extensions, FeeInfo, OftInfo, PeerInfo};
pub use token::{BridgeStatus, EndpointVersion, OftBridge, OftToken, OftVersion, TokenEntry, TokenKey};
