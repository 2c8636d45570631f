//! Crate-level error type for the board façade.

use crate::hw_trait::HwError;
use crate::transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Hardware(#[from] HwError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("bus {0} is not available on this board")]
    InactiveBus(u8),
}

pub type Result<T> = std::result::Result<T, Error>;
