//! Single-flight serial transmission
//!
//! [`TxChannel`] owns a DMA transmit engine and a [`TransferLock`]. A send
//! either starts the transfer right away or fails with
//! [`SendError::ChannelBusy`], there is no queue. The lock is released by
//! [`TxChannel::on_interrupt`] which has to be called from the DMA stream ISR.

mod channel;
mod lock;

pub use channel::{SendError, TxChannel, TxState, TxStats, MAX_TIMEOUT};
pub use lock::TransferLock;
pub use crate::hal_ext::dma::{InterruptResult, TransferError};
