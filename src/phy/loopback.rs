use std::collections::VecDeque;

use crate::phy::{Device, DeviceCapabilities, Medium};
use crate::time::Instant;

/// A loopback device, used for testing the stack against itself without any
/// real hardware or `tun`/`tap` device backing it.
#[derive(Debug)]
pub struct Loopback {
    queue: VecDeque<Vec<u8>>,
    medium: Medium,
    mtu: usize,
}

impl Loopback {
    /// Create a loopback device with the given medium and MTU.
    pub fn new(medium: Medium, mtu: usize) -> Loopback {
        Loopback {
            queue: VecDeque::new(),
            medium,
            mtu,
        }
    }
}

impl Device for Loopback {
    type RxToken<'a> = RxToken;
    type TxToken<'a> = TxToken<'a>;

    fn receive(&mut self, _timestamp: Instant) -> Option<(RxToken, TxToken<'_>)> {
        self.queue
            .pop_front()
            .map(move |buffer| (RxToken { buffer }, TxToken { queue: &mut self.queue }))
    }

    fn transmit(&mut self, _timestamp: Instant) -> Option<TxToken<'_>> {
        Some(TxToken {
            queue: &mut self.queue,
        })
    }

    fn capabilities(&self) -> DeviceCapabilities {
        let mut caps = DeviceCapabilities::default();
        caps.medium = self.medium;
        caps.max_transmission_unit = self.mtu;
        caps
    }
}

#[doc(hidden)]
pub struct RxToken {
    buffer: Vec<u8>,
}

impl crate::phy::RxToken for RxToken {
    fn consume<R, F>(self, f: F) -> R
    where
        F: FnOnce(&[u8]) -> R,
    {
        f(&self.buffer[..])
    }
}

#[doc(hidden)]
pub struct TxToken<'a> {
    queue: &'a mut VecDeque<Vec<u8>>,
}

impl<'a> crate::phy::TxToken for TxToken<'a> {
    fn consume<R, F>(self, len: usize, f: F) -> R
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        let mut buffer = vec![0; len];
        let result = f(&mut buffer);
        self.queue.push_back(buffer);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phy::{RxToken as _, TxToken as _};

    #[test]
    fn echoes_transmitted_frame_back_on_receive() {
        let mut dev = Loopback::new(Medium::Ethernet, 1536);
        let now = Instant::from_millis(0);

        let tx = dev.transmit(now).unwrap();
        tx.consume(4, |buf| buf.copy_from_slice(&[1, 2, 3, 4]));

        let (rx, _tx) = dev.receive(now).unwrap();
        rx.consume(|buf| assert_eq!(buf, &[1, 2, 3, 4]));
    }

    #[test]
    fn empty_queue_yields_no_rx_token() {
        let mut dev = Loopback::new(Medium::Ethernet, 1536);
        assert!(dev.receive(Instant::from_millis(0)).is_none());
    }
}
