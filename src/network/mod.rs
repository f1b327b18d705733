//! Network module
//!
//! This module handles the multicast group membership and the per-slot
//! send/receive built on top of it.

mod multicast;
mod transceiver;

pub use self::multicast::MulticastSocket;
pub use self::transceiver::{classify, ReceiveOutcome, Transceiver};

use std::future::Future;
use std::io;
use std::time::Duration;

/// Datagram channel shared by all stations of a group
pub trait MulticastChannel: Send + Sync + 'static {
    /// Sends one datagram to the group
    fn send<'a>(&'a self, bytes: &'a [u8]) -> impl Future<Output = io::Result<usize>> + Send + 'a;

    /// Receives one datagram, `Ok(None)` when `timeout` passes first
    fn recv_timeout<'a>(
        &'a self,
        buf: &'a mut [u8],
        timeout: Duration,
    ) -> impl Future<Output = io::Result<Option<usize>>> + Send + 'a;
}

#[cfg(test)]
pub(crate) use self::scripted::{Scripted, ScriptedChannel};

#[cfg(test)]
mod scripted {
    use std::collections::VecDeque;
    use std::future::Future;
    use std::io;
    use std::sync::Mutex;
    use std::time::Duration;

    use super::MulticastChannel;

    /// One scripted receive event
    #[derive(Debug)]
    pub(crate) enum Scripted {
        Datagram(Vec<u8>),
        Timeout,
        Fail(io::ErrorKind),
    }

    /// Channel replaying scripted receives and recording sends
    ///
    /// An exhausted script behaves like a silent medium.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedChannel {
        script: Mutex<VecDeque<Scripted>>,
        sent: Mutex<Vec<Vec<u8>>>,
    }

    impl ScriptedChannel {
        pub(crate) fn new(script: impl IntoIterator<Item = Scripted>) -> Self {
            ScriptedChannel {
                script: Mutex::new(script.into_iter().collect()),
                sent: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn sent(&self) -> Vec<Vec<u8>> {
            self.sent.lock().unwrap().clone()
        }

        pub(crate) fn remaining(&self) -> usize {
            self.script.lock().unwrap().len()
        }
    }

    impl MulticastChannel for ScriptedChannel {
        fn send<'a>(
            &'a self,
            bytes: &'a [u8],
        ) -> impl Future<Output = io::Result<usize>> + Send + 'a {
            self.sent.lock().unwrap().push(bytes.to_vec());
            std::future::ready(Ok(bytes.len()))
        }

        fn recv_timeout<'a>(
            &'a self,
            buf: &'a mut [u8],
            _timeout: Duration,
        ) -> impl Future<Output = io::Result<Option<usize>>> + Send + 'a {
            let result = match self.script.lock().unwrap().pop_front() {
                Some(Scripted::Datagram(bytes)) => {
                    let len = bytes.len().min(buf.len());
                    buf[..len].copy_from_slice(&bytes[..len]);
                    Ok(Some(len))
                }
                Some(Scripted::Fail(kind)) => Err(io::Error::new(kind, "scripted failure")),
                Some(Scripted::Timeout) | None => Ok(None),
            };
            std::future::ready(result)
        }
    }
}
