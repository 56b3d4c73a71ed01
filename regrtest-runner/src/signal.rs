// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interrupt handling for test runs.
//!
//! With [`SignalHandlerKind::Standard`], each OS signal of interest gets a forwarding task that
//! turns deliveries into [`ShutdownEvent`]s on a channel read by the dispatcher.

use crate::errors::SignalHandlerSetupError;
use tokio::sync::mpsc;

/// How a test run reacts to interrupt and termination signals.
///
/// Passed to [`TestRunnerBuilder::build`](crate::runner::TestRunnerBuilder::build).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SignalHandlerKind {
    /// Stop the run on SIGINT, SIGTERM or SIGHUP (Ctrl-C on Windows).
    Standard,

    /// Ignore signals. Useful for tests and for embedding in a process that handles signals
    /// itself.
    Noop,
}

impl SignalHandlerKind {
    /// Must be called from within a Tokio runtime.
    pub(crate) fn build(self) -> Result<SignalHandler, SignalHandlerSetupError> {
        match self {
            Self::Standard => SignalHandler::listen(),
            Self::Noop => Ok(SignalHandler { events: None }),
        }
    }
}

#[derive(Debug)]
pub(crate) struct SignalHandler {
    events: Option<mpsc::UnboundedReceiver<ShutdownEvent>>,
}

impl SignalHandler {
    fn listen() -> Result<Self, SignalHandlerSetupError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        imp::forward_signals(&sender)?;
        Ok(Self {
            events: Some(receiver),
        })
    }

    /// Waits for the next signal. Returns `None` once no more signals can arrive.
    pub(crate) async fn recv(&mut self) -> Option<ShutdownEvent> {
        match &mut self.events {
            Some(events) => events.recv().await,
            None => None,
        }
    }
}

#[cfg(unix)]
mod imp {
    use super::ShutdownEvent;
    use tokio::{
        signal::unix::{SignalKind, signal},
        sync::mpsc::UnboundedSender,
    };

    pub(super) fn forward_signals(sender: &UnboundedSender<ShutdownEvent>) -> std::io::Result<()> {
        let kinds = [
            (SignalKind::interrupt(), ShutdownEvent::Interrupt),
            (SignalKind::terminate(), ShutdownEvent::Term),
            (SignalKind::hangup(), ShutdownEvent::Hangup),
        ];
        for (kind, event) in kinds {
            let mut signal = signal(kind)?;
            let sender = sender.clone();
            tokio::spawn(async move {
                while signal.recv().await.is_some() {
                    if sender.send(event).is_err() {
                        break;
                    }
                }
            });
        }
        Ok(())
    }
}

#[cfg(windows)]
mod imp {
    use super::ShutdownEvent;
    use tokio::{signal::windows::ctrl_c, sync::mpsc::UnboundedSender};

    pub(super) fn forward_signals(sender: &UnboundedSender<ShutdownEvent>) -> std::io::Result<()> {
        let mut ctrl_c = ctrl_c()?;
        let sender = sender.clone();
        tokio::spawn(async move {
            while ctrl_c.recv().await.is_some() {
                if sender.send(ShutdownEvent::Interrupt).is_err() {
                    break;
                }
            }
        });
        Ok(())
    }
}

/// A signal that stops the run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ShutdownEvent {
    /// SIGINT, or Ctrl-C on Windows.
    Interrupt,

    /// SIGTERM.
    #[cfg(unix)]
    Term,

    /// SIGHUP.
    #[cfg(unix)]
    Hangup,
}

impl ShutdownEvent {
    /// Returns the conventional name of the signal.
    pub fn signal_name(self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            #[cfg(unix)]
            Self::Term => "SIGTERM",
            #[cfg(unix)]
            Self::Hangup => "SIGHUP",
        }
    }
}
