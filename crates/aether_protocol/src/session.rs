//! The session driver: receive, decode, dispatch, until stopped.
//!
//! Without an intake queue a single thread reads and dispatches. With one,
//! a reader thread feeds a bounded channel and a dispatcher thread drains
//! it; the reader blocks once the channel is full, which is the
//! back-pressure cap.

use crate::error::{ProtocolError, ProtocolResult};
use crate::transport::Transport;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// Lifecycle of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Not receiving.
    Stopped,
    /// Receiving and dispatching.
    Running,
}

/// What the driver does after a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading.
    Continue,
    /// Stop the session.
    Stop,
}

/// Handles the tokens of one endpoint.
pub trait Dispatch<In>: Send + 'static {
    /// Handles one decoded token.
    fn dispatch(&mut self, token: In) -> Flow;

    /// Called once when the transport yields end of stream.
    fn end_of_stream(&mut self) {}

    /// Called exactly once when the session stops, with the error that
    /// stopped it, if any.
    fn finish(&mut self, error: Option<ProtocolError>);
}

enum Intake<In> {
    Token(In),
    End,
    Failed(ProtocolError),
}

/// Drives one endpoint from `Running` to `Stopped`.
pub struct SessionDriver {
    running: Arc<AtomicBool>,
    stop: Arc<dyn Fn() + Send + Sync>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionDriver {
    /// Starts receiving from `link` and dispatching to `dispatcher`.
    ///
    /// `intake` selects the bounded intake queue and its capacity.
    ///
    /// # Errors
    ///
    /// Returns an error if a thread cannot be spawned.
    pub fn start<Out, In, D>(
        name: &str,
        link: Arc<dyn Transport<Out, In>>,
        dispatcher: D,
        intake: Option<usize>,
    ) -> ProtocolResult<Self>
    where
        Out: 'static,
        In: Send + 'static,
        D: Dispatch<In>,
    {
        let running = Arc::new(AtomicBool::new(true));
        let stop: Arc<dyn Fn() + Send + Sync> = {
            let running = Arc::clone(&running);
            let link = Arc::clone(&link);
            Arc::new(move || {
                running.store(false, Ordering::SeqCst);
                link.close();
            })
        };

        let threads = match intake {
            None => {
                let running = Arc::clone(&running);
                let handle = thread::Builder::new()
                    .name(format!("{name}-receiver"))
                    .spawn(move || direct_loop(link, dispatcher, running))?;
                vec![handle]
            }
            Some(capacity) => {
                let (tx, rx) = mpsc::sync_channel(capacity.max(1));
                let ear = {
                    let link = Arc::clone(&link);
                    thread::Builder::new()
                        .name(format!("{name}-ear"))
                        .spawn(move || ear_loop(link, tx))?
                };
                let running = Arc::clone(&running);
                let receiver = thread::Builder::new()
                    .name(format!("{name}-receiver"))
                    .spawn(move || queued_loop(link, dispatcher, rx, running))?;
                vec![ear, receiver]
            }
        };

        debug!(session = name, ?intake, "session started");
        Ok(Self {
            running,
            stop,
            threads: Mutex::new(threads),
        })
    }

    /// Returns the current state.
    pub fn state(&self) -> DriverState {
        if self.running.load(Ordering::SeqCst) {
            DriverState::Running
        } else {
            DriverState::Stopped
        }
    }

    /// Stops the session: the transport is closed, which unblocks the
    /// reader, and the dispatcher's `finish` runs on its own thread.
    pub fn stop(&self) {
        (self.stop)();
    }

    /// Waits for the session threads to exit.
    ///
    /// Must not be called from the dispatcher itself.
    pub fn join(&self) {
        let threads: Vec<_> = self.threads.lock().drain(..).collect();
        for handle in threads {
            if handle.join().is_err() {
                error!("session thread panicked");
            }
        }
    }
}

fn direct_loop<Out, In, D>(
    link: Arc<dyn Transport<Out, In>>,
    mut dispatcher: D,
    running: Arc<AtomicBool>,
) where
    D: Dispatch<In>,
{
    let mut failure = None;
    loop {
        match link.recv() {
            Ok(Some(token)) => {
                if dispatcher.dispatch(token) == Flow::Stop {
                    break;
                }
            }
            Ok(None) => {
                dispatcher.end_of_stream();
                break;
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    shut_down(&*link, &mut dispatcher, &running, failure);
}

fn ear_loop<Out, In>(link: Arc<dyn Transport<Out, In>>, tx: mpsc::SyncSender<Intake<In>>) {
    loop {
        let event = match link.recv() {
            Ok(Some(token)) => Intake::Token(token),
            Ok(None) => Intake::End,
            Err(e) => Intake::Failed(e),
        };
        let last = !matches!(event, Intake::Token(_));
        if tx.send(event).is_err() || last {
            return;
        }
    }
}

fn queued_loop<Out, In, D>(
    link: Arc<dyn Transport<Out, In>>,
    mut dispatcher: D,
    rx: mpsc::Receiver<Intake<In>>,
    running: Arc<AtomicBool>,
) where
    D: Dispatch<In>,
{
    let mut failure = None;
    for event in rx.iter() {
        match event {
            Intake::Token(token) => {
                if dispatcher.dispatch(token) == Flow::Stop {
                    break;
                }
            }
            Intake::End => {
                dispatcher.end_of_stream();
                break;
            }
            Intake::Failed(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    drop(rx);
    shut_down(&*link, &mut dispatcher, &running, failure);
}

fn shut_down<Out, In, D>(
    link: &dyn Transport<Out, In>,
    dispatcher: &mut D,
    running: &AtomicBool,
    failure: Option<ProtocolError>,
) where
    D: Dispatch<In>,
{
    running.store(false, Ordering::SeqCst);
    link.close();
    if let Some(e) = &failure {
        debug!(error = %e, "session ended by error");
    }
    dispatcher.finish(failure);
}
