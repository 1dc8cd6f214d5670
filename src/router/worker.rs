//! Protocol worker threads
//!
//! One thread per enabled protocol. Jobs arrive over a crossbeam channel
//! and are handled strictly in order, which is what keeps the events of a
//! single exchange in enqueue order.

use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Sender};

use crate::constants::Prefix;
use crate::error::{CommandError, InitError, Result, SwitchboardError};
use crate::message::Event;
use crate::queue::EventSink;

use super::handler::{Job, ProtocolHandler};

pub struct Worker {
    prefix: Prefix,
    jobs: Option<Sender<Job>>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    /// Start a worker thread driving `handler`
    pub fn spawn(mut handler: Box<dyn ProtocolHandler>, sink: EventSink) -> Result<Self> {
        let prefix = handler.prefix();
        let (sender, receiver) = channel::unbounded::<Job>();

        let thread = thread::Builder::new()
            .name(format!("switchboard-{}", prefix))
            .spawn(move || {
                tracing::debug!("{} worker started", prefix);
                for job in receiver.iter() {
                    let command_id = job.command_id;
                    let command = job.command.message_type();
                    tracing::trace!("{} worker handling {} {}", prefix, command_id, command);

                    if let Err(e) = handler.handle(job, &sink) {
                        tracing::warn!("{} rejected {} {}: {}", prefix, command, command_id, e);
                        sink.emit(Event::CommandError {
                            reason: e.to_string(),
                            command: Some(command),
                            command_id: Some(command_id),
                        });
                    }
                }
                tracing::debug!("{} worker stopped", prefix);
            })
            .map_err(|e| InitError::Resources(format!("cannot spawn {} worker: {}", prefix, e)))?;

        Ok(Self {
            prefix,
            jobs: Some(sender),
            thread: Some(thread),
        })
    }

    pub fn prefix(&self) -> Prefix {
        self.prefix
    }

    /// Queue a job for the worker
    pub fn submit(&self, job: Job) -> std::result::Result<(), CommandError> {
        let jobs = self
            .jobs
            .as_ref()
            .ok_or_else(|| CommandError::Rejected(format!("{} worker is stopped", self.prefix)))?;
        jobs.send(job)
            .map_err(|_| CommandError::Rejected(format!("{} worker has exited", self.prefix)))
    }

    /// Close the job channel and join the thread
    pub fn stop(&mut self) -> Result<()> {
        // Dropping the sender ends the worker's receive loop
        self.jobs.take();

        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| {
                SwitchboardError::Worker(format!("{} worker panicked", self.prefix))
            }),
            None => Ok(()),
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::error!("{}", e);
        }
    }
}
