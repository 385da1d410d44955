//! Background duration resolution.
//!
//! A single worker thread owns the probe queue and runs one probe at a time
//! in playlist order. Results are posted to the playlist service inbox as
//! `PlaylistCommand::ProbeFinished`; the worker never touches the playlist
//! itself. The playlist service drops results for entries that no longer
//! exist, so an in-flight probe never needs to be cancelled.

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, info, trace};

use crate::media_item::ItemId;
use crate::probe::ProbeService;
use crate::protocol::{PlaylistCommand, ProbeJob, ProbeOutcome, ProbeReport};

#[derive(Debug)]
pub enum ResolverCommand {
    Enqueue(Vec<ProbeJob>),
    /// Current playlist ids in order. Jobs for other ids are dropped and the
    /// queue is re-sorted to this order.
    Retain(Vec<ItemId>),
    /// Drops queued full-scan jobs. A job that was also queued as an ordinary
    /// probe stays queued as one. An in-flight probe still completes.
    DropForced,
    Shutdown,
}

/// Sending side of the resolver queue.
#[derive(Debug, Clone)]
pub struct ResolverHandle {
    sender: Sender<ResolverCommand>,
}

impl ResolverHandle {
    /// Handle plus the receiving end for a worker (or a test) to consume.
    pub fn channel() -> (Self, Receiver<ResolverCommand>) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender }, receiver)
    }

    fn send(&self, command: ResolverCommand) {
        if self.sender.send(command).is_err() {
            debug!("DurationResolver: worker gone, command dropped");
        }
    }

    pub fn enqueue(&self, jobs: Vec<ProbeJob>) {
        if !jobs.is_empty() {
            self.send(ResolverCommand::Enqueue(jobs));
        }
    }

    pub fn retain(&self, ids_in_order: Vec<ItemId>) {
        self.send(ResolverCommand::Retain(ids_in_order));
    }

    pub fn drop_forced(&self) {
        self.send(ResolverCommand::DropForced);
    }

    pub fn shutdown(&self) {
        self.send(ResolverCommand::Shutdown);
    }
}

/// A queued job. `ordinary` records that a non-forced probe was requested
/// for the entry, so dropping the full scan does not lose it.
#[derive(Debug)]
struct QueuedProbe {
    job: ProbeJob,
    ordinary: bool,
}

pub struct DurationResolver {
    commands: Receiver<ResolverCommand>,
    results: Sender<PlaylistCommand>,
    probe: Arc<dyn ProbeService>,
    queue: VecDeque<QueuedProbe>,
}

impl DurationResolver {
    pub fn new(
        commands: Receiver<ResolverCommand>,
        results: Sender<PlaylistCommand>,
        probe: Arc<dyn ProbeService>,
    ) -> Self {
        Self {
            commands,
            results,
            probe,
            queue: VecDeque::new(),
        }
    }

    /// Blocks until shutdown or until every handle and the results inbox
    /// are gone.
    pub fn run(&mut self) {
        loop {
            if self.queue.is_empty() {
                match self.commands.recv() {
                    Ok(command) => {
                        if !self.apply(command) {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }

            // Commands that arrived while probing take effect before the next job.
            let mut keep_running = true;
            loop {
                match self.commands.try_recv() {
                    Ok(command) => {
                        if !self.apply(command) {
                            keep_running = false;
                            break;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        keep_running = false;
                        break;
                    }
                }
            }
            if !keep_running {
                break;
            }

            let Some(queued) = self.queue.pop_front() else {
                continue;
            };
            let report = self.probe_job(&queued.job);
            if self
                .results
                .send(PlaylistCommand::ProbeFinished(report))
                .is_err()
            {
                debug!("DurationResolver: playlist inbox closed");
                break;
            }
        }
        info!(
            "DurationResolver: stopped with {} queued probes",
            self.queue.len()
        );
    }

    fn probe_job(&self, job: &ProbeJob) -> ProbeReport {
        trace!("DurationResolver: probing {} ({})", job.source_ref, job.id);
        let outcome = match self.probe.probe(&job.source_ref) {
            Ok(seconds) => ProbeOutcome::Duration(seconds),
            Err(err) => {
                debug!("DurationResolver: probe failed for {}: {}", job.source_ref, err);
                ProbeOutcome::Failed(err.to_string())
            }
        };
        ProbeReport {
            id: job.id,
            outcome,
            forced: job.forced,
        }
    }

    /// Returns false when the worker should stop.
    fn apply(&mut self, command: ResolverCommand) -> bool {
        match command {
            ResolverCommand::Enqueue(jobs) => {
                for job in jobs {
                    match self.queue.iter_mut().find(|queued| queued.job.id == job.id) {
                        Some(queued) => {
                            queued.ordinary |= !job.forced;
                            queued.job.forced |= job.forced;
                        }
                        None => self.queue.push_back(QueuedProbe {
                            ordinary: !job.forced,
                            job,
                        }),
                    }
                }
                trace!("DurationResolver: {} probes queued", self.queue.len());
            }
            ResolverCommand::Retain(ids_in_order) => {
                let positions: HashMap<ItemId, usize> = ids_in_order
                    .into_iter()
                    .enumerate()
                    .map(|(position, id)| (id, position))
                    .collect();
                self.queue
                    .retain(|queued| positions.contains_key(&queued.job.id));
                self.queue.make_contiguous().sort_by_key(|queued| {
                    positions
                        .get(&queued.job.id)
                        .copied()
                        .unwrap_or(usize::MAX)
                });
            }
            ResolverCommand::DropForced => {
                self.queue.retain(|queued| queued.ordinary);
                for queued in self.queue.iter_mut() {
                    queued.job.forced = false;
                }
            }
            ResolverCommand::Shutdown => return false,
        }
        true
    }

    #[cfg(test)]
    fn queued_ids(&self) -> Vec<ItemId> {
        self.queue.iter().map(|queued| queued.job.id).collect()
    }

    #[cfg(test)]
    fn queued_forced(&self) -> Vec<bool> {
        self.queue.iter().map(|queued| queued.job.forced).collect()
    }
}

/// Starts the worker thread. Results go to `results`.
pub fn spawn_duration_resolver(
    probe: Arc<dyn ProbeService>,
    results: Sender<PlaylistCommand>,
) -> std::io::Result<(ResolverHandle, JoinHandle<()>)> {
    let (handle, commands) = ResolverHandle::channel();
    let join = thread::Builder::new()
        .name("duration-resolver".to_string())
        .spawn(move || {
            let mut resolver = DurationResolver::new(commands, results, probe);
            resolver.run();
        })?;
    Ok((handle, join))
}
