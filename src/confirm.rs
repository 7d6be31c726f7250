//! Human confirmation of borderline matches.
//!
//! Workers resolve tracks concurrently but prompts must appear one at a time
//! and in tracklist order. Every batch item therefore gets a `Ticket`: the
//! worker either drops it (no prompt needed) or hands the candidate to the
//! single consumer thread and blocks on a per-request reply channel. The
//! consumer buffers out-of-order arrivals and presents them by index.

use std::collections::BTreeMap;
use std::io::{self, BufRead, BufReader, Stdin, Stdout, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use indicatif::ProgressBar;

use crate::models::{RawTrack, ScoredCandidate};
use crate::normalize::primary_artist_display;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmDecision {
    Accept,
    Reject,
    /// End the session: nothing after this track is resolved.
    Quit,
}

pub trait Confirmer: Send + Sync {
    fn confirm(&self, raw: &RawTrack, candidate: &ScoredCandidate) -> ConfirmDecision;
}

// ============================================================================
// Confirmers
// ============================================================================

/// Interactive y/n/q prompt. EOF or a broken terminal ends the session.
pub struct TerminalConfirmer<R, W> {
    io: Mutex<(R, W)>,
}

impl TerminalConfirmer<BufReader<Stdin>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(io::stdin()), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalConfirmer<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            io: Mutex::new((input, output)),
        }
    }

    fn prompt(&self, raw: &RawTrack, candidate: &ScoredCandidate) -> io::Result<ConfirmDecision> {
        let mut guard = match self.io.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let (input, output) = &mut *guard;

        writeln!(output)?;
        writeln!(output, "Possible match (distance {:.1}) in episode {}", candidate.distance, raw.episode_id)?;
        writeln!(output, "  NTS:     {} - {}", raw.artist, raw.title)?;
        writeln!(
            output,
            "  Spotify: {} - {}",
            candidate.candidate.artist, candidate.candidate.title
        )?;

        loop {
            write!(output, "Accept? [y]es / [n]o / [q]uit: ")?;
            output.flush()?;

            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                return Ok(ConfirmDecision::Quit);
            }
            match line.trim().to_lowercase().as_str() {
                "y" | "yes" => return Ok(ConfirmDecision::Accept),
                "n" | "no" => return Ok(ConfirmDecision::Reject),
                "q" | "quit" => return Ok(ConfirmDecision::Quit),
                _ => writeln!(output, "Please answer y, n or q.")?,
            }
        }
    }
}

impl<R, W> Confirmer for TerminalConfirmer<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    fn confirm(&self, raw: &RawTrack, candidate: &ScoredCandidate) -> ConfirmDecision {
        match self.prompt(raw, candidate) {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(error = %e, "Confirmation prompt failed, ending session");
                ConfirmDecision::Quit
            }
        }
    }
}

/// Non-interactive runs: borderline matches are rejected and left for a later retry.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoRejectConfirmer;

impl Confirmer for AutoRejectConfirmer {
    fn confirm(&self, raw: &RawTrack, candidate: &ScoredCandidate) -> ConfirmDecision {
        tracing::debug!(
            artist = %primary_artist_display(&raw.artist),
            title = %raw.title,
            distance = candidate.distance,
            "Borderline match rejected (non-interactive)"
        );
        ConfirmDecision::Reject
    }
}

// ============================================================================
// Ordered Confirmation Queue
// ============================================================================

enum Message {
    Settled(usize),
    Pending {
        index: usize,
        raw: RawTrack,
        candidate: ScoredCandidate,
        reply: Sender<ConfirmDecision>,
    },
}

impl Message {
    fn index(&self) -> usize {
        match self {
            Message::Settled(index) => *index,
            Message::Pending { index, .. } => *index,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfirmSummary {
    pub prompts: usize,
    pub quit_at: Option<usize>,
}

/// Producer side of the queue, shared by all workers of a batch.
#[derive(Clone)]
pub struct ConfirmHandle {
    tx: Sender<Message>,
}

impl ConfirmHandle {
    /// Ticket for batch item `index`. Each index must get exactly one ticket.
    pub fn ticket(&self, index: usize) -> Ticket<'_> {
        Ticket {
            tx: &self.tx,
            index,
            done: false,
        }
    }
}

/// Obligation to report on one batch item. Dropping it unused settles the
/// item, so an early return or a panic never stalls later prompts.
pub struct Ticket<'a> {
    tx: &'a Sender<Message>,
    index: usize,
    done: bool,
}

impl Ticket<'_> {
    /// Queue a prompt and wait for its answer.
    pub fn confirm(mut self, raw: &RawTrack, candidate: &ScoredCandidate) -> ConfirmDecision {
        let (reply_tx, reply_rx) = bounded(1);
        self.done = true;
        let sent = self.tx.send(Message::Pending {
            index: self.index,
            raw: raw.clone(),
            candidate: candidate.clone(),
            reply: reply_tx,
        });
        if sent.is_err() {
            return ConfirmDecision::Quit;
        }
        reply_rx.recv().unwrap_or(ConfirmDecision::Quit)
    }

}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.tx.send(Message::Settled(self.index));
        }
    }
}

/// Run `f` with a confirmation queue whose consumer lives for the duration of the call.
///
/// A quit answer sets `cancel` and every prompt queued after it is answered
/// with `Quit` without reaching the confirmer. When a progress bar is given
/// it is suspended while a prompt is on screen.
pub fn with_confirmation_queue<T>(
    confirmer: &dyn Confirmer,
    cancel: &AtomicBool,
    progress: Option<&ProgressBar>,
    f: impl FnOnce(&ConfirmHandle) -> T,
) -> (T, ConfirmSummary) {
    let (tx, rx) = unbounded::<Message>();

    thread::scope(|s| {
        let consumer = s.spawn(move || consumer_loop(rx, confirmer, cancel, progress));

        let handle = ConfirmHandle { tx };
        let result = f(&handle);
        drop(handle);

        let summary = match consumer.join() {
            Ok(summary) => summary,
            Err(_) => {
                tracing::error!("Confirmation consumer panicked");
                cancel.store(true, Ordering::SeqCst);
                ConfirmSummary::default()
            }
        };
        (result, summary)
    })
}

fn consumer_loop(
    rx: Receiver<Message>,
    confirmer: &dyn Confirmer,
    cancel: &AtomicBool,
    progress: Option<&ProgressBar>,
) -> ConfirmSummary {
    let mut buffered: BTreeMap<usize, Message> = BTreeMap::new();
    let mut next = 0usize;
    let mut summary = ConfirmSummary::default();

    while let Ok(msg) = rx.recv() {
        buffered.insert(msg.index(), msg);

        while let Some(msg) = buffered.remove(&next) {
            if let Message::Pending { index, raw, candidate, reply } = msg {
                let decision = if summary.quit_at.is_some() {
                    ConfirmDecision::Quit
                } else {
                    summary.prompts += 1;
                    match progress {
                        Some(pb) => pb.suspend(|| confirmer.confirm(&raw, &candidate)),
                        None => confirmer.confirm(&raw, &candidate),
                    }
                };

                if decision == ConfirmDecision::Quit && summary.quit_at.is_none() {
                    tracing::info!(index, "Confirmation session ended by user");
                    summary.quit_at = Some(index);
                    cancel.store(true, Ordering::SeqCst);
                }
                let _ = reply.send(decision);
            }
            next += 1;
        }
    }

    if !buffered.is_empty() {
        tracing::warn!(missing = next, "Confirmation queue closed with unsettled items");
    }
    summary
}
