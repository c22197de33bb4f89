use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel as cb;
use log::{debug, info, warn};

use crate::memory::EmulationState;
use crate::signal::SignalChannel;

use super::rules::RuleTable;
use super::tracker::{PollInput, RecoilTracker};
use super::{DEFAULT_POLL_INTERVAL, DEFAULT_WINDOW, MonotonicClock, RecoilShared};

pub enum RecoilCommand {
    SetTitle(Option<String>),
    Shutdown,
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub port: u32,
    pub rules: RuleTable,
    pub poll_interval: Duration,
    pub window: Duration,
    pub suppress_offscreen: bool,
}

impl WorkerConfig {
    pub fn new(port: u32) -> Self {
        Self {
            port,
            rules: RuleTable::builtin(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            window: DEFAULT_WINDOW,
            suppress_offscreen: false,
        }
    }
}

/// Owned handle to a light gun's recoil thread.
///
/// Dropping the handle asks the thread to stop and waits for it, so the
/// signal channel is always closed by the time the drop returns.
pub struct RecoilWorker {
    cmd_tx: cb::Sender<RecoilCommand>,
    handle: Option<JoinHandle<()>>,
}

impl RecoilWorker {
    pub fn spawn(
        config: WorkerConfig,
        shared: Arc<RecoilShared>,
        clock: MonotonicClock,
        emulation: Arc<dyn EmulationState>,
        channel: SignalChannel,
    ) -> std::io::Result<Self> {
        let (cmd_tx, cmd_rx) = cb::unbounded();
        let handle = thread::Builder::new()
            .name(format!("guncon-recoil-{}", config.port + 1))
            .spawn(move || worker_main(config, cmd_rx, shared, clock, emulation, channel))?;

        Ok(Self {
            cmd_tx,
            handle: Some(handle),
        })
    }

    /// Returns `false` when the thread has already exited.
    pub fn set_title(&self, title: Option<String>) -> bool {
        if self.cmd_tx.send(RecoilCommand::SetTitle(title)).is_err() {
            debug!("Recoil: worker gone, title update dropped");
            return false;
        }
        true
    }

    /// True once the thread has exited on its own (host stopped).
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.cmd_tx.send(RecoilCommand::Shutdown);
        if handle.join().is_err() {
            warn!("Recoil: worker thread panicked");
        }
    }
}

impl Drop for RecoilWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Apply one command. Returns `false` when the worker must exit.
fn apply_command(
    cmd: RecoilCommand,
    tracker: &mut RecoilTracker,
    channel: &mut SignalChannel,
) -> bool {
    match cmd {
        RecoilCommand::SetTitle(title) => {
            if title.is_none() {
                channel.close();
            }
            debug!("Recoil: active title now {title:?}");
            tracker.set_title(title);
            true
        }
        RecoilCommand::Shutdown => false,
    }
}

fn worker_main(
    config: WorkerConfig,
    cmd_rx: cb::Receiver<RecoilCommand>,
    shared: Arc<RecoilShared>,
    clock: MonotonicClock,
    emulation: Arc<dyn EmulationState>,
    mut channel: SignalChannel,
) {
    let gun = config.port + 1;
    info!("Recoil: GUN{gun} worker started");

    let mut tracker = RecoilTracker::new(
        config.port,
        config.rules,
        config.window,
        config.suppress_offscreen,
    );

    'outer: loop {
        loop {
            match cmd_rx.try_recv() {
                Ok(cmd) => {
                    if !apply_command(cmd, &mut tracker, &mut channel) {
                        break 'outer;
                    }
                }
                Err(cb::TryRecvError::Empty) => break,
                Err(cb::TryRecvError::Disconnected) => break 'outer,
            }
        }

        if !emulation.run_state().is_active() {
            debug!("Recoil: GUN{gun} host left running state");
            break;
        }

        let input = PollInput {
            now_us: clock.now_us(),
            trigger: shared.trigger.snapshot(),
            offscreen: shared.offscreen(),
        };

        if let Some(event) = tracker.poll(emulation.as_ref(), input) {
            let side = tracker.side();
            if channel.send_line(side, event.token()) {
                debug!("Recoil: GUN{gun} -> {} {event}", side.name());
            } else {
                debug!("Recoil: GUN{gun} dropped {event} ({} total)", channel.dropped());
            }
        }

        match cmd_rx.recv_timeout(config.poll_interval) {
            Ok(cmd) => {
                if !apply_command(cmd, &mut tracker, &mut channel) {
                    break;
                }
            }
            Err(cb::RecvTimeoutError::Timeout) => {}
            Err(cb::RecvTimeoutError::Disconnected) => break,
        }
    }

    channel.close();
    info!("Recoil: GUN{gun} worker stopped");
}
