//! Command collector
//!
//! The collector is the synchronous core behind every intercepted driver
//! call: the interception layer (append/list/queue/signal hooks) and the
//! submission-completion correlator (targeted and sweep retirement) share
//! one coarse lock over all bookkeeping state. Hooks run in-line on the
//! application thread that made the intercepted call; nothing here blocks
//! on hardware.

use crate::clock::HostClock;
use crate::command::{CallRecord, CommandRecord, SignalOwnership};
use crate::driver::{DeviceTimestamps, DriverError, DriverOps};
use crate::intercept::{AppendRequest, CallOutcome, CallSeed, PendingAppend, SubmitAnchor, SubmitBatch};
use crate::interval::{expand_interval, KernelInterval};
use crate::registry::{CommandListRecord, TraceState};
use crate::stats::KernelStat;
use crate::topology::DeviceTopology;
use gpuscope_shared::utils::time::ticks_to_ns;
use gpuscope_shared::{
    CommandListHandle, CompletionEvent, ContextHandle, DeviceHandle, ImageHandle, KernelHandle,
    QueueHandle, SignalHandle,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Collector configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracerConfig {
    /// Decorate operation names with launch shape or byte counts.
    pub verbose: bool,
}

/// Receives one notification per retired call.
pub trait CompletionSink: Send + Sync {
    fn on_complete(&self, event: &CompletionEvent);
}

/// The interception and correlation engine.
///
/// The embedding shim calls the `on_*` hook methods from its driver
/// callbacks; multiple application threads may do so concurrently. Query
/// surfaces return snapshots taken under the lock and are safe to call at
/// any time, including after tracing is disabled.
pub struct CommandCollector {
    driver: Arc<dyn DriverOps>,
    clock: Arc<dyn HostClock>,
    topology: DeviceTopology,
    verbose: bool,
    enabled: AtomicBool,
    next_command_id: AtomicU64,
    sink: Mutex<Option<Box<dyn CompletionSink>>>,
    state: Mutex<TraceState>,
}

impl CommandCollector {
    /// Build a collector against the given driver and host clock,
    /// enumerating the device topology once.
    pub fn new(driver: Arc<dyn DriverOps>, clock: Arc<dyn HostClock>, config: TracerConfig) -> Self {
        let topology = DeviceTopology::discover(driver.as_ref());
        info!(devices = topology.len(), "command collector created");
        Self {
            driver,
            clock,
            topology,
            verbose: config.verbose,
            enabled: AtomicBool::new(true),
            next_command_id: AtomicU64::new(1),
            sink: Mutex::new(None),
            state: Mutex::new(TraceState::new()),
        }
    }

    /// Register the sink notified once per retired call. Replaces any
    /// previously registered sink.
    pub fn set_completion_sink(&self, sink: Box<dyn CompletionSink>) {
        *self.sink.lock().unwrap() = Some(sink);
    }

    /// Whether the shim should deliver intercepted calls. The collector
    /// itself does not gate on this; the shim checks it before calling in,
    /// the same way a driver-level tracer is switched off at the loader.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    /// Device topology enumerated at construction.
    pub fn topology(&self) -> &DeviceTopology {
        &self.topology
    }

    // ── Interception: command lists ─────────────────────────────────────

    /// A command list was created. `immediate` lists execute appends
    /// directly and never appear in a queue-execute call.
    pub fn on_list_created(
        &self,
        list: CommandListHandle,
        context: ContextHandle,
        device: DeviceHandle,
        immediate: bool,
    ) {
        let mut state = self.state.lock().unwrap();
        let previous = state.lists.insert(
            list,
            CommandListRecord {
                context,
                device,
                immediate,
                commands: Vec::new(),
            },
        );
        assert!(previous.is_none(), "command list {list:?} registered twice");
        debug!(list = list.raw(), immediate, "command list registered");
    }

    /// A command list is being destroyed: drain whatever already completed,
    /// then release the list's commands and the record itself.
    pub fn on_list_destroyed(&self, list: CommandListHandle) {
        let mut state = self.state.lock().unwrap();
        self.sweep_locked(&mut state);
        self.release_list_commands(&mut state, list);
        state.lists.remove(&list);
        debug!(list = list.raw(), "command list destroyed");
    }

    /// A command list was reset: drain, then release its commands. The
    /// record survives for further appends.
    pub fn on_list_reset(&self, list: CommandListHandle) {
        let mut state = self.state.lock().unwrap();
        self.sweep_locked(&mut state);
        self.release_list_commands(&mut state, list);
        debug!(list = list.raw(), "command list reset");
    }

    /// The host synchronized with a command list; everything it ran has
    /// completed, so drain.
    pub fn on_list_synchronized(&self, list: CommandListHandle) {
        debug!(list = list.raw(), "command list synchronized");
        let mut state = self.state.lock().unwrap();
        self.sweep_locked(&mut state);
    }

    // ── Interception: appends ───────────────────────────────────────────

    /// First phase of a command-append call, before the driver runs it.
    ///
    /// Builds the candidate command. When the application did not supply a
    /// completion signal, one is created on the list's context and the shim
    /// must attach [`PendingAppend::signal`] to the driver call. For
    /// immediate lists the submission anchor is captured here: the append
    /// host time and the device timer at this moment.
    pub fn on_append_enter(
        &self,
        list: CommandListHandle,
        request: AppendRequest<'_>,
        signal: Option<SignalHandle>,
    ) -> Result<PendingAppend, DriverError> {
        let (context, device, immediate, info) = {
            let state = self.state.lock().unwrap();
            let record = state.list(list);
            (
                record.context,
                record.device,
                record.immediate,
                request.normalize(&state),
            )
        };

        let append_ns = self.clock.now_ns();
        let timer_frequency = self.driver.timer_frequency(device);
        assert!(timer_frequency > 0, "device {device:?} reports a zero timer frequency");

        let (signal, ownership) = match signal {
            Some(signal) => (signal, SignalOwnership::Borrowed),
            None => (self.driver.create_signal(context)?, SignalOwnership::Owned),
        };

        let seed = immediate.then(|| CallSeed {
            queue: list.as_queue(),
            submit_ns: append_ns,
            device_submit_ticks: self.device_ticks(device),
        });

        debug!(list = list.raw(), name = %info.name, "append intercepted");
        Ok(PendingAppend {
            list,
            command: CommandRecord {
                info,
                signal,
                ownership,
                list,
                device,
                id: 0,
                append_ns,
                timer_frequency,
                call_count: 0,
            },
            seed,
        })
    }

    /// Second phase of a command-append call, after the driver reported its
    /// outcome.
    ///
    /// On failure the candidate evaporates: nothing is committed and an
    /// owned signal is destroyed. On success the command is committed to
    /// its list and, for immediate lists, the seeded call joins the pending
    /// set.
    pub fn on_append_exit(&self, pending: PendingAppend, outcome: CallOutcome) {
        let PendingAppend {
            list,
            mut command,
            seed,
        } = pending;

        if outcome == CallOutcome::Failure {
            debug!(list = list.raw(), name = %command.info.name, "append failed, discarding candidate");
            self.release_signal(&command);
            return;
        }

        command.id = self.next_command_id.fetch_add(1, Ordering::Relaxed);
        let id = command.id;

        let mut state = self.state.lock().unwrap();
        state.list_mut(list).commands.push(id);
        if let Some(seed) = seed {
            command.call_count += 1;
            state.pending.push(CallRecord {
                command_id: id,
                queue: seed.queue,
                submit_ns: seed.submit_ns,
                device_submit_ticks: seed.device_submit_ticks,
                call_id: command.call_count,
            });
        }
        state.commands.insert(id, command);
    }

    // ── Interception: queue execution ───────────────────────────────────

    /// First phase of a queue-execute call: capture one host/device anchor
    /// pair per submitted list, before the driver accepts the batch.
    pub fn on_execute_enter(&self, lists: &[CommandListHandle]) -> SubmitBatch {
        let devices: Vec<DeviceHandle> = {
            let state = self.state.lock().unwrap();
            lists.iter().map(|&list| state.list(list).device).collect()
        };
        let anchors = devices
            .into_iter()
            .map(|device| SubmitAnchor {
                host_ns: self.clock.now_ns(),
                device_ticks: self.device_ticks(device),
            })
            .collect();
        SubmitBatch { anchors }
    }

    /// Second phase of a queue-execute call: on success, manufacture one
    /// call per command committed to each non-immediate list, all sharing
    /// that list's anchor pair.
    pub fn on_execute_exit(
        &self,
        batch: SubmitBatch,
        queue: QueueHandle,
        lists: &[CommandListHandle],
        outcome: CallOutcome,
    ) {
        if outcome == CallOutcome::Failure {
            return;
        }
        assert_eq!(
            batch.anchors.len(),
            lists.len(),
            "submit batch does not match the executed list count"
        );

        let mut state = self.state.lock().unwrap();
        let state = &mut *state;
        for (&list, anchor) in lists.iter().zip(batch.anchors) {
            let record = state.list(list);
            if record.immediate {
                continue;
            }
            let ids = record.commands.clone();
            for id in ids {
                let command = state
                    .commands
                    .get_mut(&id)
                    .unwrap_or_else(|| panic!("command {id} missing from arena"));
                assert!(
                    command.append_ns <= anchor.host_ns,
                    "submission precedes append"
                );
                command.call_count += 1;
                state.pending.push(CallRecord {
                    command_id: id,
                    queue,
                    submit_ns: anchor.host_ns,
                    device_submit_ticks: anchor.device_ticks,
                    call_id: command.call_count,
                });
            }
            debug!(list = list.raw(), queue = queue.raw(), "command list submitted");
        }
    }

    // ── Interception: queues and signals ────────────────────────────────

    /// The host synchronized with a queue: drain.
    pub fn on_queue_synchronized(&self, queue: QueueHandle) {
        debug!(queue = queue.raw(), "queue synchronized");
        let mut state = self.state.lock().unwrap();
        self.sweep_locked(&mut state);
    }

    /// A queue is being destroyed: drain.
    pub fn on_queue_destroyed(&self, queue: QueueHandle) {
        debug!(queue = queue.raw(), "queue destroyed");
        let mut state = self.state.lock().unwrap();
        self.sweep_locked(&mut state);
    }

    /// The application is about to destroy a signal: last chance to observe
    /// a completion it carries.
    pub fn on_signal_destroy(&self, signal: SignalHandle) {
        self.process_signal(signal);
    }

    /// The application is about to reset a signal; same as destruction from
    /// the correlator's point of view.
    pub fn on_signal_reset(&self, signal: SignalHandle) {
        self.process_signal(signal);
    }

    /// The host successfully synchronized with a signal.
    pub fn on_signal_synchronized(&self, signal: SignalHandle) {
        self.process_signal(signal);
    }

    // ── Interception: side tables ───────────────────────────────────────

    /// Record the work-group size configured on a kernel; resolved when a
    /// launch of that kernel is appended.
    pub fn on_group_size_set(&self, kernel: KernelHandle, group_size: [u32; 3]) {
        let mut state = self.state.lock().unwrap();
        state.group_sizes.insert(kernel, group_size);
    }

    pub fn on_kernel_destroyed(&self, kernel: KernelHandle) {
        let mut state = self.state.lock().unwrap();
        state.group_sizes.remove(&kernel);
    }

    /// Record an image's byte size; resolved when a copy involving it is
    /// appended.
    pub fn on_image_created(&self, image: ImageHandle, byte_size: u64) {
        let mut state = self.state.lock().unwrap();
        let previous = state.image_sizes.insert(image, byte_size);
        assert!(previous.is_none(), "image {image:?} registered twice");
    }

    pub fn on_image_destroyed(&self, image: ImageHandle) {
        let mut state = self.state.lock().unwrap();
        let removed = state.image_sizes.remove(&image);
        assert!(removed.is_some(), "image {image:?} is not registered");
    }

    // ── Query surfaces ──────────────────────────────────────────────────

    /// Ranked statistics snapshot: descending total time, ties by
    /// descending call count.
    pub fn kernel_stats(&self) -> Vec<(String, KernelStat)> {
        self.state.lock().unwrap().stats.ranked()
    }

    /// Snapshot of all intervals built so far, windows in the device clock
    /// domain.
    pub fn kernel_intervals(&self) -> Vec<KernelInterval> {
        self.state.lock().unwrap().intervals.clone()
    }

    /// Number of calls still awaiting completion.
    pub fn pending_calls(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    // ── Correlation ─────────────────────────────────────────────────────

    /// Targeted completion path: retire the pending call whose command owns
    /// `signal`, if that signal polls complete. A no-op for signals with no
    /// pending call (already retired, or never instrumented).
    fn process_signal(&self, signal: SignalHandle) {
        if !self.driver.signal_complete(signal) {
            return;
        }
        let mut state = self.state.lock().unwrap();
        let position = state
            .pending
            .iter()
            .position(|call| state.command(call.command_id).signal == signal);
        if let Some(position) = position {
            let call = state.pending.remove(position);
            self.retire(&mut state, call);
        }
    }

    /// Sweep path: retire every pending call whose signal polls complete.
    /// Idempotent against itself and the targeted path; a call leaves the
    /// pending set before any statistics derived from it become visible.
    fn sweep_locked(&self, state: &mut TraceState) {
        let mut index = 0;
        while index < state.pending.len() {
            let signal = state.command(state.pending[index].command_id).signal;
            if self.driver.signal_complete(signal) {
                let call = state.pending.remove(index);
                self.retire(state, call);
            } else {
                index += 1;
            }
        }
    }

    /// Resolve one completed call into statistics, interval windows, and a
    /// sink notification. The caller has already removed it from the
    /// pending set.
    fn retire(&self, state: &mut TraceState, call: CallRecord) {
        let command = state.command(call.command_id);
        let list = command.list;
        let device = command.device;
        let command_id = command.id;
        let append_ns = command.append_ns;
        let frequency = command.timer_frequency;
        let signal = command.signal;
        let display_name = command.info.display_name(self.verbose);

        assert!(frequency > 0, "command {command_id} recorded a zero timer frequency");
        let DeviceTimestamps {
            start_ticks,
            end_ticks,
        } = self
            .driver
            .signal_timestamps(signal)
            .expect("completed signal has no timestamps");

        let elapsed_ticks = if start_ticks < end_ticks {
            end_ticks - start_ticks
        } else {
            // single 32-bit timer wraparound
            (1u64 << 32) + end_ticks - start_ticks
        };
        let duration_ns = ticks_to_ns(elapsed_ticks, frequency);

        assert!(call.submit_ns > 0, "call has no host submission timestamp");
        assert!(
            call.device_submit_ticks > 0,
            "call has no device submission timestamp"
        );
        assert!(
            start_ticks > call.device_submit_ticks,
            "device start precedes the submission anchor"
        );
        let shift_ns = ticks_to_ns(start_ticks - call.device_submit_ticks, frequency);
        let start_ns = call.submit_ns + shift_ns;
        let end_ns = start_ns + duration_ns;

        state.stats.record(&display_name, end_ns - start_ns);

        // Interval windows stay device-relative so they line up with
        // counter reports sampled by the same clock.
        let window_start_ns = ticks_to_ns(start_ticks, frequency);
        let window_end_ns = window_start_ns + duration_ns;
        state.intervals.push(expand_interval(
            &self.topology,
            display_name.clone(),
            device,
            window_start_ns,
            window_end_ns,
        ));

        if let Some(sink) = self.sink.lock().unwrap().as_ref() {
            assert!(append_ns > 0, "command has no append timestamp");
            assert!(append_ns <= call.submit_ns, "append follows submission");
            sink.on_complete(&CompletionEvent {
                command_id,
                call_id: call.call_id,
                queue: call.queue,
                name: display_name.clone(),
                append_ns,
                submit_ns: call.submit_ns,
                start_ns,
                end_ns,
            });
        }

        debug!(name = %display_name, duration_ns, "call retired");

        // An immediate-list command gets exactly one call; once that call
        // retires the command can never run again, so release it now.
        if state.list(list).immediate {
            let command = state
                .commands
                .remove(&call.command_id)
                .unwrap_or_else(|| panic!("command {command_id} missing from arena"));
            self.release_signal(&command);
            state.list_mut(list).commands.retain(|&id| id != command_id);
        }
    }

    /// Release the commands retained by a list after a drain sweep. Any
    /// call still pending against them means the application destroyed a
    /// list with work in flight, which is a broken driver contract.
    fn release_list_commands(&self, state: &mut TraceState, list: CommandListHandle) {
        let ids = std::mem::take(&mut state.list_mut(list).commands);
        for id in ids {
            assert!(
                state.pending.iter().all(|call| call.command_id != id),
                "pending call survived command release"
            );
            let command = state
                .commands
                .remove(&id)
                .unwrap_or_else(|| panic!("command {id} missing from arena"));
            self.release_signal(&command);
        }
    }

    /// Destroy a command's signal if the tracer owns it. Borrowed signals
    /// belong to the application and are never touched.
    fn release_signal(&self, command: &CommandRecord) {
        if command.ownership == SignalOwnership::Owned {
            if let Err(err) = self.driver.destroy_signal(command.signal) {
                warn!(signal = command.signal.raw(), %err, "failed to destroy owned signal");
            }
        }
    }

    /// Masked device timer read.
    fn device_ticks(&self, device: DeviceHandle) -> u64 {
        self.driver.device_timestamp(device) & self.driver.timestamp_mask(device)
    }
}
