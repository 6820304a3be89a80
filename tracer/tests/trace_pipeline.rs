//! End-to-end exercises of the interception and correlation core against a
//! scripted fake driver.

use anyhow::Result;
use gpuscope_shared::{
    CommandListHandle, CompletionEvent, ContextHandle, DeviceHandle, ImageHandle, KernelHandle,
    QueueHandle, SignalHandle,
};
use gpuscope_tracer::{
    AppendRequest, CallOutcome, ClockSample, CommandCollector, CompletionSink, DeviceTimestamps,
    DeviceWindow, DriverError, DriverOps, HostClock, TracerConfig,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

const FREQ: u64 = 1_000_000_000;

#[derive(Default)]
struct FakeDriverState {
    devices: Vec<DeviceHandle>,
    sub_devices: HashMap<DeviceHandle, Vec<DeviceHandle>>,
    ticks: HashMap<DeviceHandle, u64>,
    next_signal: u64,
    completed: HashMap<SignalHandle, DeviceTimestamps>,
    destroyed: Vec<SignalHandle>,
}

/// Scripted driver: devices are registered up front, signal completion is
/// injected by the test, destruction is recorded for leak checks.
struct FakeDriver {
    state: Mutex<FakeDriverState>,
}

impl FakeDriver {
    fn new() -> Self {
        Self {
            state: Mutex::new(FakeDriverState {
                next_signal: 0x1000,
                ..FakeDriverState::default()
            }),
        }
    }

    fn add_device(&self, root: u64, sub_devices: &[u64]) -> DeviceHandle {
        let mut state = self.state.lock().unwrap();
        let root = DeviceHandle::new(root);
        state.devices.push(root);
        state
            .sub_devices
            .insert(root, sub_devices.iter().map(|&raw| DeviceHandle::new(raw)).collect());
        state.ticks.insert(root, 500);
        for &raw in sub_devices {
            state.ticks.insert(DeviceHandle::new(raw), 500);
        }
        root
    }

    fn set_device_ticks(&self, device: DeviceHandle, ticks: u64) {
        self.state.lock().unwrap().ticks.insert(device, ticks);
    }

    /// Allocate a signal the way the application would, outside the
    /// tracer's ownership.
    fn app_signal(&self) -> SignalHandle {
        let mut state = self.state.lock().unwrap();
        state.next_signal += 1;
        SignalHandle::new(state.next_signal)
    }

    fn complete(&self, signal: SignalHandle, start_ticks: u64, end_ticks: u64) {
        self.state.lock().unwrap().completed.insert(
            signal,
            DeviceTimestamps {
                start_ticks,
                end_ticks,
            },
        );
    }

    fn destroy_count(&self, signal: SignalHandle) -> usize {
        self.state
            .lock()
            .unwrap()
            .destroyed
            .iter()
            .filter(|&&destroyed| destroyed == signal)
            .count()
    }
}

impl DriverOps for FakeDriver {
    fn device_list(&self) -> Vec<DeviceHandle> {
        self.state.lock().unwrap().devices.clone()
    }

    fn sub_device_list(&self, device: DeviceHandle) -> Vec<DeviceHandle> {
        self.state
            .lock()
            .unwrap()
            .sub_devices
            .get(&device)
            .cloned()
            .unwrap_or_default()
    }

    fn timer_frequency(&self, _: DeviceHandle) -> u64 {
        FREQ
    }

    fn timestamp_mask(&self, _: DeviceHandle) -> u64 {
        u32::MAX as u64
    }

    fn device_timestamp(&self, device: DeviceHandle) -> u64 {
        self.state
            .lock()
            .unwrap()
            .ticks
            .get(&device)
            .copied()
            .unwrap_or(0)
    }

    fn synchronized_timestamps(&self, device: DeviceHandle) -> ClockSample {
        ClockSample {
            host_ns: 1,
            device_ticks: self.device_timestamp(device),
        }
    }

    fn create_signal(&self, _: ContextHandle) -> Result<SignalHandle, DriverError> {
        let mut state = self.state.lock().unwrap();
        state.next_signal += 1;
        Ok(SignalHandle::new(state.next_signal))
    }

    fn destroy_signal(&self, signal: SignalHandle) -> Result<(), DriverError> {
        self.state.lock().unwrap().destroyed.push(signal);
        Ok(())
    }

    fn signal_complete(&self, signal: SignalHandle) -> bool {
        self.state.lock().unwrap().completed.contains_key(&signal)
    }

    fn signal_timestamps(&self, signal: SignalHandle) -> Result<DeviceTimestamps, DriverError> {
        self.state
            .lock()
            .unwrap()
            .completed
            .get(&signal)
            .copied()
            .ok_or(DriverError::TimestampsUnavailable(signal))
    }
}

/// Hand-driven host clock.
struct FakeClock {
    now_ns: AtomicU64,
}

impl FakeClock {
    fn new(now_ns: u64) -> Self {
        Self {
            now_ns: AtomicU64::new(now_ns),
        }
    }

    fn set(&self, now_ns: u64) {
        self.now_ns.store(now_ns, Ordering::Relaxed);
    }
}

impl HostClock for FakeClock {
    fn now_ns(&self) -> u64 {
        self.now_ns.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Default)]
struct RecordingSink {
    events: Arc<Mutex<Vec<CompletionEvent>>>,
}

impl RecordingSink {
    fn take(&self) -> Vec<CompletionEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

impl CompletionSink for RecordingSink {
    fn on_complete(&self, event: &CompletionEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

struct Harness {
    driver: Arc<FakeDriver>,
    clock: Arc<FakeClock>,
    collector: CommandCollector,
    events: RecordingSink,
}

fn harness_with(devices: &[(u64, &[u64])], verbose: bool) -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let driver = Arc::new(FakeDriver::new());
    for &(root, sub_devices) in devices {
        driver.add_device(root, sub_devices);
    }
    let clock = Arc::new(FakeClock::new(1_000));
    let collector = CommandCollector::new(
        driver.clone(),
        clock.clone(),
        TracerConfig { verbose },
    );
    let events = RecordingSink::default();
    collector.set_completion_sink(Box::new(events.clone()));
    Harness {
        driver,
        clock,
        collector,
        events,
    }
}

fn harness() -> Harness {
    harness_with(&[(0x10, &[])], false)
}

const DEVICE: DeviceHandle = DeviceHandle::new(0x10);
const LIST: CommandListHandle = CommandListHandle::new(0x100);
const CONTEXT: ContextHandle = ContextHandle::new(0x1);
const QUEUE: QueueHandle = QueueHandle::new(0x200);

fn gemm_launch() -> AppendRequest<'static> {
    AppendRequest::LaunchKernel {
        kernel: KernelHandle::new(0x7),
        name: "gemm",
        simd_width: 32,
        group_count: [4, 1, 1],
    }
}

/// Append one operation to an immediate list, complete it and drain.
fn run_immediate(
    harness: &Harness,
    request: AppendRequest<'_>,
    start_ticks: u64,
    end_ticks: u64,
) -> SignalHandle {
    let pending = harness
        .collector
        .on_append_enter(LIST, request, None)
        .unwrap();
    let signal = pending.signal();
    harness.collector.on_append_exit(pending, CallOutcome::Success);
    harness.driver.complete(signal, start_ticks, end_ticks);
    harness.collector.on_queue_synchronized(LIST.as_queue());
    signal
}

#[test]
fn test_immediate_list_retires_on_queue_synchronize() -> Result<()> {
    let harness = harness();
    harness.collector.on_list_created(LIST, CONTEXT, DEVICE, true);

    let pending = harness
        .collector
        .on_append_enter(LIST, gemm_launch(), None)?;
    let signal = pending.signal();
    harness.collector.on_append_exit(pending, CallOutcome::Success);
    assert_eq!(harness.collector.pending_calls(), 1);

    harness.driver.complete(signal, 600, 850);
    harness.collector.on_queue_synchronized(LIST.as_queue());

    assert_eq!(harness.collector.pending_calls(), 0);
    let stats = harness.collector.kernel_stats();
    assert_eq!(stats.len(), 1);
    let (name, stat) = &stats[0];
    assert_eq!(name, "gemm");
    assert_eq!(stat.total_ns, 250);
    assert_eq!(stat.min_ns, 250);
    assert_eq!(stat.max_ns, 250);
    assert_eq!(stat.call_count, 1);

    let events = harness.events.take();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.correlation_id(), "1.1");
    assert_eq!(event.queue, LIST.as_queue());
    assert_eq!(event.append_ns, 1_000);
    assert_eq!(event.submit_ns, 1_000);
    // device start was 100 ticks past the submission anchor of 500
    assert_eq!(event.start_ns, 1_100);
    assert_eq!(event.end_ns, 1_350);

    // The immediate-list command is released at retirement, and its owned
    // signal with it.
    assert_eq!(harness.driver.destroy_count(signal), 1);
    Ok(())
}

#[test]
fn test_batched_list_creates_calls_at_execute() -> Result<()> {
    let harness = harness();
    harness.collector.on_list_created(LIST, CONTEXT, DEVICE, false);

    let pending = harness
        .collector
        .on_append_enter(LIST, gemm_launch(), None)?;
    let signal = pending.signal();
    harness.collector.on_append_exit(pending, CallOutcome::Success);

    // No call until the list is actually submitted
    assert_eq!(harness.collector.pending_calls(), 0);

    harness.clock.set(2_000);
    harness.driver.set_device_ticks(DEVICE, 1_000);
    let batch = harness.collector.on_execute_enter(&[LIST]);
    harness
        .collector
        .on_execute_exit(batch, QUEUE, &[LIST], CallOutcome::Success);
    assert_eq!(harness.collector.pending_calls(), 1);

    harness.driver.complete(signal, 1_200, 1_500);
    harness.collector.on_queue_synchronized(QUEUE);

    let stats = harness.collector.kernel_stats();
    assert_eq!(stats[0].1.total_ns, 300);

    let events = harness.events.take();
    let event = &events[0];
    assert_eq!(event.append_ns, 1_000);
    assert_eq!(event.submit_ns, 2_000);
    assert_eq!(event.start_ns, 2_200);
    assert_eq!(event.end_ns, 2_500);
    assert_eq!(event.queue, QUEUE);

    // Batched commands survive retirement; the signal lives until the list
    // releases its commands.
    assert_eq!(harness.driver.destroy_count(signal), 0);
    harness.collector.on_list_destroyed(LIST);
    assert_eq!(harness.driver.destroy_count(signal), 1);
    Ok(())
}

#[test]
fn test_resubmission_creates_a_second_call() {
    let harness = harness();
    harness.collector.on_list_created(LIST, CONTEXT, DEVICE, false);

    let pending = harness
        .collector
        .on_append_enter(LIST, gemm_launch(), None)
        .unwrap();
    let signal = pending.signal();
    harness.collector.on_append_exit(pending, CallOutcome::Success);

    harness.clock.set(2_000);
    harness.driver.set_device_ticks(DEVICE, 1_000);
    let batch = harness.collector.on_execute_enter(&[LIST]);
    harness
        .collector
        .on_execute_exit(batch, QUEUE, &[LIST], CallOutcome::Success);
    harness.driver.complete(signal, 1_200, 1_500);
    harness.collector.on_queue_synchronized(QUEUE);

    // Execute the same list again
    harness.clock.set(3_000);
    harness.driver.set_device_ticks(DEVICE, 1_100);
    let batch = harness.collector.on_execute_enter(&[LIST]);
    harness
        .collector
        .on_execute_exit(batch, QUEUE, &[LIST], CallOutcome::Success);
    harness.collector.on_queue_synchronized(QUEUE);

    let stats = harness.collector.kernel_stats();
    assert_eq!(stats[0].1.call_count, 2);
    assert_eq!(stats[0].1.total_ns, 600);

    let events = harness.events.take();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].correlation_id(), "1.1");
    assert_eq!(events[1].correlation_id(), "1.2");
}

#[test]
fn test_wraparound_duration() {
    let harness = harness();
    harness.collector.on_list_created(LIST, CONTEXT, DEVICE, true);
    harness.driver.set_device_ticks(DEVICE, 0xFFFF_FF00);

    run_immediate(&harness, gemm_launch(), 0xFFFF_FFF0, 0x10);

    let stats = harness.collector.kernel_stats();
    // (2^32 + 0x10) - 0xFFFFFFF0 = 0x20 ticks at 1 GHz
    assert_eq!(stats[0].1.total_ns, 0x20);

    let events = harness.events.take();
    assert_eq!(events[0].start_ns, 1_000 + 0xF0);
    assert_eq!(events[0].end_ns, 1_000 + 0xF0 + 0x20);
}

#[test]
fn test_sweep_is_idempotent() {
    let harness = harness();
    harness.collector.on_list_created(LIST, CONTEXT, DEVICE, false);

    let first = harness
        .collector
        .on_append_enter(LIST, gemm_launch(), None)
        .unwrap();
    let first_signal = first.signal();
    harness.collector.on_append_exit(first, CallOutcome::Success);
    let second = harness
        .collector
        .on_append_enter(
            LIST,
            AppendRequest::MemoryCopy { bytes: 64 },
            None,
        )
        .unwrap();
    let second_signal = second.signal();
    harness.collector.on_append_exit(second, CallOutcome::Success);

    harness.clock.set(2_000);
    harness.driver.set_device_ticks(DEVICE, 1_000);
    let batch = harness.collector.on_execute_enter(&[LIST]);
    harness
        .collector
        .on_execute_exit(batch, QUEUE, &[LIST], CallOutcome::Success);
    assert_eq!(harness.collector.pending_calls(), 2);

    // Only the first operation has completed
    harness.driver.complete(first_signal, 1_200, 1_300);
    harness.collector.on_queue_synchronized(QUEUE);
    assert_eq!(harness.collector.pending_calls(), 1);
    assert_eq!(harness.events.take().len(), 1);

    // A second sweep with no new completions retires nothing
    harness.collector.on_queue_synchronized(QUEUE);
    assert_eq!(harness.collector.pending_calls(), 1);
    assert!(harness.events.take().is_empty());
    assert_eq!(harness.collector.kernel_stats().len(), 1);

    harness.driver.complete(second_signal, 1_400, 1_600);
    harness.collector.on_list_destroyed(LIST);
    assert_eq!(harness.collector.pending_calls(), 0);
    assert_eq!(harness.collector.kernel_stats().len(), 2);
}

#[test]
fn test_failed_append_leaves_no_state() {
    let harness = harness();
    harness.collector.on_list_created(LIST, CONTEXT, DEVICE, true);

    let pending = harness
        .collector
        .on_append_enter(LIST, gemm_launch(), None)
        .unwrap();
    let signal = pending.signal();
    harness.collector.on_append_exit(pending, CallOutcome::Failure);

    assert_eq!(harness.collector.pending_calls(), 0);
    assert!(harness.collector.kernel_stats().is_empty());
    // The owned candidate signal is destroyed exactly once
    assert_eq!(harness.driver.destroy_count(signal), 1);

    // The list is empty; destroying it releases nothing further
    harness.collector.on_list_destroyed(LIST);
    assert_eq!(harness.driver.destroy_count(signal), 1);
}

#[test]
fn test_borrowed_signal_is_never_destroyed() {
    let harness = harness();
    harness.collector.on_list_created(LIST, CONTEXT, DEVICE, false);

    let app_signal = harness.driver.app_signal();
    let pending = harness
        .collector
        .on_append_enter(LIST, gemm_launch(), Some(app_signal))
        .unwrap();
    // The tracer must attach the caller's signal, not its own
    assert_eq!(pending.signal(), app_signal);
    harness.collector.on_append_exit(pending, CallOutcome::Success);

    harness.clock.set(2_000);
    harness.driver.set_device_ticks(DEVICE, 1_000);
    let batch = harness.collector.on_execute_enter(&[LIST]);
    harness
        .collector
        .on_execute_exit(batch, QUEUE, &[LIST], CallOutcome::Success);

    harness.driver.complete(app_signal, 1_200, 1_500);
    // Targeted path: the application synchronized with its own signal
    harness.collector.on_signal_synchronized(app_signal);

    assert_eq!(harness.collector.pending_calls(), 0);
    assert_eq!(harness.events.take().len(), 1);

    harness.collector.on_list_destroyed(LIST);
    assert_eq!(harness.driver.destroy_count(app_signal), 0);
}

#[test]
fn test_targeted_path_ignores_incomplete_signals() {
    let harness = harness();
    harness.collector.on_list_created(LIST, CONTEXT, DEVICE, false);

    let app_signal = harness.driver.app_signal();
    let pending = harness
        .collector
        .on_append_enter(LIST, gemm_launch(), Some(app_signal))
        .unwrap();
    harness.collector.on_append_exit(pending, CallOutcome::Success);

    harness.clock.set(2_000);
    harness.driver.set_device_ticks(DEVICE, 1_000);
    let batch = harness.collector.on_execute_enter(&[LIST]);
    harness
        .collector
        .on_execute_exit(batch, QUEUE, &[LIST], CallOutcome::Success);

    // Not complete yet: the hook must not retire anything
    harness.collector.on_signal_destroy(app_signal);
    assert_eq!(harness.collector.pending_calls(), 1);

    harness.driver.complete(app_signal, 1_200, 1_500);
    harness.collector.on_signal_destroy(app_signal);
    assert_eq!(harness.collector.pending_calls(), 0);
    assert_eq!(harness.events.take().len(), 1);
}

#[test]
fn test_list_destroy_drains_completed_calls() {
    let harness = harness();
    harness.collector.on_list_created(LIST, CONTEXT, DEVICE, false);

    let names = ["a", "b", "c"];
    let mut signals = Vec::new();
    for name in names {
        let pending = harness
            .collector
            .on_append_enter(
                LIST,
                AppendRequest::LaunchKernel {
                    kernel: KernelHandle::new(0x7),
                    name,
                    simd_width: 16,
                    group_count: [1, 1, 1],
                },
                None,
            )
            .unwrap();
        signals.push(pending.signal());
        harness.collector.on_append_exit(pending, CallOutcome::Success);
    }

    harness.clock.set(2_000);
    harness.driver.set_device_ticks(DEVICE, 1_000);
    let batch = harness.collector.on_execute_enter(&[LIST]);
    harness
        .collector
        .on_execute_exit(batch, QUEUE, &[LIST], CallOutcome::Success);
    assert_eq!(harness.collector.pending_calls(), 3);

    for (index, signal) in signals.iter().enumerate() {
        let start = 1_100 + index as u64 * 100;
        harness.driver.complete(*signal, start, start + 50);
    }

    // Destroy without an explicit synchronize: the mandatory drain sweep
    // must retire all three before releasing the commands.
    harness.collector.on_list_destroyed(LIST);

    assert_eq!(harness.collector.pending_calls(), 0);
    let stats = harness.collector.kernel_stats();
    assert_eq!(stats.len(), 3);
    for (_, stat) in &stats {
        assert_eq!(stat.call_count, 1);
    }
    for signal in signals {
        assert_eq!(harness.driver.destroy_count(signal), 1);
    }
}

#[test]
fn test_list_reset_releases_commands_but_keeps_record() {
    let harness = harness();
    harness.collector.on_list_created(LIST, CONTEXT, DEVICE, false);

    let pending = harness
        .collector
        .on_append_enter(LIST, gemm_launch(), None)
        .unwrap();
    let signal = pending.signal();
    harness.collector.on_append_exit(pending, CallOutcome::Success);

    harness.collector.on_list_reset(LIST);
    assert_eq!(harness.driver.destroy_count(signal), 1);
    assert!(harness.collector.kernel_stats().is_empty());

    // The record survives the reset and accepts new appends
    let pending = harness
        .collector
        .on_append_enter(LIST, gemm_launch(), None)
        .unwrap();
    harness.collector.on_append_exit(pending, CallOutcome::Success);
    harness.collector.on_list_destroyed(LIST);
}

#[test]
fn test_implicit_scaling_expands_per_tile() {
    let harness = harness_with(&[(0x10, &[0x11, 0x12])], false);
    harness.collector.on_list_created(LIST, CONTEXT, DEVICE, true);

    run_immediate(&harness, gemm_launch(), 600, 850);

    let intervals = harness.collector.kernel_intervals();
    assert_eq!(intervals.len(), 1);
    let interval = &intervals[0];
    assert_eq!(interval.name, "gemm");
    assert_eq!(interval.device, DEVICE);
    assert_eq!(
        interval.windows,
        vec![
            DeviceWindow {
                start_ns: 600,
                end_ns: 850,
                sub_device: 0
            },
            DeviceWindow {
                start_ns: 600,
                end_ns: 850,
                sub_device: 1
            },
        ]
    );
}

#[test]
fn test_explicit_scaling_targets_sub_device_index() {
    let harness = harness_with(&[(0x10, &[0x11, 0x12])], false);
    let sub_device = DeviceHandle::new(0x12);
    harness
        .collector
        .on_list_created(LIST, CONTEXT, sub_device, true);

    run_immediate(&harness, gemm_launch(), 600, 850);

    let intervals = harness.collector.kernel_intervals();
    assert_eq!(intervals.len(), 1);
    let interval = &intervals[0];
    // The interval is attributed to the root device, tagged with the
    // sub-device's index in its list.
    assert_eq!(interval.device, DEVICE);
    assert_eq!(
        interval.windows,
        vec![DeviceWindow {
            start_ns: 600,
            end_ns: 850,
            sub_device: 1
        }]
    );
}

#[test]
fn test_verbose_kernel_and_transfer_names() {
    let harness = harness_with(&[(0x10, &[])], true);
    harness.collector.on_list_created(LIST, CONTEXT, DEVICE, true);

    let kernel = KernelHandle::new(0x7);
    harness.collector.on_group_size_set(kernel, [256, 1, 1]);

    run_immediate(
        &harness,
        AppendRequest::LaunchKernel {
            kernel,
            name: "gemm",
            simd_width: 32,
            group_count: [4, 1, 1],
        },
        600,
        850,
    );
    run_immediate(
        &harness,
        AppendRequest::MemoryCopy { bytes: 1024 },
        900,
        950,
    );

    let stats = harness.collector.kernel_stats();
    let names: Vec<&str> = stats.iter().map(|(name, _)| name.as_str()).collect();
    assert!(names.contains(&"gemm[SIMD32 {4; 1; 1} {256; 1; 1}]"));
    assert!(names.contains(&"CommandListAppendMemoryCopy[1024 bytes]"));
}

#[test]
fn test_image_copy_size_from_side_table() {
    let harness = harness_with(&[(0x10, &[])], true);
    harness.collector.on_list_created(LIST, CONTEXT, DEVICE, true);

    let image = ImageHandle::new(0x9);
    harness.collector.on_image_created(image, 4096);

    run_immediate(&harness, AppendRequest::ImageCopy { src: image }, 600, 700);

    let stats = harness.collector.kernel_stats();
    assert_eq!(stats[0].0, "CommandListAppendImageCopy[4096 bytes]");

    harness.collector.on_image_destroyed(image);
}

#[test]
fn test_disable_flag_is_visible_to_the_shim() {
    let harness = harness();
    assert!(harness.collector.is_enabled());
    harness.collector.disable();
    assert!(!harness.collector.is_enabled());
    harness.collector.enable();
    assert!(harness.collector.is_enabled());
}
